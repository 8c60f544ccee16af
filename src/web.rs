use colored::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::image::ImageAttachment;
use crate::session::ChatSession;

pub type SharedSession = Arc<Mutex<ChatSession>>;

/// Largest request head we accept before giving up on a connection.
const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Embedded chat widget. It talks only to this server; the API key never
/// reaches the browser.
pub const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>pixchat</title>
<style>
*{margin:0;padding:0;box-sizing:border-box}
body{background:#0d1117;color:#c9d1d9;font-family:system-ui,-apple-system,'Segoe UI',sans-serif;height:100vh;display:flex;flex-direction:column}
header{padding:12px 20px;border-bottom:1px solid #21262d;display:flex;align-items:center;justify-content:space-between}
header h1{font-size:1.1rem;color:#58a6ff}
#chat-box{flex:1;overflow-y:auto;padding:16px 20px;display:flex;flex-direction:column;gap:10px}
.msg{max-width:80%;padding:8px 12px;border-radius:8px;line-height:1.5;word-wrap:break-word}
.msg.user{align-self:flex-end;background:#1f6feb;color:#fff;white-space:pre-wrap}
.msg.assistant{align-self:flex-start;background:#161b22;border:1px solid #30363d}
.msg.error{border-color:#f85149;color:#f85149}
.msg pre{background:#0d1117;padding:8px;border-radius:6px;overflow-x:auto}
.msg code{font-family:'Cascadia Code','Fira Code',monospace;font-size:.85rem}
.msg table{border-collapse:collapse}.msg td,.msg th{border:1px solid #30363d;padding:2px 6px}
.who{display:block;font-size:.7rem;opacity:.7;margin-bottom:2px}
form{display:flex;gap:8px;padding:12px 20px;border-top:1px solid #21262d;background:#161b22;align-items:center}
#userInput{flex:1;background:#0d1117;border:1px solid #30363d;color:#c9d1d9;padding:8px 10px;border-radius:6px;font-size:.95rem}
#userInput:focus{outline:none;border-color:#58a6ff}
#imageInput{font-size:.75rem;color:#8b949e;max-width:180px}
.btn{border:none;padding:8px 14px;border-radius:6px;font-size:.9rem;cursor:pointer;color:#fff}
#send{background:#238636}#send:hover{background:#2ea043}
#send:disabled{background:#21262d;color:#484f58;cursor:not-allowed}
#clear{background:#30363d}#clear:hover{background:#484f58}
</style>
</head>
<body>
<header><h1>pixchat</h1><button class="btn" id="clear" type="button">Clear</button></header>
<div id="chat-box"></div>
<form id="composer">
<input type="text" id="userInput" placeholder="Type a message..." autocomplete="off">
<input type="file" id="imageInput" accept="image/*">
<button class="btn" id="send" type="submit">Send</button>
</form>
<script>
const STORE_KEY='pixchat.transcript';
const chatBox=document.getElementById('chat-box');
const userInput=document.getElementById('userInput');
const imageInput=document.getElementById('imageInput');
const sendBtn=document.getElementById('send');

function esc(s){return s.replace(/[&<>"']/g,c=>({'&':'&amp;','<':'&lt;','>':'&gt;','"':'&quot;',"'":'&#39;'}[c]));}

function appendMessage(item){
  const div=document.createElement('div');
  div.className='msg '+item.speaker+(item.speaker==='assistant'&&item.text.startsWith('Error: ')?' error':'');
  div.innerHTML='<span class="who">'+(item.speaker==='user'?'You':'AI')+'</span>'+item.html;
  chatBox.appendChild(div);
  chatBox.scrollTop=chatBox.scrollHeight;
}

function renderAll(items){chatBox.innerHTML='';items.forEach(appendMessage);}

function mirror(items){try{localStorage.setItem(STORE_KEY,JSON.stringify(items));}catch(e){}}

function cached(){try{return JSON.parse(localStorage.getItem(STORE_KEY)||'[]');}catch(e){return [];}}

function readAsDataURL(file){
  return new Promise((resolve,reject)=>{
    const r=new FileReader();
    r.onload=()=>resolve(r.result);
    r.onerror=()=>reject(r.error);
    r.readAsDataURL(file);
  });
}

async function loadHistory(){
  renderAll(cached());
  try{
    const res=await fetch('/api/history');
    if(res.ok){const items=await res.json();renderAll(items);mirror(items);}
  }catch(e){console.error('history failed',e);}
}

async function sendMessage(ev){
  ev.preventDefault();
  const message=userInput.value.trim();
  if(!message)return;
  const items=cached();
  const mine={speaker:'user',text:message,html:esc(message)};
  appendMessage(mine);items.push(mine);mirror(items);
  let image=null;
  const file=imageInput.files[0];
  if(file){image=await readAsDataURL(file);imageInput.value='';}
  userInput.value='';
  sendBtn.disabled=true;
  let reply;
  try{
    const res=await fetch('/api/send',{method:'POST',headers:{'Content-Type':'application/json'},body:JSON.stringify({message,image})});
    const data=await res.json();
    reply=res.ok?{speaker:'assistant',text:data.reply,html:data.html}
      :{speaker:'assistant',text:'Error: '+data.error,html:esc('Error: '+data.error)};
  }catch(e){
    reply={speaker:'assistant',text:'Error: '+e.message,html:esc('Error: '+e.message)};
  }finally{sendBtn.disabled=false;}
  appendMessage(reply);items.push(reply);mirror(items);
}

document.getElementById('composer').addEventListener('submit',sendMessage);
document.getElementById('clear').onclick=async()=>{
  await fetch('/api/clear',{method:'POST',headers:{'Content-Type':'application/json'},body:'{}'});
  localStorage.removeItem(STORE_KEY);
  renderAll([]);
};
loadHistory();
</script>
</body>
</html>"##;

#[derive(Debug, Deserialize)]
struct SendBody {
    message: String,
    /// `data:image/...;base64,...` as produced by `FileReader.readAsDataURL`.
    #[serde(default)]
    image: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// A fully buffered HTTP response.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl HttpResponse {
    fn html(body: &str) -> Self {
        HttpResponse {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: body.as_bytes().to_vec(),
        }
    }

    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
        HttpResponse { status, content_type: "application/json", body }
    }

    fn error(status: u16, msg: impl Into<String>) -> Self {
        Self::json(status, &ErrorBody { error: msg.into() })
    }

    fn empty(status: u16) -> Self {
        HttpResponse { status, content_type: "text/plain", body: Vec::new() }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason(self.status));
        // 204 carries neither a body nor its framing headers.
        if self.status != 204 {
            head.push_str(&format!(
                "Content-Type: {}\r\nContent-Length: {}\r\n",
                self.content_type,
                self.body.len()
            ));
        }
        head.push_str("Cache-Control: no-store\r\nConnection: close\r\n\r\n");
        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        _ => "Internal Server Error",
    }
}

/// Request line plus the headers [`check_request`] looks at.
#[derive(Debug, Clone, Default)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub host: Option<String>,
    pub origin: Option<String>,
    pub content_type: Option<String>,
}

const LOOPBACK_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "[::1]"];

/// `host[:port]` names this server on the loopback interface.
fn is_local_authority(authority: &str, port: u16) -> bool {
    let (host, explicit) = match authority.rsplit_once(':') {
        Some((h, p)) if !p.contains(']') => (h, Some(p)),
        _ => (authority, None),
    };
    let port_ok = match explicit {
        Some(p) => p.parse::<u16>().ok() == Some(port),
        None => port == 80,
    };
    port_ok && LOOPBACK_HOSTS.iter().any(|h| h.eq_ignore_ascii_case(host))
}

/// Refuse requests that another site could make through the user's browser.
///
/// `Host` must name this server on loopback, which also stops DNS rebinding.
/// A present `Origin` must be this server. POST bodies must be declared as
/// JSON, so cross-site pages cannot skip the CORS preflight. Returns the
/// rejection to send, or `None` when the request may be routed.
pub fn check_request(head: &RequestHead, port: u16) -> Option<HttpResponse> {
    if !head.host.as_deref().is_some_and(|h| is_local_authority(h, port)) {
        return Some(HttpResponse::error(403, "host not allowed"));
    }
    if let Some(origin) = head.origin.as_deref() {
        let local = origin
            .strip_prefix("http://")
            .is_some_and(|a| is_local_authority(a, port));
        if !local {
            return Some(HttpResponse::error(403, format!("origin {origin} not allowed")));
        }
    }
    if head.method == "POST" {
        let json = head
            .content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"));
        if !json {
            return Some(HttpResponse::error(415, "expected Content-Type: application/json"));
        }
    }
    None
}

/// Dispatch one parsed request.
pub async fn route(method: &str, path: &str, body: &[u8], session: &SharedSession) -> HttpResponse {
    let path = path.split('?').next().unwrap_or(path);
    match (method, path) {
        ("GET", "/") | ("GET", "/index.html") => HttpResponse::html(INDEX_HTML),
        ("GET", "/api/history") => {
            let Ok(s) = session.try_lock() else {
                return HttpResponse::error(409, ChatError::Busy.to_string());
            };
            HttpResponse::json(200, &s.history())
        }
        ("POST", "/api/send") => handle_send(body, session).await,
        ("POST", "/api/clear") => {
            let Ok(mut s) = session.try_lock() else {
                return HttpResponse::error(409, ChatError::Busy.to_string());
            };
            match s.clear() {
                Ok(()) => HttpResponse::empty(204),
                Err(e) => HttpResponse::error(500, e.to_string()),
            }
        }
        (_, "/" | "/index.html" | "/api/history" | "/api/send" | "/api/clear") => {
            HttpResponse::error(405, format!("{method} not allowed on {path}"))
        }
        _ => HttpResponse::error(404, format!("no route for {path}")),
    }
}

async fn handle_send(body: &[u8], session: &SharedSession) -> HttpResponse {
    let req: SendBody = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => return HttpResponse::error(400, format!("bad request body: {e}")),
    };
    if req.message.trim().is_empty() {
        return HttpResponse::error(400, ChatError::EmptyMessage.to_string());
    }
    let image = match req.image.as_deref().filter(|s| !s.is_empty()) {
        Some(url) => match ImageAttachment::from_data_url(url) {
            Ok(img) => Some(img),
            Err(e) => return HttpResponse::error(400, e.to_string()),
        },
        None => None,
    };

    // One request in flight at a time.
    let Ok(mut s) = session.try_lock() else {
        return HttpResponse::error(409, ChatError::Busy.to_string());
    };
    if let Some(img) = &image {
        if img.decoded_len() as u64 > s.settings().max_image_bytes {
            return HttpResponse::error(413, "image is too large");
        }
    }

    match s.send(&req.message, image.as_ref()).await {
        Ok(exchange) => HttpResponse::json(200, &exchange),
        Err(e) if e.is_input_error() => HttpResponse::error(400, e.to_string()),
        Err(e) => HttpResponse::error(500, e.to_string()),
    }
}

enum ReadOutcome {
    Request { head: RequestHead, body: Vec<u8> },
    TooLarge,
    Malformed,
    Closed,
}

/// Read one request: headers via `httparse`, then `Content-Length` bytes of body.
async fn read_request(stream: &mut TcpStream, max_body: usize) -> std::io::Result<ReadOutcome> {
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let (head, head_len, content_length) = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(ReadOutcome::Closed);
        }
        buf.extend_from_slice(&chunk[..n]);

        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut req = httparse::Request::new(&mut headers);
        match req.parse(&buf) {
            Ok(httparse::Status::Complete(head_len)) => {
                let header = |name: &str| {
                    req.headers
                        .iter()
                        .find(|h| h.name.eq_ignore_ascii_case(name))
                        .and_then(|h| std::str::from_utf8(h.value).ok())
                        .map(|v| v.trim().to_string())
                };
                let content_length = header("content-length")
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(0);
                let head = RequestHead {
                    method: req.method.unwrap_or("GET").to_string(),
                    path: req.path.unwrap_or("/").to_string(),
                    host: header("host"),
                    origin: header("origin"),
                    content_type: header("content-type"),
                };
                break (head, head_len, content_length);
            }
            Ok(httparse::Status::Partial) if buf.len() < MAX_HEAD_BYTES => continue,
            Ok(httparse::Status::Partial) | Err(_) => return Ok(ReadOutcome::Malformed),
        }
    };

    if content_length > max_body {
        return Ok(ReadOutcome::TooLarge);
    }

    let mut body = buf.split_off(head_len);
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(ReadOutcome::Malformed);
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);
    Ok(ReadOutcome::Request { head, body })
}

async fn handle_connection(
    mut stream: TcpStream,
    session: SharedSession,
    port: u16,
    max_body: usize,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let response = match read_request(&mut stream, max_body).await? {
        ReadOutcome::Request { head, body } => {
            debug!(method = %head.method, path = %head.path, body_len = body.len(), "request");
            match check_request(&head, port) {
                Some(refused) => {
                    warn!(
                        method = %head.method,
                        path = %head.path,
                        host = ?head.host,
                        origin = ?head.origin,
                        status = refused.status,
                        "request refused"
                    );
                    refused
                }
                None => route(&head.method, &head.path, &body, &session).await,
            }
        }
        ReadOutcome::TooLarge => HttpResponse::error(413, "request body too large"),
        ReadOutcome::Malformed => HttpResponse::error(400, "malformed request"),
        ReadOutcome::Closed => return Ok(()),
    };
    stream.write_all(&response.to_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Accept connections on `listener` until the task is dropped.
pub async fn serve_on(listener: TcpListener, session: SharedSession) -> std::io::Result<()> {
    let port = listener.local_addr()?.port();
    // base64 inflates by 4/3; leave headroom for the JSON around it.
    let max_body = {
        let s = session.lock().await;
        (s.settings().max_image_bytes as usize).saturating_mul(2)
    };
    loop {
        let (stream, addr) = listener.accept().await?;
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, session, port, max_body).await {
                warn!(%addr, error = %e, "connection error");
            }
        });
    }
}

/// Start the web widget on localhost and open the browser.
pub async fn serve(port: u16, session: ChatSession) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    let url = format!("http://localhost:{}", listener.local_addr()?.port());

    eprintln!("{}", format!("  Chat widget running at {}", url).bright_green());
    eprintln!("{}", "  Press Ctrl+C to stop.".bright_blue());
    info!(%url, "web widget listening");

    #[cfg(target_os = "windows")]
    {
        let _ = std::process::Command::new("cmd").args(["/C", &format!("start {}", url)]).spawn();
    }
    #[cfg(target_os = "macos")]
    {
        let _ = std::process::Command::new("open").arg(&url).spawn();
    }
    #[cfg(target_os = "linux")]
    {
        let _ = std::process::Command::new("xdg-open").arg(&url).spawn();
    }

    serve_on(listener, Arc::new(Mutex::new(session))).await?;
    Ok(())
}
