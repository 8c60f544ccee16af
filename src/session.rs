//! One chat: send a message, render the reply, keep the transcript on disk.

use serde::Serialize;
use tracing::{info, warn};

use crate::client::ChatClient;
use crate::config::Settings;
use crate::error::{ChatError, Result};
use crate::image::ImageAttachment;
use crate::markdown::render_markdown;
use crate::request::build_request;
use crate::transcript::{Speaker, Transcript, TranscriptEntry, TranscriptStore};

/// Outcome of one send.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub user: String,
    /// Assistant text as stored: the reply, or `Error: ...` when the request failed.
    pub reply: String,
    pub html: String,
    pub failed: bool,
}

/// A transcript entry plus its rendered form, for display surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryItem {
    pub speaker: Speaker,
    pub text: String,
    pub line: String,
    pub html: String,
}

impl From<&TranscriptEntry> for HistoryItem {
    fn from(e: &TranscriptEntry) -> Self {
        HistoryItem {
            speaker: e.speaker,
            text: e.text.clone(),
            line: e.line(),
            html: match e.speaker {
                Speaker::Assistant => render_markdown(&e.text),
                Speaker::User => crate::markdown::escape_html(&e.text),
            },
        }
    }
}

pub struct ChatSession {
    client: ChatClient,
    settings: Settings,
    store: TranscriptStore,
    transcript: Transcript,
}

impl ChatSession {
    /// Open a session, loading whatever the store already holds.
    pub fn open(client: ChatClient, settings: Settings) -> Result<Self> {
        let store = TranscriptStore::new(settings.transcript_path.clone());
        let transcript = store.load()?;
        info!(
            path = %store.path().display(),
            entries = transcript.len(),
            model = %settings.model,
            endpoint = %client.endpoint(),
            "chat session opened"
        );
        Ok(ChatSession { client, settings, store, transcript })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn history(&self) -> Vec<HistoryItem> {
        self.transcript.entries().iter().map(HistoryItem::from).collect()
    }

    /// Send one message with an optional image.
    ///
    /// The user turn is persisted before the request goes out and the
    /// assistant turn right after it returns. Endpoint failures do not fail
    /// the call: they are recorded as an `Error: ...` assistant turn and
    /// reported through [`Exchange::failed`]. Only input and persistence
    /// problems are returned as `Err`.
    pub async fn send(&mut self, message: &str, image: Option<&ImageAttachment>) -> Result<Exchange> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let request = build_request(&self.settings, message, image, self.transcript.entries())?;

        self.transcript.push(Speaker::User, message);
        self.store.save(&self.transcript)?;

        let (reply, failed) = match self.client.complete(&request).await {
            Ok(text) => (text, false),
            Err(e) => {
                warn!(error = %e, "chat request failed");
                (format!("Error: {e}"), true)
            }
        };

        self.transcript.push(Speaker::Assistant, reply.clone());
        self.store.save(&self.transcript)?;

        Ok(Exchange {
            user: message.to_string(),
            html: render_markdown(&reply),
            reply,
            failed,
        })
    }

    /// Forget the conversation, in memory and on disk.
    pub fn clear(&mut self) -> Result<()> {
        self.transcript.clear();
        self.store.clear()?;
        info!("transcript cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::ApiKey;
    use std::io::Write;
    use std::time::Duration;

    fn session(server: &mockito::Server, dir: &std::path::Path) -> ChatSession {
        let settings = Settings {
            endpoint: format!("{}/v1/chat/completions", server.url()),
            transcript_path: dir.join("t.json"),
            ..Settings::default()
        };
        let client = ChatClient::new(
            ApiKey::parse("sk-test").unwrap(),
            settings.endpoint.clone(),
            Duration::from_secs(5),
        )
        .unwrap();
        ChatSession::open(client, settings).unwrap()
    }

    #[tokio::test]
    async fn test_send_persists_both_turns() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"**Hi**"}}]}"#)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(&server, dir.path());

        let ex = s.send("  hello ", None).await.unwrap();
        assert_eq!(ex.user, "hello");
        assert_eq!(ex.reply, "**Hi**");
        assert_eq!(ex.html, "<p><strong>Hi</strong></p>\n");
        assert!(!ex.failed);

        let stored = TranscriptStore::new(dir.path().join("t.json")).load().unwrap();
        assert_eq!(stored.lines(), vec!["You: hello", "AI: **Hi**"]);
    }

    #[tokio::test]
    async fn test_user_turn_on_disk_before_request_returns() {
        let mut server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        // The endpoint replies with whatever the store held when the request arrived.
        let _m = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_chunked_body(move |w| {
                let lines = TranscriptStore::new(path.clone())
                    .load()
                    .map(|t| t.lines())
                    .unwrap_or_default();
                let body = serde_json::json!({ "choices": [{ "message": { "content": lines.join(" | ") } }] });
                w.write_all(body.to_string().as_bytes())
            })
            .create_async()
            .await;
        let mut s = session(&server, dir.path());

        let ex = s.send("hello", None).await.unwrap();
        assert_eq!(ex.reply, "You: hello");
    }

    #[tokio::test]
    async fn test_api_failure_recorded_as_error_turn() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":{"message":"Rate limit reached"}}"#)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(&server, dir.path());

        let ex = s.send("hello", None).await.unwrap();
        assert!(ex.failed);
        assert_eq!(ex.reply, "Error: API Error: Rate limit reached");
        assert_eq!(s.transcript().lines()[1], "AI: Error: API Error: Rate limit reached");
    }

    #[tokio::test]
    async fn test_empty_message_has_no_side_effects() {
        let server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(&server, dir.path());

        let err = s.send(" \t", None).await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));
        assert!(s.transcript().is_empty());
        assert!(!dir.path().join("t.json").exists());
    }

    #[tokio::test]
    async fn test_reopen_restores_transcript_and_clear_forgets() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"ok"}}]}"#)
            .expect(1)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        {
            let mut s = session(&server, dir.path());
            s.send("first", None).await.unwrap();
        }
        let mut s = session(&server, dir.path());
        assert_eq!(s.history().len(), 2);
        assert_eq!(s.history()[0].line, "You: first");

        s.clear().unwrap();
        assert!(s.history().is_empty());
        assert!(!dir.path().join("t.json").exists());
    }

    #[test]
    fn test_history_item_escapes_user_text() {
        let entry = TranscriptEntry::new(Speaker::User, "<b>hi</b>");
        let item = HistoryItem::from(&entry);
        assert_eq!(item.html, "&lt;b&gt;hi&lt;/b&gt;");
        assert_eq!(item.line, "You: <b>hi</b>");
    }
}
