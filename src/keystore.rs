//! Where the API key comes from: environment, key file, or the user.

use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ChatError, Result};

/// An API credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Trimmed key, or `None` when nothing but whitespace is left.
    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim();
        if key.is_empty() {
            None
        } else {
            Some(ApiKey(key.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKey(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOrigin {
    Env,
    File,
    Prompt,
}

/// The places a key may be found, in lookup order.
#[derive(Debug, Clone)]
pub struct KeySources {
    /// Value of the provider's key environment variable, if set.
    pub env_value: Option<String>,
    pub key_file: PathBuf,
    /// Whether asking the user is allowed (stdin is a terminal).
    pub interactive: bool,
    /// Write a prompted key back to `key_file`.
    pub remember: bool,
}

impl KeySources {
    pub fn from_env(var: &str, key_file: PathBuf, remember: bool) -> Self {
        KeySources {
            env_value: std::env::var(var).ok(),
            key_file,
            interactive: std::io::stdin().is_terminal(),
            remember,
        }
    }
}

/// Resolve an API key: env var, then key file, then a prompt on `input`/`output`.
pub fn acquire_key<R, W>(sources: &KeySources, input: &mut R, output: &mut W) -> Result<(ApiKey, KeyOrigin)>
where
    R: BufRead,
    W: Write,
{
    if let Some(key) = sources.env_value.as_deref().and_then(ApiKey::parse) {
        debug!("API key taken from environment");
        return Ok((key, KeyOrigin::Env));
    }

    if let Some(key) = read_key_file(&sources.key_file)? {
        debug!(path = %sources.key_file.display(), "API key taken from key file");
        return Ok((key, KeyOrigin::File));
    }

    if !sources.interactive {
        return Err(ChatError::MissingApiKey);
    }

    write!(output, "Enter your API key: ")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    let key = ApiKey::parse(&line).ok_or(ChatError::MissingApiKey)?;

    if sources.remember {
        write_key_file(&sources.key_file, &key)?;
        info!(path = %sources.key_file.display(), "API key saved");
    }
    Ok((key, KeyOrigin::Prompt))
}

pub fn read_key_file(path: &Path) -> Result<Option<ApiKey>> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(ApiKey::parse(&raw)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write the key file, readable by the owner only on unix.
pub fn write_key_file(path: &Path, key: &ApiKey) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut f = opts.open(path)?;
    writeln!(f, "{}", key.expose())?;
    Ok(())
}
