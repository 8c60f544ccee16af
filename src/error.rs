//! Crate-level error type.

use thiserror::Error;

/// Every failure a chat exchange can hit, from input capture to persistence.
///
/// The `Display` strings of [`ChatError::Api`] and [`ChatError::NoResponse`]
/// are what the transcript shows after an `Error: ` prefix, so keep them
/// short and user-facing.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("no API key found: set OPENAI_API_KEY, write the key file, or enter it at the prompt")]
    MissingApiKey,

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("API Error: {0}")]
    Api(String),

    #[error("No response from AI.")]
    NoResponse,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("a request is already in flight")]
    Busy,
}

pub type Result<T> = std::result::Result<T, ChatError>;

impl ChatError {
    /// True for failures caused by what the user typed or attached, as opposed
    /// to the endpoint or the local machine.
    pub fn is_input_error(&self) -> bool {
        matches!(self, ChatError::EmptyMessage | ChatError::InvalidImage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display_matches_transcript_text() {
        let e = ChatError::Api("Invalid API key".to_string());
        assert_eq!(e.to_string(), "API Error: Invalid API key");
    }

    #[test]
    fn test_no_response_display() {
        assert_eq!(ChatError::NoResponse.to_string(), "No response from AI.");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: ChatError = io.into();
        assert!(matches!(e, ChatError::Io(_)));
        assert_eq!(e.to_string(), "gone");
    }

    #[test]
    fn test_input_errors_classified() {
        assert!(ChatError::EmptyMessage.is_input_error());
        assert!(ChatError::InvalidImage("x".into()).is_input_error());
        assert!(!ChatError::NoResponse.is_input_error());
        assert!(!ChatError::Busy.is_input_error());
    }
}
