//! Turns one user action (text plus optional image) into a chat-completion
//! request body.

use crate::config::Settings;
use crate::error::{ChatError, Result};
use crate::image::ImageAttachment;
use crate::providers::{ChatMessage, ChatRequest, ContentPart, ImageUrl};
use crate::transcript::TranscriptEntry;

/// Build the request for `message`.
///
/// The text goes out as its own `user` message; an attached image follows as
/// a second `user` message holding a single `image_url` part. With
/// `settings.include_history`, the successful turns in `history` are sent
/// first.
pub fn build_request(
    settings: &Settings,
    message: &str,
    image: Option<&ImageAttachment>,
    history: &[TranscriptEntry],
) -> Result<ChatRequest> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ChatError::EmptyMessage);
    }

    let mut messages = Vec::with_capacity(history.len() + 2);
    if settings.include_history {
        messages.extend(
            history
                .iter()
                .filter(|e| !e.is_error())
                .map(|e| ChatMessage::text(e.speaker.role(), e.text.clone())),
        );
    }

    messages.push(ChatMessage::text("user", message));
    if let Some(img) = image {
        messages.push(ChatMessage::parts(
            "user",
            vec![ContentPart::ImageUrl {
                image_url: ImageUrl { url: img.data_url() },
            }],
        ));
    }

    Ok(ChatRequest {
        model: settings.model.clone(),
        messages,
        temperature: settings.temperature,
    })
}

/// Pretty JSON of `request` with inline image payloads shortened, for logs.
pub fn redacted_body(request: &ChatRequest) -> String {
    let mut value = match serde_json::to_value(request) {
        Ok(v) => v,
        Err(e) => return format!("<unserializable request: {e}>"),
    };
    if let Some(messages) = value.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in messages {
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                let Some(url) = part.pointer_mut("/image_url/url") else {
                    continue;
                };
                let short = url
                    .as_str()
                    .and_then(|s| s.split_once(','))
                    .map(|(head, data)| format!("{head},<{} base64 chars>", data.len()));
                if let Some(short) = short {
                    *url = serde_json::Value::String(short);
                }
            }
        }
    }
    serde_json::to_string_pretty(&value).unwrap_or_default()
}
