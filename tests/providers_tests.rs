//! External tests for the wire types and request builder: what actually goes
//! over the network for a given user action.

use pixchat::config::Settings;
use pixchat::image::ImageAttachment;
use pixchat::providers::*;
use pixchat::request::build_request;
use serde_json::{json, Value};

// -- Provider ----------------------------------------------------------------

#[test]
fn test_provider_display_openai() {
    assert_eq!(Provider::Openai.to_string(), "openai");
}

#[test]
fn test_provider_openai_is_lowercase() {
    let s = format!("{}", Provider::Openai);
    assert!(s.chars().all(|c| c.is_lowercase()));
}

#[test]
fn test_provider_endpoint_is_https() {
    assert!(Provider::Openai.default_endpoint().starts_with("https://"));
}

// -- Request serialization ---------------------------------------------------

#[test]
fn test_text_request_matches_wire_format() {
    let req = build_request(&Settings::default(), "Tell me a joke", None, &[]).expect("build");
    let value: Value = serde_json::to_value(&req).expect("serialize");
    assert_eq!(value["model"], "gpt-4o-mini-2024-07-18");
    assert_eq!(value["messages"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(value["messages"][0], json!({ "role": "user", "content": "Tell me a joke" }));
    assert!(value.get("stream").is_none());
}

#[test]
fn test_image_request_matches_wire_format() {
    let img = ImageAttachment::from_bytes(&[1, 2, 3], "image/png").expect("encode");
    let req = build_request(&Settings::default(), "Describe", Some(&img), &[]).expect("build");
    let value: Value = serde_json::to_value(&req).expect("serialize");
    let msgs = value["messages"].as_array().expect("array");
    assert_eq!(msgs.len(), 2);
    assert_eq!(msgs[1]["role"], "user");
    assert_eq!(msgs[1]["content"][0]["type"], "image_url");
    assert_eq!(msgs[1]["content"][0]["image_url"]["url"], "data:image/png;base64,AQID");
}

#[test]
fn test_request_keys_are_exactly_model_messages_temperature() {
    let req = build_request(&Settings::default(), "x", None, &[]).expect("build");
    let value: Value = serde_json::to_value(&req).expect("serialize");
    let mut keys: Vec<&str> = value.as_object().expect("object").keys().map(|k| k.as_str()).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["messages", "model", "temperature"]);
}

// -- Response deserialization -----------------------------------------------

#[test]
fn test_full_openai_response_deserializes() {
    let json = r#"{
        "id": "chatcmpl-9",
        "object": "chat.completion",
        "created": 1721000000,
        "model": "gpt-4o-mini-2024-07-18",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": "It is a cat.", "refusal": null },
            "logprobs": null,
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
    }"#;
    let resp: ChatResponse = serde_json::from_str(json).expect("deser");
    assert_eq!(resp.first_content(), Some("It is a cat."));
}

#[test]
fn test_choice_without_message() {
    let resp: ChatResponse = serde_json::from_str(r#"{"choices":[{"index":0}]}"#).expect("deser");
    assert!(resp.first_content().is_none());
}

#[test]
fn test_error_envelope_from_real_payload() {
    let json = r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota","param":null,"code":"insufficient_quota"}}"#;
    let env: ApiErrorEnvelope = serde_json::from_str(json).expect("deser");
    assert_eq!(env.message_or_unknown(), "You exceeded your current quota");
}
