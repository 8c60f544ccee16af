//! pixchat: a small chat client for OpenAI-compatible chat-completion
//! endpoints.
//!
//! Each user action runs the same linear path: capture the text, optionally
//! encode an attached image ([`image`]), build one request ([`request`]), send
//! it ([`client`]), render the reply as HTML ([`markdown`]) and persist the
//! conversation ([`transcript`]). [`session::ChatSession`] ties those steps
//! together for the terminal ([`repl`]) and the browser widget ([`web`]).

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod image;
pub mod keystore;
pub mod markdown;
pub mod providers;
pub mod repl;
pub mod request;
pub mod session;
pub mod transcript;
pub mod web;

pub use error::{ChatError, Result};
pub use session::{ChatSession, Exchange};
