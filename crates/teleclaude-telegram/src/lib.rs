//! Teleclaude Telegram - drives a coding agent from a Telegram chat.
//!
//! Each message starts one agent turn. The agent's output streams into a
//! single, repeatedly edited message; sensitive tool calls are held until
//! the user answers an inline approval prompt.
//!
//! This crate is used as the `teleclaude-telegram` binary; the modules are
//! public so the pieces can be tested and reused.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod agent;
pub mod bot;
pub mod callback;
pub mod error;
pub mod handler;
pub mod session;
pub mod surface;
pub mod turn;

pub use error::{TelegramBotError, TelegramResult};
