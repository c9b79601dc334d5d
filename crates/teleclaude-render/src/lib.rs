//! Teleclaude Render - turning a stream of agent output into chat messages.
//!
//! - [`markup`]: tag balancing and safe cut points for Telegram HTML
//! - [`truncate`]: line-budget truncation around points of interest
//! - [`stream`]: the throttled, size-bounded [`IncrementalRenderer`]
//! - [`format`]: markdown conversion and tool-call/result formatting

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod format;
pub mod markup;
pub mod stream;
pub mod truncate;

pub use markup::{balance, find_open_tags, safe_truncate_point, strip_markup};
pub use stream::{IncrementalRenderer, RenderConfig, TRUNCATION_INDICATOR};
pub use truncate::truncate_lines;
