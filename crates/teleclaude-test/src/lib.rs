//! Teleclaude Test - Shared test utilities for the chat bridge.
//!
//! Mock UI surfaces and fixtures usable from any crate as a dev-dependency.
//!
//! ```toml
//! [dev-dependencies]
//! teleclaude-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use teleclaude_test::{MockPrompter, MockSurface};
//!
//! let surface = MockSurface::new().with_outcome(EditOutcome::Unchanged);
//! let prompter = MockPrompter::failing();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
