//! Teleclaude Telemetry - logging setup for the bridge.
//!
//! # Example
//!
//! ```rust,no_run
//! use teleclaude_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), teleclaude_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("teloxide=warn");
//!
//! setup_logging(&config)?;
//! tracing::info!("bridge starting");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, setup_logging};
