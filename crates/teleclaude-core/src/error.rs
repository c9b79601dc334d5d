//! Error types shared across the bridge.

use thiserror::Error;

/// Errors reported by a UI surface when it cannot deliver something.
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// No surface is attached or the chat is not reachable.
    #[error("surface unavailable")]
    Unavailable,

    /// The surface refused the content.
    #[error("surface rejected content: {0}")]
    Rejected(String),

    /// Network or API failure while talking to the surface.
    #[error("surface transport error: {0}")]
    Transport(String),
}

/// Convenience alias.
pub type SurfaceResult<T> = Result<T, SurfaceError>;

/// A line of agent output could not be decoded.
#[derive(Debug, Error)]
#[error("malformed agent event: {0}")]
pub struct EventParseError(#[from] pub serde_json::Error);
