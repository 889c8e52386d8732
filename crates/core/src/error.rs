//! Error types for kosmos-core.

use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Scenario build error: stimulus helper called outside the offline window,
    /// or the window was opened/closed twice.
    #[error("offline window: {0}")]
    Offline(String),

    /// Unknown key channel id.
    #[error("unknown key id: {0}")]
    UnknownKey(u8),

    /// Event registry error: invalid name, duplicate event, or bit space exhausted.
    #[error("event registry: {0}")]
    Event(String),

    /// Value out of safe range.
    #[error("value out of range: {field} = {value} (allowed {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    /// Debug transport failure (RTT read error, device disconnected).
    #[error("transport error: {0}")]
    Transport(String),

    /// Sequencer program failure (upload rejected, play timed out,
    /// controller reported an instruction fault). Recoverable: the caller
    /// may rebuild and replay.
    #[error("program error: {0}")]
    Program(String),

    /// Operation timed out.
    #[error("timeout: {0}")]
    Timeout(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
