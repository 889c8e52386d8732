//! Transport abstractions for the auxiliary controller and the RTT debug
//! channel.
//!
//! Trait-based so that the real HID-backed controller link and the debug
//! probe share one interface with the test doubles.

use crate::error::Result;

/// Link to the sequencer controller.
///
/// Implementations carry an already-open session; whoever holds the link
/// owns the controller for that time.
pub trait ControllerLink: Send {
    /// Upload an encoded program, replacing any previous one.
    fn upload(&self, program: &[u32]) -> Result<()>;

    /// Start executing the uploaded program.
    fn start(&self) -> Result<()>;

    /// Poll whether the running program has completed.
    fn poll_complete(&self) -> Result<bool>;
}

/// RTT debug channel the device streams records over.
///
/// `read` must bound its own blocking time so a capture worker polling it
/// can always observe a stop request.
pub trait RttTransport: Send {
    /// Whether the underlying device is still attached.
    fn connected(&self) -> bool;

    /// Read up to `buf.len()` bytes, returning the count (0 on timeout).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}
