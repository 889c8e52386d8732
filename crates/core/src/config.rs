//! Harness configuration surface.
//!
//! Everything the core needs from the bench setup: counter and tick rates,
//! the RTT control-block location, capture channel selection, and the keys
//! wired to hybrid switches. Serializable so a bench description can live
//! in a JSON file next to the test plan.

use crate::error::{Error, Result};
use crate::profiler::{ProfilerConfig, DEFAULT_RECORD_FREQUENCY_HZ};
use serde::{Deserialize, Serialize};

/// Default RTT control-block address in device RAM.
pub const DEFAULT_RTT_BLOCK_ADDRESS: u32 = 0x2000_0000;

/// Bench configuration for a harness session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Record cycle-counter rate, for millisecond conversion.
    pub record_frequency_hz: u32,
    /// Controller tick rate, for delay rounding.
    pub tick_frequency_hz: u32,
    /// Bitmask of capture channels to report.
    pub channels_enabled: u32,
    /// Controller clock-gating knob, passed through opaquely.
    pub gate_latch_mode: u8,
    /// RTT control-block location in device RAM.
    pub rtt_block_address: u32,
    /// First GPIO pin backing the unused resume-event bits.
    pub capture_pin_base: u8,
    /// Tag marking device boot in the record stream, if the firmware emits
    /// one.
    pub boot_tag: Option<u16>,
    /// Key channels wired to hybrid (optical) switches.
    pub hybrid_keys: Vec<u8>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            record_frequency_hz: DEFAULT_RECORD_FREQUENCY_HZ,
            tick_frequency_hz: crate::pes::DEFAULT_TICK_FREQUENCY_HZ,
            channels_enabled: (1 << crate::buttons::BUTTON_CHANNELS) - 1,
            gate_latch_mode: 0,
            rtt_block_address: DEFAULT_RTT_BLOCK_ADDRESS,
            capture_pin_base: 0,
            boot_tag: None,
            hybrid_keys: Vec::new(),
        }
    }
}

impl HarnessConfig {
    /// Reject configurations that cannot produce meaningful time values.
    pub fn validate(&self) -> Result<()> {
        if self.record_frequency_hz == 0 {
            return Err(Error::OutOfRange {
                field: "record_frequency_hz",
                value: 0,
                min: 1,
                max: u32::MAX as u64,
            });
        }
        if self.tick_frequency_hz == 0 {
            return Err(Error::OutOfRange {
                field: "tick_frequency_hz",
                value: 0,
                min: 1,
                max: u32::MAX as u64,
            });
        }
        Ok(())
    }

    /// The profiler view of this configuration.
    pub fn profiler_config(&self) -> ProfilerConfig {
        ProfilerConfig {
            record_frequency_hz: self.record_frequency_hz,
            boot_tag: self.boot_tag,
        }
    }
}
