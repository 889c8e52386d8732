//! Programmable execution stage: instruction model and program assembly.
//!
//! A scenario is an ordered list of instructions assembled while the
//! sequencer is offline, then uploaded and executed atomically by the
//! auxiliary controller. There is no branching; the controller runs the
//! list strictly in order, completing each EXECUTE before the next
//! instruction and blocking on WAIT until the resume mask is asserted
//! (level-latched: an event that fired early is consumed immediately).
//!
//! Instruction words are 32-bit, opcode in the top nibble, operand below.
//! The controller firmware owns the exact semantics; this side only
//! assembles and never reinterprets uploaded words.

use crate::error::{Error, Result};
use crate::events::{ActionEvent, ResumeEvent};
use tracing::debug;

/// Default controller tick rate (10 µs resolution).
pub const DEFAULT_TICK_FREQUENCY_HZ: u32 = 100_000;

/// Widest delay operand the instruction word carries.
pub const MAX_DELAY_TICKS: u32 = (1 << 24) - 1;

const OP_SET_BUTTONS: u32 = 0x1;
const OP_SET_SLIDERS: u32 = 0x2;
const OP_DELAY: u32 = 0x3;
const OP_EXECUTE: u32 = 0x4;
const OP_WAIT: u32 = 0x5;
const OPCODE_SHIFT: u32 = 28;

/// One sequencer instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Latchable button state word (state + driven bits).
    SetButtons(u32),
    /// Latchable slider state word (2-bit states + driven bits).
    SetSliders(u32),
    /// Stall for a tick count.
    Delay(u32),
    /// Assert an action event mask; completes before the next instruction.
    Execute(ActionEvent),
    /// Block until the resume event mask is asserted.
    Wait(ResumeEvent),
}

impl Instruction {
    /// Encode into the controller's 32-bit instruction word.
    pub fn encode(&self) -> u32 {
        match *self {
            Instruction::SetButtons(word) => (OP_SET_BUTTONS << OPCODE_SHIFT) | word,
            Instruction::SetSliders(word) => (OP_SET_SLIDERS << OPCODE_SHIFT) | word,
            Instruction::Delay(ticks) => (OP_DELAY << OPCODE_SHIFT) | ticks,
            Instruction::Execute(ev) => (OP_EXECUTE << OPCODE_SHIFT) | ev.mask() as u32,
            Instruction::Wait(ev) => (OP_WAIT << OPCODE_SHIFT) | ev.mask() as u32,
        }
    }
}

/// Offline program builder.
///
/// All append operations require the offline window opened by
/// [`begin_offline`](Pes::begin_offline); build-time validation errors are
/// raised before any controller I/O is attempted.
#[derive(Debug)]
pub struct Pes {
    program: Vec<Instruction>,
    offline: bool,
    tick_frequency_hz: u32,
}

impl Pes {
    pub fn new(tick_frequency_hz: u32) -> Result<Self> {
        if tick_frequency_hz == 0 {
            return Err(Error::OutOfRange {
                field: "tick_frequency_hz",
                value: 0,
                min: 1,
                max: u32::MAX as u64,
            });
        }
        Ok(Self {
            program: Vec::new(),
            offline: false,
            tick_frequency_hz,
        })
    }

    /// Open the program-build window. The previous program is discarded.
    pub fn begin_offline(&mut self) -> Result<()> {
        if self.offline {
            return Err(Error::Offline("already open".into()));
        }
        self.program.clear();
        self.offline = true;
        Ok(())
    }

    /// Close the program-build window, freezing the program for upload.
    pub fn end_offline(&mut self) -> Result<()> {
        if !self.offline {
            return Err(Error::Offline("not open".into()));
        }
        self.offline = false;
        debug!(instructions = self.program.len(), "program frozen");
        Ok(())
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Append a DELAY rounded to the nearest controller tick.
    ///
    /// A positive duration always stalls for at least one tick.
    pub fn delay(&mut self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(Error::OutOfRange {
                field: "delay_seconds",
                value: 0,
                min: 1,
                max: MAX_DELAY_TICKS as u64,
            });
        }
        let ticks = (seconds * self.tick_frequency_hz as f64).round() as u64;
        if ticks > MAX_DELAY_TICKS as u64 {
            return Err(Error::OutOfRange {
                field: "delay_ticks",
                value: ticks,
                min: 1,
                max: MAX_DELAY_TICKS as u64,
            });
        }
        self.push(Instruction::Delay((ticks as u32).max(1)))
    }

    /// Append an EXECUTE with the given action mask.
    pub fn execute(&mut self, event: ActionEvent) -> Result<()> {
        self.push(Instruction::Execute(event))
    }

    /// Append a WAIT blocking on the given resume mask.
    pub fn wait(&mut self, event: ResumeEvent) -> Result<()> {
        self.push(Instruction::Wait(event))
    }

    /// Append a raw instruction. Used by stimulus modules.
    pub fn push(&mut self, instruction: Instruction) -> Result<()> {
        if !self.offline {
            return Err(Error::Offline(
                "instructions can only be appended inside the offline window".into(),
            ));
        }
        self.program.push(instruction);
        Ok(())
    }

    /// The assembled program in order.
    pub fn program(&self) -> &[Instruction] {
        &self.program
    }

    /// The program encoded as controller instruction words.
    pub fn encoded(&self) -> Vec<u32> {
        self.program.iter().map(Instruction::encode).collect()
    }

    pub fn tick_frequency_hz(&self) -> u32 {
        self.tick_frequency_hz
    }
}
