//! Button and slider stimulus: shared state word and keystroke helpers.
//!
//! The controller drives the device under test through a latchable state
//! word. Each button channel carries a 1-bit level plus a 1-bit driven
//! flag; channels not referenced by an instruction keep their previous
//! level and flag. Sliders carry a 2-bit contact state plus a driven flag.
//!
//! Helpers append a SET_BUTTONS (or SET_SLIDERS) instruction followed by
//! EXECUTE(bsi_SEND) so the new word is latched before the program moves
//! on. Hybrid (optical) switches are active-low on the matrix; their
//! press/release level is inverted here, never in the instruction layer.

use crate::error::{Error, Result};
use crate::events::{ActionEvent, EventRegistry, ModuleEvents};
use crate::pes::{Instruction, Pes};
use std::collections::HashSet;

/// Button channels the controller can drive.
pub const BUTTON_CHANNELS: u8 = 12;
/// Slider channels the controller can drive.
pub const SLIDER_CHANNELS: u8 = 6;

/// Bit offset of the button driven flags inside the state word.
const BUTTON_DRIVEN_SHIFT: u32 = BUTTON_CHANNELS as u32;
/// Bit offset of the slider driven flags inside the slider word.
const SLIDER_DRIVEN_SHIFT: u32 = 2 * SLIDER_CHANNELS as u32;

/// Slider contact states (2-bit encoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SliderState {
    NoContact = 0,
    NormallyConnected = 1,
    NormallyDisconnected = 2,
    NoContactAlt = 3,
}

/// Button/slider interface module: owns the shared state word between
/// instructions and resolves the latch event.
#[derive(Debug)]
pub struct ButtonSlider {
    buttons: u32,
    sliders: u32,
    hybrid_keys: HashSet<u8>,
    send: ActionEvent,
}

impl ButtonSlider {
    /// Events this module contributes to the registry.
    pub const EVENTS: ModuleEvents = ModuleEvents {
        module: "bsi",
        actions: &["SEND"],
        resumes: &[],
    };

    /// Resolve the latch event and seed an undriven state word.
    ///
    /// `hybrid_keys` lists the channels wired to optical switches, whose
    /// press/release level is inverted.
    pub fn new(registry: &EventRegistry, hybrid_keys: HashSet<u8>) -> Result<Self> {
        for &id in &hybrid_keys {
            validate_key(id)?;
        }
        Ok(Self {
            buttons: 0,
            sliders: 0,
            hybrid_keys,
            send: registry.action("bsi_SEND")?,
        })
    }

    /// Current packed button word (state bits low, driven flags high).
    pub fn button_word(&self) -> u32 {
        self.buttons
    }

    /// Current packed slider word.
    pub fn slider_word(&self) -> u32 {
        self.sliders
    }

    /// Press the given keys: drive their channels to the pressed level and
    /// latch.
    pub fn press(&mut self, pes: &mut Pes, ids: &[u8]) -> Result<()> {
        self.set_buttons(pes, ids, true)
    }

    /// Release the given keys and latch.
    pub fn release(&mut self, pes: &mut Pes, ids: &[u8]) -> Result<()> {
        self.set_buttons(pes, ids, false)
    }

    /// Press, hold for `duration_s`, then release, `repeat` times, with an
    /// optional `gap_s` delay appended after each release.
    pub fn keystroke(
        &mut self,
        pes: &mut Pes,
        id: u8,
        duration_s: f64,
        repeat: u32,
        gap_s: Option<f64>,
    ) -> Result<()> {
        if repeat == 0 {
            return Err(Error::OutOfRange {
                field: "repeat",
                value: 0,
                min: 1,
                max: u32::MAX as u64,
            });
        }
        validate_key(id)?;
        for _ in 0..repeat {
            self.press(pes, &[id])?;
            pes.delay(duration_s)?;
            self.release(pes, &[id])?;
            if let Some(gap) = gap_s {
                pes.delay(gap)?;
            }
        }
        Ok(())
    }

    /// Single press of the whole set, hold, single release.
    pub fn simultaneous_keystroke(
        &mut self,
        pes: &mut Pes,
        ids: &[u8],
        duration_s: f64,
    ) -> Result<()> {
        self.press(pes, ids)?;
        pes.delay(duration_s)?;
        self.release(pes, ids)
    }

    /// Press several keys without releasing: one latch for the union when
    /// `delay` is `None`, otherwise one press per key separated by DELAYs.
    pub fn multiple_keys_press(
        &mut self,
        pes: &mut Pes,
        ids: &[u8],
        delay: Option<f64>,
    ) -> Result<()> {
        match delay {
            None => self.press(pes, ids),
            Some(gap) => {
                for (n, &id) in ids.iter().enumerate() {
                    if n > 0 {
                        pes.delay(gap)?;
                    }
                    self.press(pes, &[id])?;
                }
                Ok(())
            }
        }
    }

    /// Drive a slider to the pressed contact state and latch.
    pub fn slider_press(&mut self, pes: &mut Pes, id: u8) -> Result<()> {
        self.set_slider(pes, id, SliderState::NormallyConnected)
    }

    /// Drive a slider to the released contact state and latch.
    pub fn slider_release(&mut self, pes: &mut Pes, id: u8) -> Result<()> {
        self.set_slider(pes, id, SliderState::NormallyDisconnected)
    }

    /// Drive a slider to an explicit contact state and latch.
    pub fn set_slider(&mut self, pes: &mut Pes, id: u8, state: SliderState) -> Result<()> {
        if id >= SLIDER_CHANNELS {
            return Err(Error::OutOfRange {
                field: "slider_id",
                value: id as u64,
                min: 0,
                max: (SLIDER_CHANNELS - 1) as u64,
            });
        }
        let shift = 2 * id as u32;
        self.sliders &= !(0b11 << shift);
        self.sliders |= (state as u32) << shift;
        self.sliders |= 1 << (SLIDER_DRIVEN_SHIFT + id as u32);
        pes.push(Instruction::SetSliders(self.sliders))?;
        pes.execute(self.send)
    }

    fn set_buttons(&mut self, pes: &mut Pes, ids: &[u8], pressed: bool) -> Result<()> {
        if ids.is_empty() {
            return Err(Error::OutOfRange {
                field: "key_ids",
                value: 0,
                min: 1,
                max: BUTTON_CHANNELS as u64,
            });
        }
        // Validate the whole set before touching the word.
        for &id in ids {
            validate_key(id)?;
        }
        for &id in ids {
            // Optical switches idle closed; their drive level is inverted.
            let level = pressed != self.hybrid_keys.contains(&id);
            if level {
                self.buttons |= 1 << id as u32;
            } else {
                self.buttons &= !(1 << id as u32);
            }
            self.buttons |= 1 << (BUTTON_DRIVEN_SHIFT + id as u32);
        }
        pes.push(Instruction::SetButtons(self.buttons))?;
        pes.execute(self.send)
    }
}

fn validate_key(id: u8) -> Result<()> {
    if id >= BUTTON_CHANNELS {
        return Err(Error::UnknownKey(id));
    }
    Ok(())
}
