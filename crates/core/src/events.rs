//! PES event spaces and bit allocation.
//!
//! The sequencer controller exposes two independent event spaces: action
//! events (bits the program asserts via EXECUTE) and resume events (bits a
//! WAIT blocks on). Each registered module contributes named events; the
//! registry walks modules in registration order and hands out one bit per
//! name from a per-space counter. The all-zero mask is the reserved NOP in
//! both spaces.
//!
//! Resume bits left unconsumed by modules are wired to GPIO capture inputs:
//! resume bit `i` (for `i` at or above the module-consumed count) observes
//! pin `i + pin_base`.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Width of an event bitmask operand.
pub const EVENT_MASK_BITS: u8 = 16;

/// Reserved canonical name resolving to the all-zero mask in both spaces.
pub const NOP_EVENT: &str = "NOP_EVENT";

/// A bitmask in the action-event space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionEvent(u16);

/// A bitmask in the resume-event space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResumeEvent(u16);

impl ActionEvent {
    /// The reserved no-op action.
    pub const NOP: ActionEvent = ActionEvent(0);

    /// Raw operand bits.
    pub fn mask(self) -> u16 {
        self.0
    }

    /// OR several action events into one EXECUTE operand.
    pub fn combine(events: &[ActionEvent]) -> ActionEvent {
        ActionEvent(events.iter().fold(0, |acc, e| acc | e.0))
    }
}

impl ResumeEvent {
    /// The reserved no-op resume condition.
    pub const NOP: ResumeEvent = ResumeEvent(0);

    /// Raw operand bits.
    pub fn mask(self) -> u16 {
        self.0
    }

    /// OR several resume events into one WAIT operand.
    pub fn combine(events: &[ResumeEvent]) -> ResumeEvent {
        ResumeEvent(events.iter().fold(0, |acc, e| acc | e.0))
    }
}

/// Event names a module contributes to the two spaces.
#[derive(Debug, Clone, Copy)]
pub struct ModuleEvents {
    /// Module name, prefix of every canonical event name.
    pub module: &'static str,
    /// Action event names, allocated in order.
    pub actions: &'static [&'static str],
    /// Resume event names, allocated in order.
    pub resumes: &'static [&'static str],
}

/// Immutable event map built once at sequencer initialization.
///
/// Canonical names are `<module>_<event>` and must be valid identifiers.
#[derive(Debug)]
pub struct EventRegistry {
    actions: HashMap<String, ActionEvent>,
    resumes: HashMap<String, ResumeEvent>,
    /// Resume bits consumed by module events; higher bits observe pins.
    module_resume_bits: u8,
    pin_base: u8,
}

impl EventRegistry {
    /// Allocate bits for every module in registration order.
    pub fn build(modules: &[ModuleEvents], pin_base: u8) -> Result<Self> {
        let mut actions = HashMap::new();
        let mut resumes = HashMap::new();
        actions.insert(NOP_EVENT.to_string(), ActionEvent::NOP);
        resumes.insert(NOP_EVENT.to_string(), ResumeEvent::NOP);

        let mut action_bit: u8 = 0;
        let mut resume_bit: u8 = 0;
        for module in modules {
            for &name in module.actions {
                let canonical = canonical_name(module.module, name)?;
                let bit = take_bit(&mut action_bit, "action", &canonical)?;
                if actions.insert(canonical.clone(), ActionEvent(1 << bit)).is_some() {
                    return Err(Error::Event(format!("duplicate action event {canonical}")));
                }
            }
            for &name in module.resumes {
                let canonical = canonical_name(module.module, name)?;
                let bit = take_bit(&mut resume_bit, "resume", &canonical)?;
                if resumes.insert(canonical.clone(), ResumeEvent(1 << bit)).is_some() {
                    return Err(Error::Event(format!("duplicate resume event {canonical}")));
                }
            }
        }

        Ok(Self {
            actions,
            resumes,
            module_resume_bits: resume_bit,
            pin_base,
        })
    }

    /// Look up an action event by canonical name.
    pub fn action(&self, canonical: &str) -> Result<ActionEvent> {
        self.actions
            .get(canonical)
            .copied()
            .ok_or_else(|| Error::Event(format!("unknown action event {canonical}")))
    }

    /// Look up a resume event by canonical name.
    pub fn resume(&self, canonical: &str) -> Result<ResumeEvent> {
        self.resumes
            .get(canonical)
            .copied()
            .ok_or_else(|| Error::Event(format!("unknown resume event {canonical}")))
    }

    /// Resume event observing a GPIO capture pin.
    ///
    /// Pin numbering starts at `pin_base`; the pin occupies the resume bit
    /// `pin - pin_base`, which must lie above the module-consumed bits.
    pub fn capture_pin(&self, pin: u8) -> Result<ResumeEvent> {
        let bit = pin
            .checked_sub(self.pin_base)
            .ok_or_else(|| Error::Event(format!("capture pin {pin} below pin base {}", self.pin_base)))?;
        if bit < self.module_resume_bits || bit >= EVENT_MASK_BITS {
            return Err(Error::Event(format!(
                "capture pin {pin} maps to resume bit {bit}, outside {}..{}",
                self.module_resume_bits, EVENT_MASK_BITS
            )));
        }
        Ok(ResumeEvent(1 << bit))
    }

    /// Resume bits consumed by module events.
    pub fn module_resume_bits(&self) -> u8 {
        self.module_resume_bits
    }
}

fn canonical_name(module: &str, event: &str) -> Result<String> {
    if event == NOP_EVENT {
        return Err(Error::Event(format!("{NOP_EVENT} is reserved (module {module})")));
    }
    let canonical = format!("{module}_{event}");
    let mut chars = canonical.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::Event(format!("{canonical} is not a valid identifier")));
    }
    Ok(canonical)
}

fn take_bit(next: &mut u8, space: &str, canonical: &str) -> Result<u8> {
    if *next >= EVENT_MASK_BITS {
        return Err(Error::Event(format!(
            "{space} event space exhausted at {canonical} ({EVENT_MASK_BITS} bits)"
        )));
    }
    let bit = *next;
    *next += 1;
    Ok(bit)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BSI: ModuleEvents = ModuleEvents {
        module: "bsi",
        actions: &["SEND"],
        resumes: &[],
    };
    const TIMER: ModuleEvents = ModuleEvents {
        module: "timer",
        actions: &["ARM", "CLEAR"],
        resumes: &["EXPIRED"],
    };

    #[test]
    fn bits_are_disjoint_per_space() {
        let reg = EventRegistry::build(&[BSI, TIMER], 0).unwrap();
        let send = reg.action("bsi_SEND").unwrap();
        let arm = reg.action("timer_ARM").unwrap();
        let clear = reg.action("timer_CLEAR").unwrap();
        assert_eq!(send.mask(), 1 << 0);
        assert_eq!(arm.mask(), 1 << 1);
        assert_eq!(clear.mask(), 1 << 2);
        assert_eq!(send.mask() & arm.mask(), 0);
        assert_eq!(arm.mask() & clear.mask(), 0);

        // Resume space counts independently from bit 0.
        assert_eq!(reg.resume("timer_EXPIRED").unwrap().mask(), 1 << 0);
    }

    #[test]
    fn registration_order_determines_bits() {
        let forward = EventRegistry::build(&[BSI, TIMER], 0).unwrap();
        let reversed = EventRegistry::build(&[TIMER, BSI], 0).unwrap();
        assert_eq!(forward.action("bsi_SEND").unwrap().mask(), 1 << 0);
        assert_eq!(reversed.action("bsi_SEND").unwrap().mask(), 1 << 2);
    }

    #[test]
    fn nop_is_zero_in_both_spaces() {
        let reg = EventRegistry::build(&[BSI, TIMER], 0).unwrap();
        assert_eq!(reg.action(NOP_EVENT).unwrap().mask(), 0);
        assert_eq!(reg.resume(NOP_EVENT).unwrap().mask(), 0);
        assert_eq!(ActionEvent::NOP.mask(), 0);
        assert_eq!(ResumeEvent::NOP.mask(), 0);
    }

    #[test]
    fn nop_name_is_reserved() {
        let bad = ModuleEvents {
            module: "bsi",
            actions: &[NOP_EVENT],
            resumes: &[],
        };
        assert!(EventRegistry::build(&[bad], 0).is_err());
    }

    #[test]
    fn invalid_identifier_rejected() {
        let bad = ModuleEvents {
            module: "bsi",
            actions: &["SEND NOW"],
            resumes: &[],
        };
        assert!(EventRegistry::build(&[bad], 0).is_err());
    }

    #[test]
    fn duplicate_canonical_name_rejected() {
        let dup = ModuleEvents {
            module: "bsi",
            actions: &["SEND", "SEND"],
            resumes: &[],
        };
        assert!(EventRegistry::build(&[dup], 0).is_err());
    }

    #[test]
    fn space_exhaustion_rejected() {
        const NAMES: [&str; 17] = [
            "E0", "E1", "E2", "E3", "E4", "E5", "E6", "E7", "E8", "E9", "E10", "E11", "E12",
            "E13", "E14", "E15", "E16",
        ];
        let wide = ModuleEvents {
            module: "m",
            actions: &NAMES,
            resumes: &[],
        };
        assert!(EventRegistry::build(&[wide], 0).is_err());
    }

    #[test]
    fn unused_resume_bits_map_to_capture_pins() {
        let reg = EventRegistry::build(&[TIMER], 4).unwrap();
        // timer_EXPIRED took resume bit 0; pins start at bit 1 → pin 5.
        assert!(reg.capture_pin(4).is_err());
        assert_eq!(reg.capture_pin(5).unwrap().mask(), 1 << 1);
        assert_eq!(reg.capture_pin(6).unwrap().mask(), 1 << 2);
        // Bit 16 would overflow the operand.
        assert!(reg.capture_pin(4 + EVENT_MASK_BITS).is_err());
        // Below the base.
        assert!(reg.capture_pin(3).is_err());
    }

    #[test]
    fn combine_ors_masks() {
        let reg = EventRegistry::build(&[TIMER], 0).unwrap();
        let arm = reg.action("timer_ARM").unwrap();
        let clear = reg.action("timer_CLEAR").unwrap();
        assert_eq!(ActionEvent::combine(&[arm, clear]).mask(), 0b11);
        assert_eq!(ActionEvent::combine(&[]).mask(), 0);
    }

    #[test]
    fn unknown_lookup_is_config_error() {
        let reg = EventRegistry::build(&[BSI], 0).unwrap();
        assert!(reg.action("bsi_RECV").is_err());
        assert!(reg.resume("bsi_SEND").is_err());
    }
}
