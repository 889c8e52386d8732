//! Sequencer facade: scenario assembly and play control.
//!
//! Owns the event registry, the PES program builder, and the button/slider
//! state. A test builds a scenario inside the offline window, then `play`
//! uploads the frozen program over a [`ControllerLink`], starts it, and
//! polls for completion. The program is retained, so a scenario can be
//! replayed without rebuilding.

use crate::buttons::{ButtonSlider, SliderState};
use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::events::{ActionEvent, EventRegistry, ResumeEvent};
use crate::pes::{Instruction, Pes};
use crate::transport::ControllerLink;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Completion poll interval during play.
const PLAY_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Stimulus sequencer bound to one bench configuration.
pub struct Sequencer {
    registry: EventRegistry,
    pes: Pes,
    bsi: ButtonSlider,
}

impl Sequencer {
    /// Build the event registry and seed module state from the bench
    /// configuration.
    pub fn new(config: &HarnessConfig) -> Result<Self> {
        config.validate()?;
        let registry = EventRegistry::build(&[ButtonSlider::EVENTS], config.capture_pin_base)?;
        let bsi = ButtonSlider::new(&registry, config.hybrid_keys.iter().copied().collect())?;
        let pes = Pes::new(config.tick_frequency_hz)?;
        Ok(Self { registry, pes, bsi })
    }

    /// The immutable event map.
    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Open the program-build window, discarding any previous scenario.
    pub fn begin_offline(&mut self) -> Result<()> {
        self.pes.begin_offline()
    }

    /// Close the program-build window without playing.
    pub fn end_offline(&mut self) -> Result<()> {
        self.pes.end_offline()
    }

    /// The assembled scenario, in program order.
    pub fn program(&self) -> &[Instruction] {
        self.pes.program()
    }

    // Scenario helpers; each appends instructions inside the offline window.

    pub fn delay(&mut self, seconds: f64) -> Result<()> {
        self.pes.delay(seconds)
    }

    pub fn execute(&mut self, event: ActionEvent) -> Result<()> {
        self.pes.execute(event)
    }

    pub fn wait(&mut self, event: ResumeEvent) -> Result<()> {
        self.pes.wait(event)
    }

    pub fn press(&mut self, ids: &[u8]) -> Result<()> {
        self.bsi.press(&mut self.pes, ids)
    }

    pub fn release(&mut self, ids: &[u8]) -> Result<()> {
        self.bsi.release(&mut self.pes, ids)
    }

    pub fn keystroke(
        &mut self,
        id: u8,
        duration_s: f64,
        repeat: u32,
        gap_s: Option<f64>,
    ) -> Result<()> {
        self.bsi.keystroke(&mut self.pes, id, duration_s, repeat, gap_s)
    }

    pub fn simultaneous_keystroke(&mut self, ids: &[u8], duration_s: f64) -> Result<()> {
        self.bsi.simultaneous_keystroke(&mut self.pes, ids, duration_s)
    }

    pub fn multiple_keys_press(&mut self, ids: &[u8], delay: Option<f64>) -> Result<()> {
        self.bsi.multiple_keys_press(&mut self.pes, ids, delay)
    }

    pub fn slider_press(&mut self, id: u8) -> Result<()> {
        self.bsi.slider_press(&mut self.pes, id)
    }

    pub fn slider_release(&mut self, id: u8) -> Result<()> {
        self.bsi.slider_release(&mut self.pes, id)
    }

    pub fn set_slider(&mut self, id: u8, state: SliderState) -> Result<()> {
        self.bsi.set_slider(&mut self.pes, id, state)
    }

    /// End offline mode (if still open), upload the program, start it, and
    /// wait for completion.
    ///
    /// A timeout is a recoverable [`Error::Program`]; the program is kept
    /// and [`replay`](Sequencer::replay) may try again.
    pub fn play(&mut self, link: &dyn ControllerLink, timeout: Duration) -> Result<()> {
        if self.pes.is_offline() {
            self.pes.end_offline()?;
        }
        self.run(link, timeout)
    }

    /// Re-run the retained program.
    pub fn replay(&mut self, link: &dyn ControllerLink, timeout: Duration) -> Result<()> {
        if self.pes.is_offline() {
            return Err(Error::Offline("cannot replay inside the offline window".into()));
        }
        self.run(link, timeout)
    }

    fn run(&self, link: &dyn ControllerLink, timeout: Duration) -> Result<()> {
        if self.pes.program().is_empty() {
            return Err(Error::Program("empty program".into()));
        }

        let encoded = self.pes.encoded();
        debug!(words = encoded.len(), "uploading program");
        link.upload(&encoded)?;
        link.start()?;

        let deadline = Instant::now() + timeout;
        loop {
            if link.poll_complete()? {
                info!(instructions = encoded.len(), "scenario complete");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Program(format!(
                    "play timed out after {} ms",
                    timeout.as_millis()
                )));
            }
            std::thread::sleep(PLAY_POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockController;

    fn sequencer() -> Sequencer {
        Sequencer::new(&HarnessConfig::default()).unwrap()
    }

    #[test]
    fn play_uploads_starts_and_completes() {
        let mut seq = sequencer();
        seq.begin_offline().unwrap();
        seq.keystroke(3, 0.050, 1, None).unwrap();

        let link = MockController::new();
        link.complete_after_polls(1);
        seq.play(&link, Duration::from_secs(1)).unwrap();

        let uploads = link.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].len(), 5); // press, latch, delay, release, latch
        assert_eq!(link.starts(), 1);
    }

    #[test]
    fn play_with_empty_program_is_program_error() {
        let mut seq = sequencer();
        seq.begin_offline().unwrap();
        let link = MockController::new();
        assert!(matches!(
            seq.play(&link, Duration::from_secs(1)),
            Err(Error::Program(_))
        ));
    }

    #[test]
    fn play_timeout_is_recoverable_and_replay_works() {
        let mut seq = sequencer();
        seq.begin_offline().unwrap();
        seq.press(&[0]).unwrap();

        let link = MockController::new();
        link.never_complete();
        let result = seq.play(&link, Duration::from_millis(30));
        assert!(matches!(result, Err(Error::Program(_))));

        // Same program replays on a healthy link.
        let link = MockController::new();
        seq.replay(&link, Duration::from_secs(1)).unwrap();
        assert_eq!(link.uploads().len(), 1);
    }

    #[test]
    fn replay_requires_frozen_program() {
        let mut seq = sequencer();
        seq.begin_offline().unwrap();
        seq.press(&[0]).unwrap();
        let link = MockController::new();
        assert!(seq.replay(&link, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn upload_failure_propagates() {
        let mut seq = sequencer();
        seq.begin_offline().unwrap();
        seq.press(&[0]).unwrap();

        let link = MockController::new();
        link.fail_upload();
        assert!(seq.play(&link, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn helpers_reject_calls_outside_offline_window() {
        let mut seq = sequencer();
        assert!(seq.press(&[0]).is_err());
        assert!(seq.delay(0.01).is_err());
        assert!(seq.keystroke(0, 0.01, 1, None).is_err());
    }

    #[test]
    fn scenario_can_wait_on_a_capture_pin() {
        let mut seq = sequencer();
        // bsi contributes no resume events, so pin 0 backs resume bit 0.
        let pin = seq.registry().capture_pin(0).unwrap();
        assert_eq!(pin.mask(), 1);

        // Press a key, hold until the LED line fires, then release.
        seq.begin_offline().unwrap();
        seq.press(&[2]).unwrap();
        seq.wait(pin).unwrap();
        seq.release(&[2]).unwrap();

        let link = MockController::new();
        seq.play(&link, Duration::from_secs(1)).unwrap();
        assert_eq!(link.uploads()[0].len(), 5);
    }
}
