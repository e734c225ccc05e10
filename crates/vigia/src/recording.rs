//! Interaction recording and replay.
//!
//! While a recording is active, the router appends every executed
//! interaction command as a step. Replay re-executes the stored steps
//! through the simulator; per-step failures are collected, never
//! propagated, so one vanished element does not abort the rest of the
//! sequence.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::ClockHandle;
use crate::result::{VigiaError, VigiaResult};
use crate::simulate::{Simulator, TypeOptions};

/// One replayable interaction step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RecordedStep {
    /// A click on a selector
    Click {
        /// Target selector
        selector: String,
    },
    /// Text typed into a selector
    Type {
        /// Target selector
        selector: String,
        /// Typed text
        text: String,
    },
    /// A key combination
    Key {
        /// Combination such as `Control+Shift+K`
        combo: String,
        /// Key-down repeat count
        repeat: u32,
    },
}

/// A captured interaction sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    /// Recording identity
    pub id: Uuid,
    /// Engine time when recording started
    pub started_ms: u64,
    /// Engine time when recording stopped; `None` while active
    pub ended_ms: Option<u64>,
    /// Ordered steps
    pub steps: Vec<RecordedStep>,
}

/// Records interaction commands and replays the last completed recording.
pub struct Recorder {
    clock: ClockHandle,
    active: Option<Recording>,
    last: Option<Recording>,
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("recording", &self.is_recording())
            .finish_non_exhaustive()
    }
}

impl Recorder {
    /// Create an idle recorder.
    #[must_use]
    pub fn new(clock: ClockHandle) -> Self {
        Self {
            clock,
            active: None,
            last: None,
        }
    }

    /// Whether a recording is in progress.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Begin a new recording.
    pub fn start(&mut self) -> VigiaResult<Uuid> {
        if self.active.is_some() {
            return Err(VigiaError::invalid_state("recording already in progress"));
        }
        let id = Uuid::new_v4();
        self.active = Some(Recording {
            id,
            started_ms: self.clock.now_ms(),
            ended_ms: None,
            steps: Vec::new(),
        });
        debug!(%id, "recording started");
        Ok(id)
    }

    /// Stop the active recording and keep it for replay.
    pub fn stop(&mut self) -> VigiaResult<Recording> {
        let mut recording = self
            .active
            .take()
            .ok_or_else(|| VigiaError::invalid_state("no recording in progress"))?;
        recording.ended_ms = Some(self.clock.now_ms());
        debug!(id = %recording.id, steps = recording.steps.len(), "recording stopped");
        self.last = Some(recording.clone());
        Ok(recording)
    }

    /// Append a step to the active recording; no-op when idle.
    pub fn capture(&mut self, step: RecordedStep) {
        if let Some(recording) = &mut self.active {
            recording.steps.push(step);
        }
    }

    /// Replay the last completed recording through the simulator.
    pub fn replay(&self, simulator: &mut Simulator) -> VigiaResult<Value> {
        let recording = self
            .last
            .as_ref()
            .ok_or_else(|| VigiaError::invalid_state("no recording to replay"))?;
        let mut succeeded = 0usize;
        let mut failures: Vec<String> = Vec::new();
        for step in &recording.steps {
            let result = match step {
                RecordedStep::Click { selector } => simulator.click(selector),
                RecordedStep::Type { selector, text } => {
                    simulator.type_text(selector, text, &TypeOptions::default())
                }
                RecordedStep::Key { combo, repeat } => simulator.press_key(combo, *repeat),
            };
            match result {
                Ok(_) => succeeded += 1,
                Err(err) => {
                    warn!(%err, ?step, "replay step failed");
                    failures.push(err.to_string());
                }
            }
        }
        Ok(json!({
            "id": recording.id,
            "steps": recording.steps.len(),
            "succeeded": succeeded,
            "failed": failures,
        }))
    }

    /// Status summary for the protocol.
    #[must_use]
    pub fn status(&self) -> Value {
        json!({
            "recording": self.is_recording(),
            "activeSteps": self.active.as_ref().map_or(0, |r| r.steps.len()),
            "lastId": self.last.as_ref().map(|r| r.id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::page::fake::FakePage;
    use crate::page::Rect;

    fn recorder() -> (Recorder, std::sync::Arc<FakeClock>) {
        let clock = FakeClock::handle_at(100);
        (Recorder::new(clock.clone()), clock)
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn start_stop_produces_ordered_steps() {
            let (mut rec, clock) = recorder();
            rec.start().unwrap();
            rec.capture(RecordedStep::Click {
                selector: "#go".to_string(),
            });
            rec.capture(RecordedStep::Type {
                selector: "#name".to_string(),
                text: "ada".to_string(),
            });
            clock.advance(500);
            let recording = rec.stop().unwrap();
            assert_eq!(recording.started_ms, 100);
            assert_eq!(recording.ended_ms, Some(600));
            assert_eq!(recording.steps.len(), 2);
        }

        #[test]
        fn double_start_is_invalid() {
            let (mut rec, _) = recorder();
            rec.start().unwrap();
            assert!(matches!(
                rec.start(),
                Err(VigiaError::InvalidState { .. })
            ));
        }

        #[test]
        fn stop_without_start_is_invalid() {
            let (mut rec, _) = recorder();
            assert!(rec.stop().is_err());
        }

        #[test]
        fn capture_while_idle_is_dropped() {
            let (mut rec, _) = recorder();
            rec.capture(RecordedStep::Key {
                combo: "Escape".to_string(),
                repeat: 1,
            });
            rec.start().unwrap();
            assert_eq!(rec.stop().unwrap().steps.len(), 0);
        }
    }

    mod replay_tests {
        use super::*;

        #[test]
        fn replay_reexecutes_steps_and_reports_failures() {
            let page = FakePage::shared();
            let button = page.add_element(None, "button");
            page.set_id(button, "go");
            page.set_bounds(button, Rect::new(0.0, 0.0, 50.0, 20.0));

            let (mut rec, _) = recorder();
            rec.start().unwrap();
            rec.capture(RecordedStep::Click {
                selector: "#go".to_string(),
            });
            rec.capture(RecordedStep::Click {
                selector: "#gone".to_string(),
            });
            rec.stop().unwrap();

            let mut sim = Simulator::new(page.clone());
            let report = rec.replay(&mut sim).unwrap();
            assert_eq!(report["succeeded"], 1);
            assert_eq!(report["failed"].as_array().unwrap().len(), 1);
            assert!(page.dispatched_names().contains(&"click".to_string()));
        }

        #[test]
        fn replay_without_recording_is_invalid() {
            let (rec, _) = recorder();
            let mut sim = Simulator::new(FakePage::shared());
            assert!(rec.replay(&mut sim).is_err());
        }
    }
}
