//! Safety-envelope simulator.
//!
//! Replays recorded frames against a behavior's speed and distance envelope,
//! the same limits the motor controller enforces on the real robot: clamp to
//! `max_speed`, slow down linearly between `slow_distance_cm` and
//! `stop_distance_cm`, stop inside `stop_distance_cm`.
//!
//! Frame snapshots are JSON objects; `obstacle_cm` and `target_speed` (m/s)
//! are read, everything else is ignored.

use crate::params::ParameterDocument;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reverie_core::error::{ReverieError, Result};
use reverie_core::session::Frame;
use reverie_core::simulation::{SimulationRun, Simulator, StepSignal};
use serde::{Deserialize, Serialize};

const DEFAULT_STOP_DISTANCE_CM: f64 = 8.0;
const DEFAULT_SLOW_DISTANCE_CM: f64 = 20.0;
const DEFAULT_REACTION_S: f64 = 0.25;
/// Frames without an obstacle reading are treated as open floor.
const OPEN_FLOOR_CM: f64 = 1_000.0;

/// World constants of the simulated environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    /// Uniform distance-sensor jitter, +/- cm
    pub sensor_noise_cm: f64,
    /// Braking deceleration in m/s²
    pub deceleration: f64,
    /// Stopping while the nearest obstacle is further than this is a stall
    pub stall_clearance_cm: f64,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            sensor_noise_cm: 1.5,
            deceleration: 2.0,
            stall_clearance_cm: 30.0,
        }
    }
}

/// Behavior envelope parameters read from the payload.
#[derive(Debug, Clone, Copy)]
struct Envelope {
    max_speed: f64,
    stop_distance_cm: f64,
    slow_distance_cm: f64,
    reaction_s: f64,
}

impl Envelope {
    fn from_payload(payload: &str) -> Result<Self> {
        let doc = ParameterDocument::parse(payload);
        let max_speed = doc
            .get("max_speed")
            .ok_or_else(|| ReverieError::simulation("behavior defines no max_speed"))?;
        if max_speed <= 0.0 {
            return Err(ReverieError::simulation(format!(
                "max_speed must be positive, got {}",
                max_speed
            )));
        }

        let stop_distance_cm = doc
            .get("stop_distance_cm")
            .unwrap_or(DEFAULT_STOP_DISTANCE_CM)
            .max(0.0);
        let slow_distance_cm = doc
            .get("slow_distance_cm")
            .unwrap_or(DEFAULT_SLOW_DISTANCE_CM)
            .max(stop_distance_cm);
        let reaction_s = doc.get("reaction_s").unwrap_or(DEFAULT_REACTION_S).max(0.0);

        Ok(Self {
            max_speed,
            stop_distance_cm,
            slow_distance_cm,
            reaction_s,
        })
    }

    /// Speed commanded for a sensed obstacle distance.
    fn command(&self, target_speed: f64, sensed_cm: f64) -> (f64, &'static str) {
        let cruise = target_speed.clamp(0.0, self.max_speed);
        if sensed_cm <= self.stop_distance_cm {
            (0.0, "stop")
        } else if sensed_cm < self.slow_distance_cm {
            let span = self.slow_distance_cm - self.stop_distance_cm;
            let factor = (sensed_cm - self.stop_distance_cm) / span;
            (cruise * factor, "slow")
        } else {
            (cruise, "cruise")
        }
    }
}

/// Deterministic simulator for the robot's obstacle-approach envelope.
#[derive(Debug, Clone, Default)]
pub struct SafetyEnvelopeSimulator {
    settings: SimulatorSettings,
}

impl SafetyEnvelopeSimulator {
    pub fn new(settings: SimulatorSettings) -> Self {
        Self { settings }
    }

    fn run(&self, frames: &[Frame], payload: &str, seed: u64) -> Result<SimulationRun> {
        let envelope = Envelope::from_payload(payload)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = self.settings.sensor_noise_cm.abs();

        let mut steps = Vec::with_capacity(frames.len());
        for (frame_index, frame) in frames.iter().enumerate() {
            let obstacle_cm = read_number(&frame.snapshot, "obstacle_cm").unwrap_or(OPEN_FLOOR_CM);
            let target_speed =
                read_number(&frame.snapshot, "target_speed").unwrap_or(envelope.max_speed);

            // Always draw, so the jitter sequence does not depend on the payload
            let jitter = rng.gen_range(-noise..=noise);
            let sensed_cm = (obstacle_cm + jitter).max(0.0);

            let (speed, action) = envelope.command(target_speed, sensed_cm);
            let stopping_cm = (speed * envelope.reaction_s
                + speed * speed / (2.0 * self.settings.deceleration))
                * 100.0;

            let fault = if speed > 0.0 && stopping_cm >= obstacle_cm {
                Some("collision".to_string())
            } else if speed == 0.0
                && target_speed > 0.0
                && obstacle_cm > self.settings.stall_clearance_cm
            {
                Some("stall".to_string())
            } else {
                None
            };

            let progress = if fault.as_deref() == Some("collision") {
                0.0
            } else if target_speed > 0.0 {
                (speed / target_speed).clamp(0.0, 1.0)
            } else {
                1.0
            };

            steps.push(StepSignal {
                frame_index,
                action: format!("{} @ {:.2} m/s", action, speed),
                progress,
                fault,
            });
        }

        let run = SimulationRun { steps };
        tracing::trace!(
            frames = frames.len(),
            faults = run.fault_count(),
            mean_progress = run.mean_progress(),
            "Envelope simulation finished"
        );
        Ok(run)
    }
}

fn read_number(snapshot: &serde_json::Value, field: &str) -> Option<f64> {
    snapshot.get(field).and_then(serde_json::Value::as_f64)
}

#[async_trait]
impl Simulator for SafetyEnvelopeSimulator {
    async fn simulate(&self, frames: &[Frame], payload: &str, seed: u64) -> Result<SimulationRun> {
        self.run(frames, payload, seed)
    }
}
