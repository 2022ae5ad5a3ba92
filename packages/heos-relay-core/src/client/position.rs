//! Playback position projection.
//!
//! Devices report `cur_pos` only every few seconds. Between samples the
//! displayed position is extrapolated from wall-clock time while playing.
//! A sample replaces the extrapolated value only when they disagree by more
//! than [`POSITION_RESYNC_THRESHOLD_MS`], or when the play state changes.

use std::time::Instant;

use crate::protocol_constants::POSITION_RESYNC_THRESHOLD_MS;

use super::model::PlayState;

#[derive(Debug, Clone, Default)]
pub struct PositionTracker {
    /// Locally extrapolated position (ms).
    position_ms: Option<f64>,
    /// Latest device sample (ms).
    last_sample: Option<u64>,
    state: Option<PlayState>,
    last_tick: Option<Instant>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a `cur_pos` sample from the device.
    pub fn sample(&mut self, cur_pos_ms: u64, now: Instant) {
        self.last_sample = Some(cur_pos_ms);
        let sample = cur_pos_ms as f64;

        let resync = match self.position_ms {
            // A zero sample before anything is known carries no information
            None => cur_pos_ms != 0,
            Some(current) => cur_pos_ms != 0 && (sample - current).abs() > POSITION_RESYNC_THRESHOLD_MS,
        };
        if resync {
            self.set(Some(sample), now);
        }
    }

    /// Feeds the device's play state. A change resyncs to the latest sample.
    pub fn set_state(&mut self, state: PlayState, now: Instant) {
        if self.state == Some(state) {
            return;
        }
        self.state = Some(state);
        self.set(self.last_sample.map(|ms| ms as f64), now);
    }

    /// Advances the extrapolated position to `now`.
    ///
    /// Only moves while playing. Never touches the device sample or state.
    pub fn tick(&mut self, now: Instant) {
        let last = self.last_tick.replace(now);
        if self.state != Some(PlayState::Play) {
            return;
        }
        if let (Some(position), Some(last)) = (self.position_ms.as_mut(), last) {
            *position += now.saturating_duration_since(last).as_secs_f64() * 1000.0;
        }
    }

    /// Current displayed position (ms).
    pub fn position_ms(&self) -> Option<f64> {
        self.position_ms
    }

    pub fn state(&self) -> Option<PlayState> {
        self.state
    }

    fn set(&mut self, position_ms: Option<f64>, now: Instant) {
        self.position_ms = position_ms;
        self.last_tick = Some(now);
    }
}

/// Renders milliseconds as `MM:SS`, or `--:--` when unknown.
///
/// Minutes are not wrapped into hours.
pub fn format_mm_ss(ms: Option<f64>) -> String {
    match ms {
        Some(ms) if ms.is_finite() && ms >= 0.0 => {
            let total = (ms / 1000.0).floor() as u64;
            format!("{:02}:{:02}", total / 60, total % 60)
        }
        _ => "--:--".to_string(),
    }
}
