//! Per-connection session state.
//!
//! One `Session` lives exactly as long as its device connection. It records
//! the device's negotiated audio parameters, the latest upstream session
//! snapshot, and the pacing clock that gates `tts.stop` behind real
//! playback time.

use std::time::Duration;

use tokio::time::Instant;

use crate::protocol::device::AudioParams;
use crate::protocol::upstream::ServerSession;

/// Device audio parameters, frozen at the device hello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAudio {
    pub format: String,
    pub sample_rate: u32,
    pub channels: u8,
    pub frame_duration: u32,
    /// Samples per device frame at the device rate.
    pub frame_samples: usize,
}

impl DeviceAudio {
    pub fn from_params(params: &AudioParams) -> Self {
        Self {
            format: params.format.clone(),
            sample_rate: params.sample_rate,
            channels: params.channels,
            frame_duration: params.frame_duration,
            frame_samples: (params.frame_duration * params.sample_rate / 1000) as usize,
        }
    }
}

/// Wall-clock pacing for synthesized audio.
///
/// `first_delta` is unset iff no audio delta has been emitted in the
/// current response; it is re-armed on every response boundary.
#[derive(Debug, Default)]
pub struct PacingClock {
    first_delta: Option<Instant>,
    total_emitted_ms: u64,
}

impl PacingClock {
    /// Record the wall-clock start of the response's audio, once.
    pub fn mark_first_delta(&mut self) {
        if self.first_delta.is_none() {
            self.first_delta = Some(Instant::now());
        }
    }

    /// Account for one emitted frame of `ms` milliseconds.
    pub fn add_emitted(&mut self, ms: u64) {
        self.total_emitted_ms += ms;
    }

    /// How long the gateway still owes the device's playback buffer:
    /// emitted audio duration minus wall time since the first delta.
    pub fn remaining_wait(&self) -> Duration {
        let Some(first) = self.first_delta else {
            return Duration::ZERO;
        };
        if self.total_emitted_ms == 0 {
            return Duration::ZERO;
        }
        let elapsed = first.elapsed().as_millis() as u64;
        Duration::from_millis(self.total_emitted_ms.saturating_sub(elapsed))
    }

    /// Response boundary: forget the previous response entirely.
    pub fn reset(&mut self) {
        self.first_delta = None;
        self.total_emitted_ms = 0;
    }

    pub fn total_emitted_ms(&self) -> u64 {
        self.total_emitted_ms
    }
}

/// Everything one connection knows about its conversation.
#[derive(Debug)]
pub struct Session {
    /// Upstream-assigned id; empty until `session.created` arrives.
    id: String,
    pub device_audio: Option<DeviceAudio>,
    /// Last session descriptor the upstream reported.
    pub snapshot: Option<ServerSession>,
    pub pacing: PacingClock,
    pub default_voice: String,
    pub model_id: String,
}

impl Session {
    pub fn new(model_id: String, default_voice: String) -> Self {
        Self {
            id: String::new(),
            device_audio: None,
            snapshot: None,
            pacing: PacingClock::default(),
            default_voice,
            model_id,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Absorb a `session.created` / `session.updated` descriptor.
    pub fn apply_snapshot(&mut self, snapshot: ServerSession) {
        self.id = snapshot.id.clone();
        self.snapshot = Some(snapshot);
    }
}
