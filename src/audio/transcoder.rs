//! Bidirectional streaming transcoder between the device's Opus frames and
//! the upstream's base64 linear PCM.
//!
//! The two directions never share mutable codec state: the uplink owns a
//! decoder plus the up-resampler, the downlink owns an encoder, the
//! down-resampler and the leftover buffer. Splitting the transcoder hands
//! each connection task exactly the half it is allowed to touch.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use base64::prelude::*;
use bytes::Bytes;

use super::codec::{FrameDecoder, FrameEncoder};
use super::resampler::Resampler;
use super::AudioError;

/// Sample rate the upstream speaks, both directions, mono.
pub const UPSTREAM_SAMPLE_RATE: u32 = 24000;

/// Async callback receiving each synthesized device frame.
///
/// The translator injects a sink that enqueues the frame on the device
/// write path and advances the session's pacing clock.
pub type FrameSink = Arc<dyn Fn(Bytes) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Fixed linear gain applied to each direction, saturating at i16 bounds.
#[derive(Debug, Clone, Copy)]
pub struct GainConfig {
    /// Device microphone audio on its way upstream.
    pub capture: f32,
    /// Synthesized audio on its way back to the device.
    pub playback: f32,
}

impl Default for GainConfig {
    fn default() -> Self {
        Self {
            capture: 3.0,
            playback: 8.0,
        }
    }
}

/// Device → upstream half: Opus frame in, base64 PCM out.
pub struct Uplink {
    decoder: FrameDecoder,
    resampler: Resampler,
    gain: f32,
}

impl Uplink {
    /// Decode one device frame, apply gain, resample to the upstream rate
    /// and base64-encode the result. Resampler state carries across frames.
    pub fn opus_to_pcm_base64(&mut self, frame: &[u8]) -> Result<String, AudioError> {
        if frame.is_empty() {
            return Err(AudioError::EmptyFrame);
        }
        let samples = self.decoder.decode(frame)?;
        let gained = apply_gain(&samples, self.gain);
        let resampled = self.resampler.process(&samples_to_bytes(&gained))?;
        Ok(BASE64_STANDARD.encode(&resampled))
    }
}

/// Upstream → device half: base64 PCM in, Opus frames out through the sink.
pub struct Downlink {
    encoder: FrameEncoder,
    resampler: Resampler,
    /// PCM that did not fill a whole device frame yet.
    leftover: Vec<i16>,
    /// Samples per emitted frame at the upstream rate.
    chunk: usize,
    gain: f32,
    sink: FrameSink,
}

impl Downlink {
    /// Ingest one base64 audio delta. Full device frames are encoded and
    /// delivered through the sink; the trailing remainder is carried
    /// forward. An empty delta is a silent no-op.
    pub async fn resolve_pcm(&mut self, delta: &str) -> Result<(), AudioError> {
        if delta.is_empty() {
            return Ok(());
        }
        let raw = BASE64_STANDARD.decode(delta)?;
        let samples = bytes_to_samples(&raw)?;
        let gained = apply_gain(&samples, self.gain);
        let leveled = self.resampler.process(&samples_to_bytes(&gained))?;
        self.leftover.extend(bytes_to_samples(&leveled)?);

        while self.leftover.len() >= self.chunk {
            let rest = self.leftover.split_off(self.chunk);
            let frame = std::mem::replace(&mut self.leftover, rest);
            let encoded = self.encoder.encode(&frame)?;
            (self.sink)(encoded).await;
        }
        Ok(())
    }

    /// Samples currently buffered below one frame.
    pub fn leftover_len(&self) -> usize {
        self.leftover.len()
    }
}

/// Factory wiring both directions for one session's audio parameters.
pub struct Transcoder {
    uplink: Uplink,
    downlink: Downlink,
}

impl Transcoder {
    /// `sample_rate` and `frame_duration_ms` come from the device hello;
    /// the sink receives every synthesized frame.
    pub fn new(
        sample_rate: u32,
        frame_duration_ms: u32,
        gain: GainConfig,
        sink: FrameSink,
    ) -> Result<Self, AudioError> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidSampleRate(sample_rate));
        }
        let uplink = Uplink {
            decoder: FrameDecoder::new(sample_rate, 1)?,
            resampler: Resampler::new(1, sample_rate, UPSTREAM_SAMPLE_RATE)?,
            gain: gain.capture,
        };
        let downlink = Downlink {
            encoder: FrameEncoder::new(UPSTREAM_SAMPLE_RATE, 1)?,
            resampler: Resampler::new(1, UPSTREAM_SAMPLE_RATE, UPSTREAM_SAMPLE_RATE)?,
            leftover: Vec::new(),
            chunk: (frame_duration_ms * UPSTREAM_SAMPLE_RATE / 1000) as usize,
            gain: gain.playback,
            sink,
        };
        Ok(Self { uplink, downlink })
    }

    /// Hand each connection task its own half.
    pub fn split(self) -> (Uplink, Downlink) {
        (self.uplink, self.downlink)
    }
}

fn apply_gain(samples: &[i16], gain: f32) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s as f32 * gain).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

fn bytes_to_samples(pcm: &[u8]) -> Result<Vec<i16>, AudioError> {
    if pcm.len() % 2 != 0 {
        return Err(AudioError::Shape {
            len: pcm.len(),
            align: 2,
        });
    }
    Ok(pcm
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect())
}
