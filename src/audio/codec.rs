//! Thin wrappers around the streaming Opus codec.
//!
//! Encoder and decoder instances are stateful and not thread-safe; each
//! transcoder direction owns its private instance and nothing else touches
//! it.

use bytes::Bytes;
use opus::{Application, Channels, Decoder, Encoder};

use super::AudioError;

/// Upper bound on one encoded Opus frame.
pub const MAX_OPUS_FRAME_BYTES: usize = 1275;

/// Decode buffer size in samples, enough for the longest legal frame.
const DECODE_BUFFER_SAMPLES: usize = 4096;

fn channel_layout(channels: usize) -> Result<Channels, AudioError> {
    match channels {
        1 => Ok(Channels::Mono),
        2 => Ok(Channels::Stereo),
        other => Err(AudioError::UnsupportedChannels(other)),
    }
}

/// Streaming Opus decoder for one direction of a session.
pub struct FrameDecoder {
    decoder: Decoder,
    channels: usize,
    buf: Vec<i16>,
}

impl FrameDecoder {
    pub fn new(sample_rate: u32, channels: usize) -> Result<Self, AudioError> {
        let decoder = Decoder::new(sample_rate, channel_layout(channels)?)
            .map_err(|e| AudioError::Decode(e.to_string()))?;
        Ok(Self {
            decoder,
            channels,
            buf: vec![0i16; DECODE_BUFFER_SAMPLES],
        })
    }

    /// Decode one compressed frame into interleaved 16-bit samples.
    pub fn decode(&mut self, frame: &[u8]) -> Result<Vec<i16>, AudioError> {
        let samples = self
            .decoder
            .decode(frame, &mut self.buf, false)
            .map_err(|e| AudioError::Decode(e.to_string()))?;
        Ok(self.buf[..samples * self.channels].to_vec())
    }
}

/// Streaming Opus encoder for one direction of a session.
pub struct FrameEncoder {
    encoder: Encoder,
    buf: Vec<u8>,
}

impl FrameEncoder {
    pub fn new(sample_rate: u32, channels: usize) -> Result<Self, AudioError> {
        let encoder = Encoder::new(sample_rate, channel_layout(channels)?, Application::Voip)
            .map_err(|e| AudioError::Encode(e.to_string()))?;
        Ok(Self {
            encoder,
            buf: vec![0u8; MAX_OPUS_FRAME_BYTES],
        })
    }

    /// Encode interleaved 16-bit samples; the input length must be a legal
    /// Opus frame size for the configured rate.
    pub fn encode(&mut self, pcm: &[i16]) -> Result<Bytes, AudioError> {
        let n = self
            .encoder
            .encode(pcm, &mut self.buf)
            .map_err(|e| AudioError::Encode(e.to_string()))?;
        Ok(Bytes::copy_from_slice(&self.buf[..n]))
    }
}
