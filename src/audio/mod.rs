//! Streaming audio pipeline: Opus frame codec, PCM resampling and the
//! bidirectional transcoder that bridges device-format frames and the
//! upstream's raw PCM.

pub mod codec;
pub mod resampler;
pub mod transcoder;

pub use codec::{FrameDecoder, FrameEncoder, MAX_OPUS_FRAME_BYTES};
pub use resampler::Resampler;
pub use transcoder::{Downlink, FrameSink, GainConfig, Transcoder, Uplink, UPSTREAM_SAMPLE_RATE};

use thiserror::Error;

/// Errors produced by the audio pipeline.
///
/// A single bad frame must not kill a session: everything here is
/// recoverable at the dispatch boundary and surfaces as a device `error`
/// event while the connection stays open.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(usize),

    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("opus decode failed: {0}")]
    Decode(String),

    #[error("opus encode failed: {0}")]
    Encode(String),

    #[error("invalid pcm buffer: {len} bytes is not a multiple of {align}")]
    Shape { len: usize, align: usize },

    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("empty audio frame")]
    EmptyFrame,
}
