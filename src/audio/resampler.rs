//! Stateful PCM sample-rate conversion.
//!
//! Cubic-spline interpolation over a sliding window of four consecutive
//! input samples. Position tracking happens in the input sample domain via
//! per-channel `(written, consumed)` counters, so arbitrary input chunk
//! sizes produce the same continuous output as one monolithic call. Samples
//! past the last fully-usable position are retained in a per-channel cache
//! and prepended to the next call.

use super::AudioError;

/// Safety margin of trailing input samples never consumed in one pass, so
/// the spline window always has valid neighbours on the next call.
const TAIL_MARGIN: usize = 16;

/// Per-channel resampling state.
#[derive(Debug, Default)]
struct ChannelState {
    /// Unconsumed tail of the previous input buffer.
    cache: Vec<i16>,
    /// Total output samples written.
    written: u64,
    /// Total input samples consumed.
    consumed: u64,
}

/// 16-bit PCM resampler from `isr` to `osr`, mono or stereo.
///
/// Left and right channels are resampled independently with independent
/// state and re-interleaved on output. The type is move-only by
/// construction; one instance belongs to exactly one transcoder direction.
#[derive(Debug)]
pub struct Resampler {
    channels: usize,
    isr: u32,
    osr: u32,
    left: ChannelState,
    right: ChannelState,
}

impl Resampler {
    pub fn new(channels: usize, isr: u32, osr: u32) -> Result<Self, AudioError> {
        if channels < 1 || channels > 2 {
            return Err(AudioError::UnsupportedChannels(channels));
        }
        if isr == 0 {
            return Err(AudioError::InvalidSampleRate(isr));
        }
        if osr == 0 {
            return Err(AudioError::InvalidSampleRate(osr));
        }
        Ok(Self {
            channels,
            isr,
            osr,
            left: ChannelState::default(),
            right: ChannelState::default(),
        })
    }

    pub fn rates(&self) -> (usize, u32, u32) {
        (self.channels, self.isr, self.osr)
    }

    /// Resample one buffer of interleaved little-endian 16-bit PCM.
    ///
    /// Returns the resampled bytes, which may be empty when the input (plus
    /// cached tail) is too short to produce any output; the samples are
    /// retained for the next call. When `isr == osr` the input passes
    /// through untouched.
    pub fn process(&mut self, pcm: &[u8]) -> Result<Vec<u8>, AudioError> {
        if pcm.is_empty() {
            return Ok(Vec::new());
        }
        let align = 2 * self.channels;
        if pcm.len() % align != 0 {
            return Err(AudioError::Shape {
                len: pcm.len(),
                align,
            });
        }
        if self.isr == self.osr {
            return Ok(pcm.to_vec());
        }

        let mut ileft = deinterleave(pcm, self.channels, 0);
        if !self.left.cache.is_empty() {
            let mut joined = std::mem::take(&mut self.left.cache);
            joined.extend_from_slice(&ileft);
            ileft = joined;
        }

        let mut iright = Vec::new();
        if self.channels == 2 {
            iright = deinterleave(pcm, self.channels, 1);
            if !self.right.cache.is_empty() {
                let mut joined = std::mem::take(&mut self.right.cache);
                joined.extend_from_slice(&iright);
                iright = joined;
            }
        }

        let (oleft, consumed) =
            resample_channel(&ileft, self.isr, self.osr, self.left.written, self.left.consumed);
        self.left.written += oleft.len() as u64;
        self.left.consumed += consumed as u64;
        if consumed < ileft.len() {
            self.left.cache = ileft.split_off(consumed);
        }

        let mut oright = Vec::new();
        if self.channels == 2 {
            let (out, consumed) = resample_channel(
                &iright,
                self.isr,
                self.osr,
                self.right.written,
                self.right.consumed,
            );
            oright = out;
            self.right.written += oright.len() as u64;
            self.right.consumed += consumed as u64;
            if consumed < iright.len() {
                self.right.cache = iright.split_off(consumed);
            }
        }

        Ok(interleave(&oleft, &oright))
    }
}

/// Resample one channel. `written` and `org` are the running output/input
/// counters; the return value is the produced samples plus how many input
/// samples were consumed.
fn resample_channel(ipcm: &[i16], isr: u32, osr: u32, written: u64, org: u64) -> (Vec<i16>, usize) {
    if ipcm.len() <= TAIL_MARGIN {
        return (Vec::new(), 0);
    }

    let available = ipcm.len() - TAIL_MARGIN;
    let step = isr as f64 / osr as f64;
    // The next output position in the global input sample domain.
    let x0 = step * written as f64;
    let last = org + available as u64;

    let mut opcm = Vec::with_capacity((available as f64 / step) as usize + 1);
    let mut consumed = 0usize;
    let mut x = x0;
    while x < last as f64 {
        let xi0 = x as u64;
        let yi0 = (xi0 - org) as usize;
        let window = [
            ipcm[yi0] as f64,
            ipcm[yi0 + 1] as f64,
            ipcm[yi0 + 2] as f64,
            ipcm[yi0 + 3] as f64,
        ];
        opcm.push(spline(xi0 as f64, &window, x) as i16);
        consumed = (xi0 - org) as usize + 1;
        x += step;
    }

    (opcm, consumed)
}

/// Natural cubic spline through four points at `x0..x0+3`, evaluated at `x`
/// (with boundary second derivatives m0 = m3 = 0).
fn spline(x0: f64, y: &[f64; 4], x: f64) -> f64 {
    let (x1, x2, x3) = (x0 + 1.0, x0 + 2.0, x0 + 3.0);
    let (h0, h1, h2) = (x1 - x0, x2 - x1, x3 - x2);

    let u1 = h1 / (h1 + h0);
    let l2 = h1 / (h2 + h1);
    let c1 = 6.0 / (h0 + h1) * ((y[2] - y[1]) / h1 - (y[1] - y[0]) / h0);
    let c2 = 6.0 / (h1 + h2) * ((y[3] - y[2]) / h2 - (y[2] - y[1]) / h1);
    let m1 = (c1 / u1 - c2 / 2.0) / (2.0 / u1 - l2 / 2.0);
    let m2 = (c1 / 2.0 - c2 / l2) / (u1 / 2.0 - 2.0 / l2);

    if x <= x1 {
        (x - x0).powi(3) * m1 / (6.0 * h0) - y[0] * (x - x1) / h0
            + (y[1] - h0 * h0 * m1 / 6.0) * (x - x0) / h0
    } else if x <= x2 {
        -(x - x2).powi(3) * m1 / (6.0 * h1) + (x - x1).powi(3) * m2 / (6.0 * h1)
            - (y[1] - h1 * h1 * m1 / 6.0) * (x - x2) / h1
            + (y[2] - h1 * h1 * m2 / 6.0) * (x - x1) / h1
    } else {
        -(x - x3).powi(3) * m2 / (6.0 * h2) - (y[2] - h2 * h2 * m2 / 6.0) * (x - x3) / h2
            + y[3] * (x - x2) / h2
    }
}

/// Extract one channel of interleaved little-endian samples.
fn deinterleave(pcm: &[u8], channels: usize, channel: usize) -> Vec<i16> {
    let mut out = Vec::with_capacity(pcm.len() / (2 * channels));
    let mut i = 2 * channel;
    while i + 1 < pcm.len() {
        out.push(i16::from_le_bytes([pcm[i], pcm[i + 1]]));
        i += 2 * channels;
    }
    out
}

/// Merge left and (possibly empty) right back into interleaved bytes.
fn interleave(left: &[i16], right: &[i16]) -> Vec<u8> {
    let stereo = !right.is_empty();
    let mut out = Vec::with_capacity(left.len() * if stereo { 4 } else { 2 });
    for (i, v) in left.iter().enumerate() {
        out.extend_from_slice(&v.to_le_bytes());
        if stereo {
            out.extend_from_slice(&right[i].to_le_bytes());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_pcm(samples: usize, rate: f64) -> Vec<u8> {
        let mut out = Vec::with_capacity(samples * 2);
        for i in 0..samples {
            let t = i as f64 / rate;
            let v = ((t * 440.0 * 2.0 * std::f64::consts::PI).sin() * 12000.0) as i16;
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_identity_rate_is_bit_exact() {
        let mut rs = Resampler::new(1, 24000, 24000).unwrap();
        let pcm = sine_pcm(480, 24000.0);
        let out = rs.process(&pcm).unwrap();
        assert_eq!(out, pcm);
    }

    #[test]
    fn test_rejects_bad_shape() {
        let mut rs = Resampler::new(1, 16000, 24000).unwrap();
        let err = rs.process(&[0u8; 3]).unwrap_err();
        assert!(matches!(err, AudioError::Shape { len: 3, align: 2 }));

        let mut stereo = Resampler::new(2, 16000, 24000).unwrap();
        let err = stereo.process(&[0u8; 6]).unwrap_err();
        assert!(matches!(err, AudioError::Shape { len: 6, align: 4 }));
    }

    #[test]
    fn test_rejects_bad_construction() {
        assert!(Resampler::new(0, 16000, 24000).is_err());
        assert!(Resampler::new(3, 16000, 24000).is_err());
        assert!(Resampler::new(1, 0, 24000).is_err());
        assert!(Resampler::new(1, 16000, 0).is_err());
    }

    #[test]
    fn test_short_input_yields_empty_and_is_retained() {
        let mut rs = Resampler::new(1, 16000, 24000).unwrap();
        // Too short to clear the tail margin: nothing comes out yet.
        let out = rs.process(&sine_pcm(8, 16000.0)).unwrap();
        assert!(out.is_empty());
        // Feeding more eventually produces output that accounts for the
        // retained samples.
        let out = rs.process(&sine_pcm(160, 16000.0)).unwrap();
        assert!(!out.is_empty());
    }

    #[test]
    fn test_upsample_ratio() {
        let mut rs = Resampler::new(1, 16000, 24000).unwrap();
        let mut total_out = 0usize;
        for _ in 0..50 {
            let out = rs.process(&sine_pcm(320, 16000.0)).unwrap();
            total_out += out.len() / 2;
        }
        // 16000 input samples at a 2:3 ratio come out near 24000, minus the
        // tail margin that is still cached.
        let ideal = 24000;
        assert!(total_out > ideal - 100 && total_out <= ideal);
    }

    #[test]
    fn test_chunked_matches_monolithic() {
        let pcm = sine_pcm(1600, 16000.0);

        let mut mono = Resampler::new(1, 16000, 24000).unwrap();
        let whole = mono.process(&pcm).unwrap();

        let mut chunked = Resampler::new(1, 16000, 24000).unwrap();
        let mut pieces = Vec::new();
        for chunk in pcm.chunks(320) {
            pieces.extend_from_slice(&chunked.process(chunk).unwrap());
        }

        let a: Vec<i16> = whole
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        let b: Vec<i16> = pieces
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();

        let common = a.len().min(b.len());
        assert!(a.len().abs_diff(b.len()) <= 8);
        for i in 0..common {
            assert!(
                (a[i] as i32 - b[i] as i32).abs() <= 1,
                "sample {i} diverged: {} vs {}",
                a[i],
                b[i]
            );
        }
    }

    #[test]
    fn test_stereo_channels_stay_independent() {
        let mut rs = Resampler::new(2, 16000, 24000).unwrap();
        // Left channel silent, right channel loud: after resampling the left
        // samples must remain near zero.
        let mut pcm = Vec::new();
        for i in 0..640 {
            pcm.extend_from_slice(&0i16.to_le_bytes());
            let t = i as f64 / 16000.0;
            let v = ((t * 440.0 * 2.0 * std::f64::consts::PI).sin() * 12000.0) as i16;
            pcm.extend_from_slice(&v.to_le_bytes());
        }
        let out = rs.process(&pcm).unwrap();
        assert!(!out.is_empty());
        assert_eq!(out.len() % 4, 0);
        let mut right_energy = 0i64;
        for frame in out.chunks_exact(4) {
            let l = i16::from_le_bytes([frame[0], frame[1]]);
            let r = i16::from_le_bytes([frame[2], frame[3]]);
            assert_eq!(l, 0);
            right_energy += (r as i64).abs();
        }
        assert!(right_energy > 0);
    }
}
