//! The token codec: tokens in, near-ultrasonic audio out, and back again.
//!
//! [`FskCodec`] uses 16-ary frequency-shift keying. Each 4-bit symbol is a
//! short tone burst at one of sixteen carriers in the 18–19.5 kHz band,
//! followed by a silent guard interval that absorbs clock drift and room
//! reverberation. A frame looks like this:
//!
//! ```text
//! | preamble (4 tones) | token (32 bytes = 64 symbols) | CRC-16 (4 symbols) |
//! ```
//!
//! Decoding finds the preamble by scanning the buffer for windows whose
//! energy sits at the expected preamble tones, aligns on the best match,
//! then demaps every following symbol with a Goertzel filter bank and
//! validates the checksum. A corrupted frame is rejected rather than
//! decoded to a wrong token.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::crc::crc16;
use crate::token::TOKEN_WIRE_LEN;
use crate::{AudioFrame, DecodeError, ProtocolError, Token};

/// Number of distinct data tones (one per nibble value).
pub const DATA_TONES: usize = 16;

/// Bytes carried after the preamble: the token plus its CRC.
const FRAME_BYTES: usize = TOKEN_WIRE_LEN + 2;

/// Data symbols per frame (two nibbles per byte).
const DATA_SYMBOLS: usize = FRAME_BYTES * 2;

/// Windows with less energy than this are treated as silence.
const SILENCE_ENERGY: f64 = 1e-9;

/// Converts tokens to and from audio.
///
/// Implementations must be deterministic: the same token always encodes to
/// the same samples, so a broadcast can be re-rendered for diagnostics.
pub trait TokenCodec: Send + Sync + 'static {
    /// Renders a token as an audio frame ready for the speaker.
    fn encode(&self, token: &Token) -> AudioFrame;

    /// Recovers a token from captured audio.
    ///
    /// # Errors
    /// Returns a [`DecodeError`] describing why no valid frame was found.
    fn decode(&self, audio: &AudioFrame) -> Result<Token, DecodeError>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Physical-layer parameters of the FSK signal.
///
/// The defaults put the sixteen data tones exactly 100 Hz apart on a
/// 10 ms symbol, so every tone completes a whole number of cycles per
/// symbol and the tones are mutually orthogonal under the decoder's
/// filter bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Samples per second for both encode and decode.
    pub sample_rate: u32,
    /// Frequency of nibble `0x0`.
    pub base_frequency_hz: f64,
    /// Distance between adjacent data tones.
    pub tone_spacing_hz: f64,
    /// Length of one tone burst.
    pub symbol_samples: usize,
    /// Silence after each tone burst.
    pub guard_samples: usize,
    /// Raised-cosine fade at each end of a burst, to avoid audible clicks.
    pub ramp_samples: usize,
    /// Peak amplitude of a burst, `0.0..=1.0`.
    pub amplitude: f32,
    /// Tones that open every frame, in order.
    pub preamble_hz: Vec<f64>,
    /// Minimum normalized tone energy (`0.0..1.0`) for a window to count
    /// as a preamble symbol.
    pub detection_threshold: f64,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            base_frequency_hz: 18_000.0,
            tone_spacing_hz: 100.0,
            symbol_samples: 480,
            guard_samples: 240,
            ramp_samples: 24,
            amplitude: 0.5,
            preamble_hz: vec![19_700.0, 19_900.0, 19_700.0, 19_900.0],
            detection_threshold: 0.6,
        }
    }
}

impl CodecConfig {
    /// Samples from the start of one symbol to the start of the next.
    pub fn symbol_period(&self) -> usize {
        self.symbol_samples + self.guard_samples
    }

    /// Frequency of the tone carrying `nibble`.
    pub fn data_tone(&self, nibble: u8) -> f64 {
        self.base_frequency_hz + f64::from(nibble & 0x0F) * self.tone_spacing_hz
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        let invalid = |msg: String| Err(ProtocolError::InvalidConfig(msg));

        if self.sample_rate == 0 {
            return invalid("sample_rate must be positive".into());
        }
        if self.symbol_samples == 0 {
            return invalid("symbol_samples must be positive".into());
        }
        if self.ramp_samples * 2 > self.symbol_samples {
            return invalid(format!(
                "ramp_samples {} does not fit twice in a {}-sample symbol",
                self.ramp_samples, self.symbol_samples
            ));
        }
        if !(self.amplitude > 0.0 && self.amplitude <= 1.0) {
            return invalid(format!("amplitude {} outside (0, 1]", self.amplitude));
        }
        if !(self.tone_spacing_hz > 0.0 && self.base_frequency_hz > 0.0) {
            return invalid("tone frequencies must be positive".into());
        }
        if self.preamble_hz.is_empty() {
            return invalid("preamble must contain at least one tone".into());
        }
        if !(self.detection_threshold > 0.0 && self.detection_threshold < 1.0) {
            return invalid(format!(
                "detection_threshold {} outside (0, 1)",
                self.detection_threshold
            ));
        }

        let nyquist = f64::from(self.sample_rate) / 2.0;
        let highest = self
            .preamble_hz
            .iter()
            .copied()
            .fold(self.data_tone(0x0F), f64::max);
        if highest >= nyquist {
            return invalid(format!(
                "tone {highest} Hz is at or above Nyquist ({nyquist} Hz)"
            ));
        }

        // Tones that are not whole multiples of the filter bin width leak
        // into their neighbours. Decoding still works, but with less margin.
        let bin = f64::from(self.sample_rate) / self.symbol_samples as f64;
        let ratio = self.tone_spacing_hz / bin;
        if (ratio - ratio.round()).abs() > 1e-6 {
            warn!(
                spacing_hz = self.tone_spacing_hz,
                bin_hz = bin,
                "tone spacing is not a multiple of the bin width"
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FskCodec
// ---------------------------------------------------------------------------

/// 16-FSK implementation of [`TokenCodec`].
#[derive(Debug, Clone)]
pub struct FskCodec {
    config: CodecConfig,
    tones: [f64; DATA_TONES],
}

impl FskCodec {
    /// Builds a codec after checking the configuration is decodable.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidConfig`] for zero-length symbols,
    /// tones at or above Nyquist, or out-of-range amplitude/threshold.
    pub fn new(config: CodecConfig) -> Result<Self, ProtocolError> {
        config.validate()?;
        let mut tones = [0.0; DATA_TONES];
        for (nibble, tone) in (0u8..).zip(tones.iter_mut()) {
            *tone = config.data_tone(nibble);
        }
        Ok(Self { config, tones })
    }

    /// The configuration this codec was built with.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Total symbols in a frame, preamble included.
    pub fn symbols_per_frame(&self) -> usize {
        self.config.preamble_hz.len() + DATA_SYMBOLS
    }

    /// Length in samples of an encoded frame.
    pub fn frame_samples(&self) -> usize {
        self.symbols_per_frame() * self.config.symbol_period()
    }

    // -- encoding ---------------------------------------------------------

    fn frame_bytes(token: &Token) -> [u8; FRAME_BYTES] {
        let mut bytes = [0u8; FRAME_BYTES];
        let payload = token.to_bytes();
        bytes[..TOKEN_WIRE_LEN].copy_from_slice(&payload);
        bytes[TOKEN_WIRE_LEN..].copy_from_slice(&crc16(&payload).to_be_bytes());
        bytes
    }

    fn envelope(&self, n: usize) -> f64 {
        let ramp = self.config.ramp_samples;
        let len = self.config.symbol_samples;
        let edge = if n < ramp {
            n
        } else if n >= len - ramp {
            len - 1 - n
        } else {
            return 1.0;
        };
        0.5 * (1.0 - (PI * edge as f64 / ramp as f64).cos())
    }

    /// Writes one tone burst starting at `offset`, overwriting whatever
    /// was there. The guard that follows is left untouched.
    fn write_symbol(&self, samples: &mut [f32], offset: usize, freq: f64) {
        let step = 2.0 * PI * freq / f64::from(self.config.sample_rate);
        let amplitude = f64::from(self.config.amplitude);
        let end = (offset + self.config.symbol_samples).min(samples.len());
        for (n, sample) in samples[offset..end].iter_mut().enumerate() {
            let value = amplitude * self.envelope(n) * (step * n as f64).sin();
            *sample = value as f32;
        }
    }

    // -- decoding ---------------------------------------------------------

    /// Fraction of a window's energy that sits at `freq` (0.0 to 1.0).
    fn tone_ratio(&self, window: &[f32], freq: f64) -> f64 {
        let energy: f64 = window.iter().map(|&x| f64::from(x) * f64::from(x)).sum();
        if energy < SILENCE_ENERGY {
            return 0.0;
        }
        let power = goertzel_power(window, freq, f64::from(self.config.sample_rate));
        power / (energy * window.len() as f64 / 2.0)
    }

    /// Weakest preamble-symbol match for a frame starting at `offset`.
    fn preamble_score(&self, samples: &[f32], offset: usize) -> f64 {
        let period = self.config.symbol_period();
        let len = self.config.symbol_samples;
        let mut score = f64::MAX;
        for (i, &freq) in self.config.preamble_hz.iter().enumerate() {
            let start = offset + i * period;
            let ratio = self.tone_ratio(&samples[start..start + len], freq);
            score = score.min(ratio);
            if score < self.config.detection_threshold {
                break;
            }
        }
        score
    }

    /// Finds the sample index where the first frame's preamble begins.
    fn locate_preamble(&self, samples: &[f32]) -> Option<usize> {
        let period = self.config.symbol_period();
        let span = (self.config.preamble_hz.len() - 1) * period + self.config.symbol_samples;
        let last_start = samples.len().checked_sub(span)?;
        let step = (self.config.symbol_samples / 8).max(1);

        // Coarse scan: first offset whose every preamble window clears
        // the threshold.
        let found = (0..=last_start)
            .step_by(step)
            .find(|&offset| self.preamble_score(samples, offset) >= self.config.detection_threshold)?;

        // Fine alignment. The score falls off on both sides of the true
        // start, and the coarse hit can only sit before it.
        let limit = (found + self.config.symbol_samples / 2).min(last_start);
        let mut best = (found, self.preamble_score(samples, found));
        for offset in found + 1..=limit {
            let score = self.preamble_score(samples, offset);
            if score > best.1 {
                best = (offset, score);
            }
        }

        trace!(offset = best.0, score = best.1, "preamble located");
        Some(best.0)
    }

    /// Index of the data tone with the most energy in `window`.
    fn demap(&self, window: &[f32]) -> u8 {
        let rate = f64::from(self.config.sample_rate);
        let mut best = (0u8, f64::MIN);
        for (nibble, &freq) in (0u8..).zip(self.tones.iter()) {
            let power = goertzel_power(window, freq, rate);
            if power > best.1 {
                best = (nibble, power);
            }
        }
        best.0
    }
}

impl TokenCodec for FskCodec {
    fn encode(&self, token: &Token) -> AudioFrame {
        let period = self.config.symbol_period();
        let mut samples = vec![0.0f32; self.frame_samples()];

        let preamble = self.config.preamble_hz.iter().copied();
        let data = Self::frame_bytes(token)
            .into_iter()
            .flat_map(|byte| [byte >> 4, byte & 0x0F])
            .map(|nibble| self.tones[usize::from(nibble)]);

        for (i, freq) in preamble.chain(data).enumerate() {
            self.write_symbol(&mut samples, i * period, freq);
        }

        trace!(sequence = token.sequence, samples = samples.len(), "token encoded");
        AudioFrame::new(self.config.sample_rate, samples)
    }

    fn decode(&self, audio: &AudioFrame) -> Result<Token, DecodeError> {
        if audio.sample_rate != self.config.sample_rate {
            return Err(DecodeError::SampleRateMismatch {
                expected: self.config.sample_rate,
                actual: audio.sample_rate,
            });
        }

        let samples = audio.samples.as_slice();
        let start = self
            .locate_preamble(samples)
            .ok_or(DecodeError::NoPreamble)?;

        let period = self.config.symbol_period();
        let data_start = start + self.config.preamble_hz.len() * period;
        let needed = data_start + (DATA_SYMBOLS - 1) * period + self.config.symbol_samples;
        if samples.len() < needed {
            return Err(DecodeError::Truncated {
                needed,
                available: samples.len(),
            });
        }

        let mut bytes = [0u8; FRAME_BYTES];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let hi = data_start + 2 * i * period;
            let lo = hi + period;
            let len = self.config.symbol_samples;
            *byte = (self.demap(&samples[hi..hi + len]) << 4) | self.demap(&samples[lo..lo + len]);
        }

        let (payload, crc) = bytes.split_at(TOKEN_WIRE_LEN);
        let expected = u16::from_be_bytes([crc[0], crc[1]]);
        let actual = crc16(payload);
        if expected != actual {
            return Err(DecodeError::ChecksumMismatch { expected, actual });
        }

        Token::from_bytes(payload)
    }
}

/// Squared magnitude of the DFT of `window` at `freq` (Goertzel algorithm).
fn goertzel_power(window: &[f32], freq: f64, sample_rate: f64) -> f64 {
    let coeff = 2.0 * (2.0 * PI * freq / sample_rate).cos();
    let (mut s1, mut s2) = (0.0f64, 0.0f64);
    for &x in window {
        let s0 = f64::from(x) + coeff * s1 - s2;
        s2 = s1;
        s1 = s0;
    }
    s1 * s1 + s2 * s2 - coeff * s1 * s2
}
