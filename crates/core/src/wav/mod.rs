//! Canonical 44-byte-header WAV encoding.
//!
//! Layout written by [`encode`]:
//! - `RIFF` chunk (size = 36 + data bytes) of type `WAVE`
//! - 16-byte `fmt ` chunk: format tag 1 (16-bit PCM) or 3 (32-bit float)
//! - `data` chunk with little-endian interleaved samples
//!
//! Encoding is pure: the same samples and spec always give the same bytes.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{AudioBuffer, KaraokeError, Result};

pub const HEADER_LEN: usize = 44;

const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;

/// Sample encoding of the data chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitDepth {
    /// Signed 16-bit integer PCM.
    Pcm16,
    /// IEEE-754 float32, written unmodified.
    Float32,
}

impl BitDepth {
    pub fn bits(self) -> u16 {
        match self {
            Self::Pcm16 => 16,
            Self::Float32 => 32,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        usize::from(self.bits() / 8)
    }

    pub fn format_tag(self) -> u16 {
        match self {
            Self::Pcm16 => FORMAT_PCM,
            Self::Float32 => FORMAT_IEEE_FLOAT,
        }
    }

    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            16 => Some(Self::Pcm16),
            32 => Some(Self::Float32),
            _ => None,
        }
    }
}

/// Declared format of an encoded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WavSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: BitDepth,
}

/// Encoded WAV bytes plus the format they declare. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavBlob {
    bytes: Arc<[u8]>,
    spec: WavSpec,
}

impl WavBlob {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn spec(&self) -> WavSpec {
        self.spec
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.bytes)?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.bytes)?;
        tracing::info!(?path, bytes = self.bytes.len(), "wrote WAV file");
        Ok(())
    }
}

/// Encodes interleaved `samples` with the given spec. Fails when the data
/// does not fit the 32-bit RIFF size fields.
pub fn encode(samples: &[f32], spec: WavSpec) -> Result<WavBlob> {
    let data_size = data_chunk_size(samples.len(), spec.bit_depth)?;
    let block_align = spec.channels * spec.bit_depth.bits() / 8;
    let byte_rate = spec.sample_rate * u32::from(block_align);

    let mut out = Vec::with_capacity(HEADER_LEN + data_size as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_size).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&spec.bit_depth.format_tag().to_le_bytes());
    out.extend_from_slice(&spec.channels.to_le_bytes());
    out.extend_from_slice(&spec.sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&spec.bit_depth.bits().to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_size.to_le_bytes());

    match spec.bit_depth {
        BitDepth::Float32 => {
            for sample in samples {
                out.extend_from_slice(&sample.to_le_bytes());
            }
        }
        BitDepth::Pcm16 => {
            for sample in samples {
                out.extend_from_slice(&pcm16(*sample).to_le_bytes());
            }
        }
    }

    Ok(WavBlob {
        bytes: out.into(),
        spec,
    })
}

/// Byte size of the data chunk, if the RIFF size (`36 + data`) fits in `u32`.
fn data_chunk_size(sample_count: usize, bit_depth: BitDepth) -> Result<u32> {
    sample_count
        .checked_mul(bit_depth.bytes_per_sample())
        .and_then(|bytes| u32::try_from(bytes).ok())
        .filter(|bytes| bytes.checked_add(36).is_some())
        .ok_or(KaraokeError::Wav("audio too long for a RIFF file"))
}

/// Interleaves every channel of `buffer` and encodes it.
pub fn encode_buffer(buffer: &AudioBuffer, bit_depth: BitDepth) -> Result<WavBlob> {
    let spec = WavSpec {
        sample_rate: buffer.sample_rate(),
        channels: buffer.channel_count() as u16,
        bit_depth,
    };
    encode(&buffer.interleaved(), spec)
}

/// Clamps to `[-1, 1]`, scales by 32768 (negative) or 32767 (positive) and
/// truncates toward zero.
fn pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32_768.0) as i16
    } else {
        (s * 32_767.0) as i16
    }
}

/// Fields of a canonical WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub riff_size: u32,
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

impl WavHeader {
    /// Reads the 44-byte canonical header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(KaraokeError::Wav("shorter than a canonical header"));
        }
        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(KaraokeError::Wav("missing RIFF/WAVE signature"));
        }
        if &bytes[12..16] != b"fmt " || &bytes[36..40] != b"data" {
            return Err(KaraokeError::Wav("not a canonical fmt/data layout"));
        }
        Ok(Self {
            riff_size: read_u32(bytes, 4),
            format_tag: read_u16(bytes, 20),
            channels: read_u16(bytes, 22),
            sample_rate: read_u32(bytes, 24),
            byte_rate: read_u32(bytes, 28),
            block_align: read_u16(bytes, 32),
            bits_per_sample: read_u16(bytes, 34),
            data_size: read_u32(bytes, 40),
        })
    }

    pub fn spec(&self) -> Option<WavSpec> {
        let bit_depth = BitDepth::from_bits(self.bits_per_sample)?;
        (bit_depth.format_tag() == self.format_tag).then_some(WavSpec {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bit_depth,
        })
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
