//! Minimal RIFF/WAVE writer for 16-bit PCM.

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::{synth::BYTES_PER_SAMPLE, Result};

pub const RIFF_ID: [u8; 4] = *b"RIFF";
pub const WAVE_ID: [u8; 4] = *b"WAVE";
pub const FMT_CHUNK_ID: [u8; 4] = *b"fmt ";
pub const DATA_CHUNK_ID: [u8; 4] = *b"data";

/// Bytes between the RIFF size field and the start of the PCM data.
pub const HEADER_OVERHEAD: u32 = 36;
/// Full header length preceding the PCM data.
pub const HEADER_LEN: usize = 44;
/// Largest PCM payload whose RIFF size still fits in 32 bits.
pub const MAX_DATA_LEN: u32 = u32::MAX - HEADER_OVERHEAD;

const FORMAT_PCM: u16 = 1;
const FMT_CHUNK_LEN: u32 = 16;

/// Stream format written into the `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    pub channels: u16,
    pub sample_rate: u32,
}

impl WavSpec {
    pub fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        (BYTES_PER_SAMPLE * 8) as u16
    }

    /// Bytes per sample frame, or `None` when it does not fit the field.
    pub fn block_align(&self) -> Option<u16> {
        self.channels.checked_mul(BYTES_PER_SAMPLE as u16)
    }

    /// Bytes per second, or `None` when it does not fit the field.
    pub fn byte_rate(&self) -> Option<u32> {
        self.sample_rate.checked_mul(u32::from(self.block_align()?))
    }
}

fn invalid_input(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}

/// Writes `pcm` wrapped in a RIFF/WAVE container.
///
/// The chunk sizes are exact: RIFF size is `36 + pcm.len()`, data chunk size
/// is `pcm.len()`. A payload over [`MAX_DATA_LEN`] or a format whose derived
/// fields overflow is rejected before anything is written.
pub fn write_wav<W: Write>(mut sink: W, pcm: &[u8], spec: WavSpec) -> Result<()> {
    let data_len = u32::try_from(pcm.len())
        .ok()
        .filter(|len| *len <= MAX_DATA_LEN)
        .ok_or_else(|| {
            invalid_input(format!(
                "{} bytes of PCM exceed the RIFF size limit",
                pcm.len()
            ))
        })?;
    if spec.channels == 0 {
        let err = invalid_input("a wav stream needs at least one channel".to_string());
        return Err(err.into());
    }
    let (block_align, byte_rate) = spec
        .block_align()
        .zip(spec.byte_rate())
        .ok_or_else(|| {
            invalid_input(format!(
                "{} channels at {} Hz overflow the wav format fields",
                spec.channels, spec.sample_rate
            ))
        })?;

    sink.write_all(&RIFF_ID)?;
    sink.write_u32::<LittleEndian>(HEADER_OVERHEAD + data_len)?;
    sink.write_all(&WAVE_ID)?;

    sink.write_all(&FMT_CHUNK_ID)?;
    sink.write_u32::<LittleEndian>(FMT_CHUNK_LEN)?;
    sink.write_u16::<LittleEndian>(FORMAT_PCM)?;
    sink.write_u16::<LittleEndian>(spec.channels)?;
    sink.write_u32::<LittleEndian>(spec.sample_rate)?;
    sink.write_u32::<LittleEndian>(byte_rate)?;
    sink.write_u16::<LittleEndian>(block_align)?;
    sink.write_u16::<LittleEndian>(spec.bits_per_sample())?;

    sink.write_all(&DATA_CHUNK_ID)?;
    sink.write_u32::<LittleEndian>(data_len)?;
    sink.write_all(pcm)?;
    sink.flush()?;

    tracing::debug!(
        channels = spec.channels,
        sample_rate = spec.sample_rate,
        data_len,
        "wrote wav container"
    );
    Ok(())
}
