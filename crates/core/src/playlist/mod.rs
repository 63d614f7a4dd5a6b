//! Output naming, target directory housekeeping and the playlist file that
//! accompanies a batch of converted animations.

use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use crate::{FileJob, Result};

pub const PLAYLIST_FILE: &str = "list.lst";
/// Line closing a playlist.
pub const PLAYLIST_END: &str = "#";

const NAME_PREFIX_LEN: usize = 4;
const HASH_LEN: usize = 4;
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Short, stable WAV file name for a job: up to four characters of the input
/// file stem followed by a four character hash of the conversion settings.
///
/// The hash covers the input name, the descriptor string and `pps + fps`, so
/// changing any of them yields a different file.
pub fn wav_name(job: &FileJob) -> String {
    let name = job.input.to_string_lossy();
    let stem = job
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefix: String = stem.chars().take(NAME_PREFIX_LEN).collect();

    let rates = (job.pps.wrapping_add(job.fps) & 0xffff) as u16;
    let mut key = Vec::with_capacity(name.len() + job.order.len() + 2);
    key.extend_from_slice(name.as_bytes());
    key.extend_from_slice(job.order.as_bytes());
    key.extend_from_slice(&rates.to_be_bytes());

    let crc = crc32(&key);
    let folded = (crc as u16) ^ ((crc >> 16) as u16);
    let hash = base32(&folded.to_be_bytes());

    format!("{prefix}{}.wav", &hash[..HASH_LEN])
}

/// Writes one `<wav name> <time>` line per job followed by the end marker.
pub fn write_playlist<W: Write>(mut w: W, jobs: &[FileJob]) -> io::Result<()> {
    for job in jobs {
        writeln!(w, "{} {}", wav_name(job), job.time)?;
    }
    writeln!(w, "{PLAYLIST_END}")?;
    w.flush()
}

/// Empties `dir`, creating it when it does not exist yet.
pub fn clear_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        tracing::debug!(?path, "removed");
    }
    Ok(())
}

/// CRC-32 (IEEE 802.3, reflected).
fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xffff_ffffu32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xedb8_8320
            } else {
                crc >> 1
            };
        }
    }
    !crc
}

/// RFC 4648 base32 with `=` padding.
fn base32(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
    for chunk in data.chunks(5) {
        let mut block = [0u8; 5];
        block[..chunk.len()].copy_from_slice(chunk);
        let bits = block
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));

        let symbols = (chunk.len() * 8).div_ceil(5);
        for i in 0..8 {
            if i < symbols {
                let index = (bits >> (35 - 5 * i)) & 0x1f;
                out.push(BASE32_ALPHABET[index as usize] as char);
            } else {
                out.push('=');
            }
        }
    }
    out
}
