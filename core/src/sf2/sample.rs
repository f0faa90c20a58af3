//! Source-format transcoding into the 16-bit sample arena.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("sample data truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
}

/// The source encodings a GBA ROM can hand the sample arena.
#[derive(Debug, Clone, Copy)]
pub enum SampleSource<'a> {
    /// Plain unsigned 8-bit PCM.
    Unsigned8(&'a [u8]),
    /// Plain signed 8-bit PCM, the native DAC format.
    Signed8(&'a [u8]),
    /// Little-endian signed 16-bit PCM.
    Signed16(&'a [u8]),
    /// 16 nibble-packed bytes of Game Boy channel-3 waveform RAM, expanded
    /// and repeated to the requested length.
    GameBoyCh3(&'a [u8]),
    /// Block differential PCM: 33-byte blocks decoding to 64 samples each.
    Bdpcm(&'a [u8]),
}

/// Expansion of a channel-3 nibble to a 16-bit level. The final entry is
/// 0xFF where the progression suggests 0xF0; the table is kept as found in
/// shipped ROMs' playback, not regularised.
const GB3_LEVELS: [u8; 16] = [
    0x00, 0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80, 0x90, 0xA0, 0xB0, 0xC0, 0xD0, 0xE0,
    0xFF,
];

/// 4-bit BDPCM delta lookup, high nibble first within each packed byte.
const BDPCM_DELTAS: [i8; 16] = [0, 1, 4, 9, 16, 25, 36, 49, -64, -49, -36, -25, -16, -9, -4, -1];

/// Number of source bytes one BDPCM block occupies.
pub const BDPCM_BLOCK_BYTES: usize = 33;
/// Number of output samples one BDPCM block decodes to.
pub const BDPCM_BLOCK_SAMPLES: usize = 64;

/// Decodes `size` output samples from `source`.
pub fn transcode(source: SampleSource<'_>, size: usize) -> Result<Vec<i16>, SampleError> {
    match source {
        SampleSource::Unsigned8(data) => {
            let data = checked(data, size)?;
            Ok(data
                .iter()
                .map(|&b| ((b as i16).wrapping_sub(128)) << 8)
                .collect())
        }
        SampleSource::Signed8(data) => {
            let data = checked(data, size)?;
            Ok(data.iter().map(|&b| (b as i8 as i16) << 8).collect())
        }
        SampleSource::Signed16(data) => {
            let data = checked(data, size * 2)?;
            Ok(data
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]))
                .collect())
        }
        SampleSource::GameBoyCh3(data) => decode_gb3(checked(data, 16)?, size),
        SampleSource::Bdpcm(data) => decode_bdpcm(data, size),
    }
}

fn checked(data: &[u8], need: usize) -> Result<&[u8], SampleError> {
    if data.len() < need {
        return Err(SampleError::Truncated {
            need,
            have: data.len(),
        });
    }
    Ok(&data[..need])
}

/// Expands 32 packed nibbles (high nibble first) through the level table,
/// repeating each level `size / 32` times.
fn decode_gb3(wave: &[u8], size: usize) -> Result<Vec<i16>, SampleError> {
    let repeat = (size / 32).max(1);
    let mut out = Vec::with_capacity(size);
    for &byte in wave.iter().take(16) {
        for nibble in [byte >> 4, byte & 0x0F] {
            let level = ((GB3_LEVELS[nibble as usize] as i16).wrapping_sub(0x80)) << 8;
            for _ in 0..repeat {
                out.push(level);
            }
        }
    }
    out.truncate(size);
    out.resize(size, 0);
    Ok(out)
}

/// Decodes whole 64-sample BDPCM blocks; any residue the block structure
/// cannot cover is zeroed.
pub fn decode_bdpcm(data: &[u8], size: usize) -> Result<Vec<i16>, SampleError> {
    let blocks = size / BDPCM_BLOCK_SAMPLES;
    let need = blocks * BDPCM_BLOCK_BYTES;
    let data = checked(data, need)?;
    let mut out = Vec::with_capacity(size);
    for block in data.chunks_exact(BDPCM_BLOCK_BYTES) {
        // Byte 0 seeds the running 8-bit accumulator; each of the 64 packed
        // deltas yields one output sample.
        let mut sample = block[0] as i8;
        for &byte in &block[1..] {
            for nibble in [byte >> 4, byte & 0x0F] {
                sample = sample.wrapping_add(BDPCM_DELTAS[nibble as usize]);
                out.push((sample as i16) << 8);
            }
        }
    }
    out.resize(size, 0);
    Ok(out)
}
