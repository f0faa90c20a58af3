//! Sound-engine locator.
//!
//! Finds the M4A/Sappy driver inside a ROM image by scanning for the two
//! known encodings of its selectsong routine, then walks backwards to the
//! engine entry point and decodes the parameter block sitting in front of
//! it: polyphony, main volume, output sample rate and DAC resolution, plus
//! the song-table address.

use log::{debug, info};
use thiserror::Error;

use crate::rom::{is_gba_rom_pointer, Rom, GBA_PTR_MASK};

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("no Sappy/M4A sound engine found in the ROM")]
    NotFound,
}

/// Thumb code of the two selectsong variants shipped by the engine. The
/// second differs in one register allocation.
const SELECTSONG_PATTERNS: [[u8; 30]; 2] = [
    [
        0x00, 0xB5, 0x00, 0x04, 0x07, 0x4A, 0x08, 0x49, 0x40, 0x0B, 0x40, 0x18, 0x83, 0x88, 0x59,
        0x00, 0xC9, 0x18, 0x89, 0x00, 0x89, 0x18, 0x0A, 0x68, 0x01, 0x68, 0x10, 0x1C, 0x00, 0xF0,
    ],
    [
        0x00, 0xB5, 0x00, 0x04, 0x07, 0x4B, 0x08, 0x49, 0x40, 0x0B, 0x40, 0x18, 0x83, 0x88, 0x59,
        0x00, 0xC9, 0x18, 0x89, 0x00, 0x89, 0x18, 0x0A, 0x68, 0x01, 0x68, 0x10, 0x1C, 0x00, 0xF0,
    ],
];

/// Offset, relative to the selectsong routine, of the word holding the
/// song-table pointer.
const SONG_TABLE_WORD_OFFSET: usize = 40;

/// How far back from selectsong the engine entry push can sit.
const MAIN_SCAN_RANGE: usize = 0x20;

/// Thumb `push {lr}`.
const MAIN_SIGNATURE: [u8; 2] = [0x00, 0xB5];

/// Output sample rates by engine parameter index 1..=12.
const SAMPLE_RATES: [u32; 12] = [
    5734, 7884, 10512, 13379, 15768, 18157, 21024, 26758, 31536, 36314, 40137, 42048,
];

#[derive(Debug, Clone, Copy)]
pub struct EngineParams {
    pub polyphony: u8,
    pub main_volume: u8,
    pub sample_rate: u32,
    pub dac_bits: u8,
}

impl EngineParams {
    /// The parameters assumed when the caller supplies the song table by
    /// hand and the parameter block is never read.
    pub fn manual_default() -> Self {
        Self {
            polyphony: 5,
            main_volume: 15,
            sample_rate: 13379,
            dac_bits: 8,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineInfo {
    /// Offset of the validated parameter block.
    pub param_offset: usize,
    /// Offset of the song table.
    pub song_table: usize,
    pub params: EngineParams,
}

/// Locates the sound engine in `rom`.
pub fn locate(rom: &Rom) -> Result<EngineInfo, LocateError> {
    let data = rom.bytes();
    let mut search_from = 0;
    while let Some(selectsong) = find_selectsong(data, search_from) {
        search_from = selectsong + 1;
        if !validate_song_table_pointer(rom, selectsong) {
            debug!("selectsong candidate at {selectsong:#x} has no usable song table");
            continue;
        }
        let Some(main) = find_engine_main(data, selectsong) else {
            debug!("selectsong at {selectsong:#x} has no engine entry push nearby");
            continue;
        };
        for back in [16, 32] {
            let Some(offset) = main.checked_sub(back) else {
                continue;
            };
            if let Some(info) = decode_param_block(rom, offset) {
                info!(
                    "sound engine at {main:#x}: {} voices, volume {}, {} Hz, {}-bit DAC, song table {:#x}",
                    info.params.polyphony,
                    info.params.main_volume,
                    info.params.sample_rate,
                    info.params.dac_bits,
                    info.song_table
                );
                return Ok(info);
            }
        }
        debug!("selectsong at {selectsong:#x}: no valid parameter block");
    }
    Err(LocateError::NotFound)
}

fn find_selectsong(data: &[u8], from: usize) -> Option<usize> {
    if data.len() < 30 {
        return None;
    }
    (from..=data.len() - 30).find(|&i| {
        SELECTSONG_PATTERNS
            .iter()
            .any(|p| &data[i..i + 30] == p.as_slice())
    })
}

/// A candidate is plausible when the word at +40 points into ROM space and
/// the table there holds at least one valid entry.
fn validate_song_table_pointer(rom: &Rom, selectsong: usize) -> bool {
    let Ok(mut reader) = rom.reader_at(selectsong + SONG_TABLE_WORD_OFFSET) else {
        return false;
    };
    let Ok(word) = reader.read_u32() else {
        return false;
    };
    if !is_gba_rom_pointer(word) {
        return false;
    }
    let table = (word & GBA_PTR_MASK) as usize;
    if !rom.contains(table, 4) {
        return false;
    }
    count_song_entries(rom, table) > 0
}

fn count_song_entries(rom: &Rom, table: usize) -> usize {
    let Ok(mut reader) = rom.reader_at(table) else {
        return 0;
    };
    let mut count = 0;
    loop {
        let Ok(word) = reader.read_u32() else {
            break;
        };
        if word == 0 || !is_gba_rom_pointer(word) {
            break;
        }
        if !rom.contains((word & GBA_PTR_MASK) as usize, 4) {
            break;
        }
        count += 1;
        if reader.seek(reader.position() + 4).is_err() {
            break;
        }
    }
    count
}

/// The engine entry point is the nearest preceding `push {lr}` within the
/// scan range.
fn find_engine_main(data: &[u8], selectsong: usize) -> Option<usize> {
    let lo = selectsong.saturating_sub(MAIN_SCAN_RANGE);
    (lo..selectsong.saturating_sub(1))
        .rev()
        .find(|&i| data[i..i + 2] == MAIN_SIGNATURE)
}

fn decode_param_block(rom: &Rom, offset: usize) -> Option<EngineInfo> {
    let mut reader = rom.reader_at(offset).ok()?;
    let word0 = reader.read_u32().ok()?;
    let word1 = reader.read_u32().ok()?;
    let word2 = reader.read_u32().ok()?;

    if word0 >> 24 != 0 {
        return None;
    }
    let polyphony = (word0 >> 8) as u8 & 0x0F;
    let main_volume = (word0 >> 12) as u8 & 0x0F;
    let sample_rate_idx = (word0 >> 16) as u8 & 0x0F;
    let dac_shift = (word0 >> 20) as u8 & 0x0F;

    if main_volume == 0 || polyphony > 12 {
        return None;
    }
    let dac_bits = 17u8.checked_sub(dac_shift).filter(|b| (6..=9).contains(b))?;
    if !(1..=12).contains(&sample_rate_idx) {
        return None;
    }
    if word1 >= 256 {
        return None;
    }
    let song_table = (word2 & GBA_PTR_MASK) as usize + 12 * word1 as usize;
    if song_table >= rom.len() {
        return None;
    }

    Some(EngineInfo {
        param_offset: offset,
        song_table,
        params: EngineParams {
            polyphony,
            main_volume,
            sample_rate: SAMPLE_RATES[sample_rate_idx as usize - 1],
            dac_bits,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_word_with_zero_volume_rejected() {
        let mut image = vec![0u8; 0x100];
        image[0..4].copy_from_slice(&0x00F5_00F0u32.to_le_bytes());
        image[4..8].copy_from_slice(&0u32.to_le_bytes());
        image[8..12].copy_from_slice(&0x0800_0040u32.to_le_bytes());
        let rom = Rom::new(image);
        assert!(decode_param_block(&rom, 0).is_none());
    }

    #[test]
    fn test_valid_param_block_decodes() {
        // volume 15, polyphony 5, rate index 4 (13379 Hz), dac shift 9 -> 8 bits
        let word0: u32 = (9 << 20) | (4 << 16) | (15 << 12) | (5 << 8);
        let mut image = vec![0u8; 0x100];
        image[0..4].copy_from_slice(&word0.to_le_bytes());
        image[4..8].copy_from_slice(&2u32.to_le_bytes());
        image[8..12].copy_from_slice(&0x0800_0020u32.to_le_bytes());
        let rom = Rom::new(image);
        let info = decode_param_block(&rom, 0).expect("block should validate");
        assert_eq!(info.params.polyphony, 5);
        assert_eq!(info.params.main_volume, 15);
        assert_eq!(info.params.sample_rate, 13379);
        assert_eq!(info.params.dac_bits, 8);
        assert_eq!(info.song_table, 0x20 + 24);
    }
}
