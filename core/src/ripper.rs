//! Top-level rip driver.
//!
//! Locates the engine (or trusts an explicit song-table offset), walks the
//! song table, runs one sequencer per song, and translates every referenced
//! sound bank into SoundFont form: one aggregated bank file by default, or
//! one file per bank. Everything is produced as complete byte streams; the
//! caller decides about filenames and directories.

use bitflags::bitflags;
use log::{debug, info, warn};
use thiserror::Error;

use crate::instruments::{InstrumentBuilder, InstrumentRecord};
use crate::locator::{locate, EngineParams, LocateError};
use crate::rom::{Rom, RomError, GBA_ROM_BASE};
use crate::sequencer::{Sequencer, SongHeader, SongOptions};
use crate::sf2::SoundFont;

bitflags! {
    /// Behaviour switches, one per CLI flag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RipFlags: u32 {
        /// Name presets after the General MIDI patch map.
        const GM = 1 << 0;
        /// Rearrange channels to avoid MIDI channel 10.
        const RC = 1 << 1;
        /// XG reset and bank select instead of GS.
        const XG = 1 << 2;
        /// One SoundFont per bank instead of a single aggregate.
        const SB = 1 << 3;
        /// Disable volume linearisation and vibrato simulation.
        const RAW = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RipOptions {
    pub flags: RipFlags,
    /// Explicit song-table offset, bypassing the engine locator.
    pub song_table: Option<usize>,
}

#[derive(Debug, Error)]
pub enum RipError {
    #[error(transparent)]
    Locate(#[from] LocateError),
    #[error("song table at {0:#x} lies past the end of the ROM")]
    TablePastEof(usize),
    #[error(transparent)]
    Rom(#[from] RomError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One finished sequence.
#[derive(Debug)]
pub struct RippedSong {
    /// Position in the song table.
    pub index: usize,
    /// Complete SMF-0 byte stream.
    pub data: Vec<u8>,
}

/// One finished SoundFont.
#[derive(Debug)]
pub struct RippedSoundFont {
    /// Bank index for per-bank output; `None` for the aggregate file.
    pub bank: Option<usize>,
    /// Complete SF2 byte stream.
    pub data: Vec<u8>,
}

#[derive(Debug)]
pub struct RipOutput {
    pub songs: Vec<RippedSong>,
    pub soundfonts: Vec<RippedSoundFont>,
}

/// Rips every song and sound bank out of `rom`.
pub fn rip(rom: &Rom, options: &RipOptions) -> Result<RipOutput, RipError> {
    let flags = options.flags;
    let (params, table) = match options.song_table {
        Some(offset) => (EngineParams::manual_default(), offset),
        None => {
            let engine = locate(rom)?;
            (engine.params, engine.song_table)
        }
    };

    let table = skip_leading_zero_words(rom, table)?;
    let song_offsets = collect_song_offsets(rom, table);
    info!("song table at {table:#x}: {} songs", song_offsets.len());

    // Banks are numbered in order of first use across the song table.
    let mut banks: Vec<usize> = Vec::new();
    let mut songs: Vec<(usize, SongHeader, usize)> = Vec::new();
    for (index, &offset) in song_offsets.iter().enumerate() {
        match SongHeader::read(rom, offset) {
            Ok(header) => {
                let bank_idx = match banks.iter().position(|&b| b == header.bank_offset) {
                    Some(i) => i,
                    None => {
                        banks.push(header.bank_offset);
                        banks.len() - 1
                    }
                };
                songs.push((index, header, bank_idx));
            }
            Err(e) => warn!("skipping song {index} at {offset:#x}: {e}"),
        }
    }

    let per_bank_files = flags.contains(RipFlags::SB);
    let force_bank = !per_bank_files && banks.len() > 1;
    let mut ripped_songs = Vec::with_capacity(songs.len());
    for (index, header, bank_idx) in &songs {
        let song_options = SongOptions {
            linearise_volume: !flags.contains(RipFlags::RAW),
            simulate_vibrato: !flags.contains(RipFlags::RAW),
            xg: flags.contains(RipFlags::XG),
            avoid_drum_channel: flags.contains(RipFlags::RC),
            bank: force_bank.then_some(*bank_idx as u16),
        };
        debug!(
            "song {index}: {} tracks, bank {bank_idx}",
            header.track_count
        );
        let midi = Sequencer::new(rom, header, song_options).rip();
        let mut data = Vec::new();
        midi.write(&mut data)?;
        ripped_songs.push(RippedSong {
            index: *index,
            data,
        });
    }

    let gm = flags.contains(RipFlags::GM);
    let mut soundfonts = Vec::new();
    if per_bank_files {
        for (bank_idx, &offset) in banks.iter().enumerate() {
            let mut sf2 = SoundFont::new();
            let mut builder = InstrumentBuilder::new(params.sample_rate, params.main_volume, gm);
            translate_bank(&mut sf2, &mut builder, rom, &banks, offset, 0);
            let mut data = Vec::new();
            sf2.write(&mut data)?;
            soundfonts.push(RippedSoundFont {
                bank: Some(bank_idx),
                data,
            });
        }
    } else if !banks.is_empty() {
        let mut sf2 = SoundFont::new();
        let mut builder = InstrumentBuilder::new(params.sample_rate, params.main_volume, gm);
        for (bank_idx, &offset) in banks.iter().enumerate() {
            translate_bank(&mut sf2, &mut builder, rom, &banks, offset, bank_idx as u16);
        }
        let mut data = Vec::new();
        sf2.write(&mut data)?;
        soundfonts.push(RippedSoundFont { bank: None, data });
    }

    Ok(RipOutput {
        songs: ripped_songs,
        soundfonts,
    })
}

/// Leading all-zero words shift the effective table start by one word each.
fn skip_leading_zero_words(rom: &Rom, mut table: usize) -> Result<usize, RipError> {
    loop {
        if !rom.contains(table, 4) {
            return Err(RipError::TablePastEof(table));
        }
        let mut r = rom.reader_at(table)?;
        if r.read_u32()? != 0 {
            return Ok(table);
        }
        table += 4;
    }
}

/// Entries run until the first pointer that is zero or out of range after
/// the ROM base is removed.
fn collect_song_offsets(rom: &Rom, table: usize) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut entry = table;
    while rom.contains(entry, 8) {
        let mut r = match rom.reader_at(entry) {
            Ok(r) => r,
            Err(_) => break,
        };
        let Ok(word) = r.read_u32() else { break };
        let offset = word.wrapping_sub(GBA_ROM_BASE) as usize;
        if offset == 0 || offset >= rom.len() {
            break;
        }
        offsets.push(offset);
        entry += 8;
    }
    offsets
}

/// Number of 12-byte slots a bank can hold before running into the next
/// bank (or the end of the ROM), capped at the 128 addressable patches.
fn bank_slot_count(banks: &[usize], offset: usize, rom_len: usize) -> usize {
    let span = banks
        .iter()
        .copied()
        .filter(|&b| b > offset)
        .min()
        .map(|next| next - offset)
        .unwrap_or_else(|| rom_len.saturating_sub(offset));
    (span / 12).min(128)
}

fn translate_bank(
    sf2: &mut SoundFont,
    builder: &mut InstrumentBuilder,
    rom: &Rom,
    banks: &[usize],
    offset: usize,
    bank_number: u16,
) {
    let slots = bank_slot_count(banks, offset, rom.len());
    for patch in 0..slots {
        let record = match InstrumentRecord::read(rom, offset + 12 * patch) {
            Ok(record) => record,
            Err(_) => break,
        };
        if record.is_unused() {
            continue;
        }
        if let Err(e) = builder.add_preset(sf2, rom, record, bank_number, patch as u8) {
            // Garbage slots are expected; they produce no preset and no
            // user-visible error.
            debug!("bank {bank_number} patch {patch}: {e}");
        }
    }
}
