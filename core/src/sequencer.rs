//! Track byte-code interpreter.
//!
//! Each song is a set of up to 16 command streams sharing one clock. The
//! interpreter steps all tracks a tick at a time, maintaining per-track
//! sticky state (last command, key and velocity for the running-status
//! compression in the source format), a subroutine return slot, an additive
//! transpose, and a small LFO machine that renders the engine's vibrato as
//! modulation controllers. Output is a single SMF-0 track.

use log::{debug, warn};
use thiserror::Error;

use crate::midi::{MidiFile, PPQN};
use crate::rom::{Rom, RomError};

/// Hard cap on the outer tick loop so malformed data cannot spin forever.
pub const MAX_TICKS: usize = 100_000;

/// Commands a single track may execute within one tick before it is declared
/// runaway (a jump cycle with no wait in it).
const MAX_COMMANDS_PER_TICK: usize = 10_000;

/// Tick lengths addressed by the wait and note-length command ranges.
const LEN_TABLE: [i32; 49] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 28,
    30, 32, 36, 40, 42, 44, 48, 52, 54, 56, 60, 64, 66, 68, 72, 76, 78, 80, 84, 88, 90, 92, 96,
];

const GS_RESET: [u8; 9] = [0x41, 0x10, 0x42, 0x12, 0x40, 0x00, 0x7F, 0x00, 0x41];
const XG_SYSTEM_ON: [u8; 7] = [0x43, 0x10, 0x4C, 0x00, 0x00, 0x7E, 0x00];

#[derive(Debug, Error)]
pub enum SongError {
    #[error("track count {0} outside 1..=16")]
    TrackCount(u8),
    #[error("pointer {0:#x} outside the ROM")]
    PointerOutOfRom(usize),
    #[error(transparent)]
    Rom(#[from] RomError),
}

/// Parsed song header: track pointers plus the sound bank the song plays
/// from.
#[derive(Debug, Clone)]
pub struct SongHeader {
    pub offset: usize,
    pub track_count: u8,
    pub priority: u8,
    pub reverb: i8,
    pub bank_offset: usize,
    pub track_offsets: Vec<usize>,
}

impl SongHeader {
    pub fn read(rom: &Rom, offset: usize) -> Result<Self, SongError> {
        let mut r = rom.reader_at(offset)?;
        let track_count = r.read_u8()?;
        let _reserved = r.read_u8()?;
        let priority = r.read_u8()?;
        let reverb = r.read_i8()?;
        if !(1..=16).contains(&track_count) {
            return Err(SongError::TrackCount(track_count));
        }
        let bank_offset = r.read_gba_pointer()?;
        if bank_offset >= rom.len() {
            return Err(SongError::PointerOutOfRom(bank_offset));
        }
        let mut track_offsets = Vec::with_capacity(track_count as usize);
        for _ in 0..track_count {
            let track = r.read_gba_pointer()?;
            if track >= rom.len() {
                return Err(SongError::PointerOutOfRom(track));
            }
            track_offsets.push(track);
        }
        Ok(Self {
            offset,
            track_count,
            priority,
            reverb,
            bank_offset,
            track_offsets,
        })
    }
}

/// Rendering options for one song.
#[derive(Debug, Clone, Copy)]
pub struct SongOptions {
    /// Map the 0..127 volume/velocity scale through `sqrt(127 * v)`.
    pub linearise_volume: bool,
    /// Render the engine LFO as modulation/aftertouch controllers.
    pub simulate_vibrato: bool,
    /// XG bank select and reset sysex instead of GS.
    pub xg: bool,
    /// Keep content off MIDI channel 10.
    pub avoid_drum_channel: bool,
    /// Bank number to force on every program change, when the instrument
    /// bank is not bank zero of the emitted SoundFont.
    pub bank: Option<u16>,
}

impl Default for SongOptions {
    fn default() -> Self {
        Self {
            linearise_volume: true,
            simulate_vibrato: true,
            xg: false,
            avoid_drum_channel: false,
            bank: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TrackState {
    ptr: Option<usize>,
    return_ptr: usize,
    return_flag: bool,
    counter: i32,
    last_cmd: u8,
    last_key: u8,
    last_vel: u8,
    key_shift: i8,
    completed: bool,
    lfo_depth: u8,
    lfo_delay: u8,
    lfo_delay_ctr: u8,
    lfo_type: u8,
    lfo_flag: bool,
    lfo_primed: bool,
}

#[derive(Debug, Clone, Copy)]
struct Note {
    track: usize,
    key: u8,
    vel: u8,
    /// Ticks left, or negative for a note held until an explicit key-off.
    remaining: i32,
    started: bool,
}

pub struct Sequencer<'a> {
    rom: &'a Rom,
    midi: MidiFile,
    tracks: [TrackState; 16],
    ntracks: usize,
    notes: Vec<Note>,
    loop_flag: bool,
    loop_adr: usize,
    loop_started: bool,
    lv: bool,
    sv: bool,
    xg: bool,
    bank: Option<u16>,
    simultaneous: u32,
    max_simultaneous: u32,
}

impl<'a> Sequencer<'a> {
    pub fn new(rom: &'a Rom, header: &SongHeader, options: SongOptions) -> Self {
        let mut midi = MidiFile::new(PPQN);
        if options.avoid_drum_channel {
            midi.avoid_drum_channel();
        }
        if options.xg {
            midi.sysex(&XG_SYSTEM_ON);
        } else {
            midi.sysex(&GS_RESET);
        }

        let mut tracks = [TrackState::default(); 16];
        for (t, &offset) in header.track_offsets.iter().enumerate() {
            tracks[t].ptr = Some(offset);
        }

        // The final command of track 0 is usually a jump placed immediately
        // before the next stream; for a single-track song the header itself
        // follows the stream. Finding it tells us where the song loops.
        let probe = if header.track_count >= 2 {
            header.track_offsets[1]
        } else {
            header.offset
        };
        let mut loop_flag = false;
        let mut loop_adr = 0;
        if probe >= 5 {
            for pos in probe - 5..probe {
                if rom.bytes().get(pos) == Some(&0xB2) {
                    if let Some(target) = read_pointer(rom, pos + 1) {
                        loop_adr = target;
                        loop_flag = true;
                    }
                    break;
                }
            }
        }

        Self {
            rom,
            midi,
            tracks,
            ntracks: header.track_count as usize,
            notes: Vec::new(),
            loop_flag,
            loop_adr,
            loop_started: false,
            lv: options.linearise_volume,
            sv: options.simulate_vibrato,
            xg: options.xg,
            bank: options.bank,
            simultaneous: 0,
            max_simultaneous: 0,
        }
    }

    /// Runs the song to completion (or the safety cap) and returns the
    /// finished MIDI buffer.
    pub fn rip(mut self) -> MidiFile {
        for _ in 0..MAX_TICKS {
            if self.tick() {
                if self.loop_flag {
                    self.midi.marker("loopEnd");
                }
                debug!("sequence done, peak polyphony {}", self.max_simultaneous);
                return self.midi;
            }
        }
        warn!("sequence did not finish within {MAX_TICKS} ticks, output truncated");
        self.midi
    }

    /// Advances the whole song by one tick. Returns true when every track
    /// has completed and the last notes have rung out.
    fn tick(&mut self) -> bool {
        // Expire bounded notes first so their offs precede this tick's
        // events.
        let mut i = 0;
        while i < self.notes.len() {
            if self.notes[i].remaining > 0 {
                self.notes[i].remaining -= 1;
                if self.notes[i].remaining == 0 {
                    let note = self.notes.remove(i);
                    self.midi.note_off(note.track as u8, note.key, note.vel);
                    self.lfo_stop(note.track);
                    self.simultaneous = self.simultaneous.saturating_sub(1);
                    continue;
                }
            }
            i += 1;
        }

        // Once every track has finished (end-of-track or jump), command
        // streams are frozen; only pending notes still drain. Without the
        // freeze a looping song would replay its body forever while its
        // final notes expire.
        let draining = self.all_completed();
        if !draining {
            for t in 0..self.ntracks {
                self.tracks[t].counter -= 1;
                let mut executed = 0;
                while let Some(pos) = self.tracks[t].ptr {
                    if self.tracks[t].counter > 0 {
                        break;
                    }
                    if t == 0 && self.loop_flag && !self.loop_started && pos == self.loop_adr {
                        self.midi.marker("loopStart");
                        self.loop_started = true;
                    }
                    self.process_cmd(t);
                    executed += 1;
                    if executed > MAX_COMMANDS_PER_TICK {
                        warn!("track {t}: runaway command stream, ending track");
                        self.end_track(t);
                        break;
                    }
                }
            }

            for t in 0..self.ntracks {
                self.lfo_tick(t);
            }
        } else {
            self.release_held_notes();
        }

        if self.all_completed() && self.notes.is_empty() {
            return true;
        }

        // Fresh notes sound after everything else that happened this tick.
        for i in 0..self.notes.len() {
            if !self.notes[i].started {
                self.notes[i].started = true;
                let note = self.notes[i];
                self.midi.note_on(note.track as u8, note.key, note.vel);
            }
        }

        self.midi.clock();
        false
    }

    fn all_completed(&self) -> bool {
        (0..self.ntracks).all(|t| self.tracks[t].completed)
    }

    /// Notes held for an explicit key-off can never receive one after the
    /// streams have finished; release them now.
    fn release_held_notes(&mut self) {
        let mut i = 0;
        while i < self.notes.len() {
            if self.notes[i].remaining < 0 {
                let note = self.notes.remove(i);
                if note.started {
                    self.midi.note_off(note.track as u8, note.key, note.vel);
                }
                self.lfo_stop(note.track);
                self.simultaneous = self.simultaneous.saturating_sub(1);
                continue;
            }
            i += 1;
        }
    }

    fn byte(&self, pos: usize) -> Option<u8> {
        self.rom.bytes().get(pos).copied()
    }

    fn end_track(&mut self, t: usize) {
        self.tracks[t].ptr = None;
        self.tracks[t].completed = true;
    }

    fn shifted_key(&self, t: usize, key: u8) -> u8 {
        (key as i32 + self.tracks[t].key_shift as i32).clamp(0, 127) as u8
    }

    fn linear_vel(&self, vel: u8) -> u8 {
        if self.lv {
            (127.0 * vel as f64).sqrt() as u8
        } else {
            vel
        }
    }

    fn process_cmd(&mut self, t: usize) {
        let Some(pos) = self.tracks[t].ptr else {
            return;
        };
        let Some(byte0) = self.byte(pos) else {
            self.end_track(t);
            return;
        };
        // A data byte in command position re-uses the previous command, the
        // byte itself becoming the first argument.
        let (cmd, arg_pos) = if byte0 < 0x80 {
            (self.tracks[t].last_cmd, pos)
        } else {
            if byte0 >= 0xBC {
                self.tracks[t].last_cmd = byte0;
            }
            (byte0, pos + 1)
        };

        match cmd {
            0x80..=0xB0 => {
                self.tracks[t].counter = LEN_TABLE[(cmd - 0x80) as usize];
                self.tracks[t].ptr = Some(arg_pos);
            }
            0xB1 => self.end_track(t),
            0xB2 => {
                // The jump terminates the track for the all-done check while
                // execution carries on at the target; that is how looping
                // songs wind down.
                match read_pointer(self.rom, arg_pos) {
                    Some(target) => self.tracks[t].ptr = Some(target),
                    None => self.tracks[t].ptr = None,
                }
                self.tracks[t].completed = true;
            }
            0xB3 => match read_pointer(self.rom, arg_pos) {
                Some(target) => {
                    self.tracks[t].return_ptr = arg_pos + 4;
                    self.tracks[t].return_flag = true;
                    self.tracks[t].ptr = Some(target);
                }
                None => self.end_track(t),
            },
            0xB4 => {
                if self.tracks[t].return_flag {
                    self.tracks[t].ptr = Some(self.tracks[t].return_ptr);
                    self.tracks[t].return_flag = false;
                } else {
                    self.tracks[t].ptr = Some(arg_pos);
                }
            }
            0xBB => {
                let Some(arg) = self.take_arg(t, arg_pos) else {
                    return;
                };
                self.midi.tempo(2 * arg as u32);
            }
            0xBC => {
                let Some(arg) = self.take_arg(t, arg_pos) else {
                    return;
                };
                self.tracks[t].key_shift = arg as i8;
            }
            0xBD => {
                let Some(arg) = self.take_arg(t, arg_pos) else {
                    return;
                };
                if let Some(bank) = self.bank {
                    if self.xg {
                        self.midi.controller(t as u8, 0, (bank >> 7) as u8);
                        self.midi.controller(t as u8, 32, (bank & 0x7F) as u8);
                    } else {
                        self.midi.controller(t as u8, 0, bank as u8);
                    }
                }
                self.midi.program_change(t as u8, arg);
            }
            0xBE => {
                let Some(arg) = self.take_arg(t, arg_pos) else {
                    return;
                };
                let value = if self.lv {
                    (127.0 * arg as f64).sqrt() as u8
                } else {
                    arg
                };
                self.midi.controller(t as u8, 7, value);
            }
            0xBF => {
                let Some(arg) = self.take_arg(t, arg_pos) else {
                    return;
                };
                self.midi.controller(t as u8, 10, arg);
            }
            0xC0 => {
                let Some(arg) = self.take_arg(t, arg_pos) else {
                    return;
                };
                self.midi.pitch_bend(t as u8, (arg as u16) << 7);
            }
            0xC1 => {
                let Some(arg) = self.take_arg(t, arg_pos) else {
                    return;
                };
                if self.sv {
                    self.midi.rpn(t as u8, 0, (arg as u16) << 7);
                } else {
                    self.midi.controller(t as u8, 20, arg);
                }
            }
            0xC2 => {
                let Some(arg) = self.take_arg(t, arg_pos) else {
                    return;
                };
                if self.sv {
                    self.midi.nrpn(t as u8, 136, (arg as u16) << 7);
                } else {
                    self.midi.controller(t as u8, 21, arg);
                }
            }
            0xC3 => {
                let Some(arg) = self.take_arg(t, arg_pos) else {
                    return;
                };
                if self.sv {
                    self.tracks[t].lfo_delay = arg;
                } else {
                    self.midi.controller(t as u8, 26, arg);
                }
            }
            0xC4 => {
                let Some(arg) = self.take_arg(t, arg_pos) else {
                    return;
                };
                if self.sv {
                    // An undelayed LFO only takes effect from the second
                    // depth command onwards; the engine behaves the same.
                    if self.tracks[t].lfo_delay == 0 && self.tracks[t].lfo_primed {
                        let value = (10 * arg as u32).min(127) as u8;
                        self.emit_modulation(t, value);
                        self.tracks[t].lfo_flag = true;
                    }
                    self.tracks[t].lfo_depth = arg;
                    self.tracks[t].lfo_primed = true;
                } else {
                    self.midi.controller(t as u8, 1, arg);
                }
            }
            0xC5 => {
                let Some(arg) = self.take_arg(t, arg_pos) else {
                    return;
                };
                if self.sv {
                    self.tracks[t].lfo_type = arg;
                } else {
                    self.midi.controller(t as u8, 22, arg);
                }
            }
            0xC8 => {
                let Some(arg) = self.take_arg(t, arg_pos) else {
                    return;
                };
                if self.sv {
                    self.midi.rpn(t as u8, 1, (arg as u16) << 7);
                } else {
                    self.midi.controller(t as u8, 24, arg);
                }
            }
            0xCE => {
                let mut p = arg_pos;
                let mut key = self.tracks[t].last_key;
                if let Some(a1) = self.byte(p).filter(|&b| b < 0x80) {
                    key = a1;
                    self.tracks[t].last_key = a1;
                    p += 1;
                }
                self.tracks[t].ptr = Some(p);
                self.stop_note(t, key);
            }
            0xCF => {
                let (key, vel, p) = self.parse_note_args(t, arg_pos);
                self.tracks[t].ptr = Some(p);
                self.start_note(t, key, vel, -1);
            }
            0xD0..=0xFF => {
                let mut length = LEN_TABLE[(cmd - 0xD0 + 1) as usize];
                let mut p = arg_pos;
                let mut key = self.tracks[t].last_key;
                let mut vel = self.tracks[t].last_vel;
                if let Some(a1) = self.byte(p).filter(|&b| b < 0x80) {
                    key = a1;
                    self.tracks[t].last_key = a1;
                    p += 1;
                    if let Some(a2) = self.byte(p).filter(|&b| b < 0x80) {
                        vel = a2;
                        self.tracks[t].last_vel = a2;
                        p += 1;
                        if let Some(a3) = self.byte(p).filter(|&b| b < 0x80) {
                            length += a3 as i32;
                            p += 1;
                        }
                    }
                }
                self.tracks[t].ptr = Some(p);
                self.start_note(t, key, vel, length);
            }
            _ => {
                // Unhandled command: one argument byte, no output. Still
                // sticky, so a following data byte re-runs it instead of
                // whatever command came before it.
                self.tracks[t].last_cmd = cmd;
                self.tracks[t].ptr = Some(arg_pos + 1);
            }
        }
    }

    /// Reads a single argument byte and advances past it; ends the track on
    /// truncated data.
    fn take_arg(&mut self, t: usize, arg_pos: usize) -> Option<u8> {
        match self.byte(arg_pos) {
            Some(arg) => {
                self.tracks[t].ptr = Some(arg_pos + 1);
                Some(arg)
            }
            None => {
                self.end_track(t);
                None
            }
        }
    }

    /// Optional key and velocity with the same stickiness rules as bounded
    /// notes.
    fn parse_note_args(&mut self, t: usize, arg_pos: usize) -> (u8, u8, usize) {
        let mut p = arg_pos;
        let mut key = self.tracks[t].last_key;
        let mut vel = self.tracks[t].last_vel;
        if let Some(a1) = self.byte(p).filter(|&b| b < 0x80) {
            key = a1;
            self.tracks[t].last_key = a1;
            p += 1;
            if let Some(a2) = self.byte(p).filter(|&b| b < 0x80) {
                vel = a2;
                self.tracks[t].last_vel = a2;
                p += 1;
            }
        }
        (key, vel, p)
    }

    fn start_note(&mut self, t: usize, key: u8, vel: u8, remaining: i32) {
        let note = Note {
            track: t,
            key: self.shifted_key(t, key),
            vel: self.linear_vel(vel),
            remaining,
            started: false,
        };
        self.notes.insert(0, note);
        // A bounded key-on also charges the fetch counter, so the track
        // resumes at the following command once the note has sounded for its
        // length. A held note (negative) leaves the cursor free.
        self.tracks[t].counter = remaining;
        self.simultaneous += 1;
        self.max_simultaneous = self.max_simultaneous.max(self.simultaneous);
        self.lfo_start(t);
    }

    fn stop_note(&mut self, t: usize, key: u8) {
        let shifted = self.shifted_key(t, key);
        let vel = match self
            .notes
            .iter()
            .position(|n| n.track == t && n.key == shifted)
        {
            Some(i) => {
                let note = self.notes.remove(i);
                self.simultaneous = self.simultaneous.saturating_sub(1);
                note.vel
            }
            None => self.linear_vel(self.tracks[t].last_vel),
        };
        self.midi.note_off(t as u8, shifted, vel);
        self.lfo_stop(t);
    }

    fn emit_modulation(&mut self, t: usize, value: u8) {
        if self.tracks[t].lfo_type == 0 {
            self.midi.controller(t as u8, 1, value);
        } else {
            self.midi.channel_aftertouch(t as u8, value);
        }
    }

    fn lfo_start(&mut self, t: usize) {
        if self.sv && self.tracks[t].lfo_delay != 0 {
            self.tracks[t].lfo_delay_ctr = self.tracks[t].lfo_delay;
        }
    }

    fn lfo_tick(&mut self, t: usize) {
        if !self.sv {
            return;
        }
        if self.tracks[t].lfo_delay_ctr != 0 {
            self.tracks[t].lfo_delay_ctr -= 1;
            if self.tracks[t].lfo_delay_ctr == 0 {
                let value = (8 * self.tracks[t].lfo_depth as u32).min(127) as u8;
                self.emit_modulation(t, value);
                self.tracks[t].lfo_flag = true;
            }
        }
    }

    fn lfo_stop(&mut self, t: usize) {
        if !self.sv {
            return;
        }
        if self.tracks[t].lfo_flag {
            self.emit_modulation(t, 0);
            self.tracks[t].lfo_flag = false;
        } else {
            self.tracks[t].lfo_delay_ctr = 0;
        }
    }
}

fn read_pointer(rom: &Rom, pos: usize) -> Option<usize> {
    let mut r = rom.reader_at(pos).ok()?;
    let target = r.read_gba_pointer().ok()?;
    (target < rom.len()).then_some(target)
}
