//! GBA instrument translation.
//!
//! Maps 12-byte sound-bank records onto the SoundFont hydra: sampled
//! instruments (standard and fixed-pitch), the four Game Boy PSG channels
//! synthesised from the embedded reference data, Golden Sun's synthetic
//! waveforms, and the two split forms (key-split and every-key-split).
//! Garbage records are the norm in real banks, so translation failures are
//! reported per record and the caller skips the slot.

use std::collections::HashMap;

use log::debug;
use thiserror::Error;

use crate::psg::{
    self, GS_PERIOD, GS_SAW_OFFSET, GS_SQUARE_OFFSET, GS_SWEEP_LEN, GS_TRIANGLE_OFFSET,
    NOISE_KEY_HIGH, NOISE_KEY_LOW, PSG_SAMPLE_RATE, PULSE_KEY_RANGES, WAVE_KEY_RANGES,
    WAVE_REGION_SIZES,
};
use crate::rom::{Rom, RomError, GBA_PTR_MASK};
use crate::sf2::{GenAmount, GeneratorType, SampleSource, SoundFont};

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("sample loop word {0:#010x} is not a recognised mode")]
    SampleLoopWord(u32),
    #[error("sample length {0:#x} out of range")]
    SampleLength(u32),
    #[error("sample pitch is zero")]
    SamplePitch,
    #[error("PSG envelope component {0} out of range")]
    PsgEnvelope(u8),
    #[error("pulse duty cycle {0} out of range")]
    DutyCycle(u32),
    #[error("noise mode {0} out of range")]
    NoiseMode(u32),
    #[error("split instrument nested inside a split")]
    RecursiveSplit,
    #[error("instrument type {0:#04x} is not translatable")]
    UnknownType(u8),
    #[error(transparent)]
    Rom(#[from] RomError),
    #[error(transparent)]
    Sample(#[from] crate::sf2::SampleError),
}

/// One 12-byte sound-bank record as three little-endian words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstrumentRecord {
    pub w0: u32,
    pub w1: u32,
    pub w2: u32,
}

impl InstrumentRecord {
    pub fn read(rom: &Rom, offset: usize) -> Result<Self, RomError> {
        let mut r = rom.reader_at(offset)?;
        Ok(Self {
            w0: r.read_u32()?,
            w1: r.read_u32()?,
            w2: r.read_u32()?,
        })
    }

    pub fn tag(&self) -> u8 {
        (self.w0 & 0xFF) as u8
    }

    /// The well-known filler record marking an unused slot.
    pub fn is_unused(&self) -> bool {
        self.w0 == 0x3C01 && self.w1 == 0x02 && self.w2 == 0x000F_0000
    }

    /// True for the four PSG channel types, which never receive the preset
    /// attenuation generator.
    pub fn is_gameboy(&self) -> bool {
        matches!(self.tag() & 0x07, 1..=4) && self.tag() < 0x10
    }

    /// Root key byte of a sub-record inside an every-key-split.
    fn keynum(&self) -> u8 {
        (self.w0 >> 8) as u8
    }

    /// Panning byte of a sub-record inside an every-key-split.
    fn panning(&self) -> u8 {
        (self.w0 >> 24) as u8
    }
}

fn is_sampled_tag(tag: u8) -> bool {
    tag < 0x40 && tag & 0x07 == 0
}

fn is_fixed_pitch_tag(tag: u8) -> bool {
    tag & 0x08 != 0
}

/// Key a sample is de-duplicated under: ROM offset for cartridge data,
/// synthesis parameters for generated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SampleKey {
    Rom(usize),
    Wave { offset: usize, size: usize },
    Pulse { duty: u8, region: u8 },
    Noise { metallic: bool, key: u8 },
    GoldenSun { shape: u8, duty: u8, sweep: bool },
}

#[derive(Debug, Clone, Copy)]
struct GbaSampleHeader {
    bdpcm: bool,
    looping: bool,
    pitch: u32,
    loop_pos: u32,
    len: u32,
    data_offset: usize,
}

fn read_sample_header(rom: &Rom, offset: usize) -> Result<GbaSampleHeader, InstrumentError> {
    let mut r = rom.reader_at(offset)?;
    let loop_word = r.read_u32()?;
    let pitch = r.read_u32()?;
    let loop_pos = r.read_u32()?;
    let len = r.read_u32()?;
    let (looping, bdpcm) = match loop_word {
        0x4000_0000 => (true, false),
        0x0000_0000 => (false, false),
        0x0000_0001 => (false, true),
        w => return Err(InstrumentError::SampleLoopWord(w)),
    };
    Ok(GbaSampleHeader {
        bdpcm,
        looping,
        pitch,
        loop_pos,
        len,
        data_offset: offset + 16,
    })
}

fn rom_slice<'r>(rom: &'r Rom, offset: usize, len: usize) -> Result<&'r [u8], InstrumentError> {
    if !rom.contains(offset, len) {
        return Err(RomError::UnexpectedEof { offset }.into());
    }
    Ok(&rom.bytes()[offset..offset + len])
}

/// Root key and cent correction for a sample whose header stores
/// `frequency * 1024`, relative to the engine output rate.
fn root_key_from_pitch(sample_rate: u32, pitch: u32) -> (u8, i8) {
    let delta = 12.0 * ((sample_rate as f64 * 1024.0) / pitch as f64).log2();
    let rounded = delta.round();
    let root = (60.0 + rounded).clamp(0.0, 127.0) as u8;
    let correction = ((rounded - delta) * 100.0).round() as i8;
    (root, correction)
}

/// Root key and correction for a synthesised recording playing `freq` Hz at
/// its native rate.
fn root_key_from_freq(freq: f64) -> (u8, i8) {
    let note = 69.0 + 12.0 * (freq / 440.0).log2();
    let root = note.round();
    let correction = ((root - note) * 100.0).round() as i8;
    (root.clamp(0.0, 127.0) as u8, correction)
}

fn timecents(seconds: f64) -> i16 {
    (1200.0 * seconds.log2()) as i16
}

/// Volume-envelope generators for a DAC sample, from the packed
/// attack/decay/sustain/release bytes.
fn sampled_envelope(adsr: u32) -> Vec<(GeneratorType, i16)> {
    let [attack, decay, sustain, release] = adsr.to_le_bytes();
    let mut gens = Vec::new();
    if attack != 0xFF && attack != 0 {
        gens.push((
            GeneratorType::AttackVolEnv,
            timecents(256.0 / 60.0 / attack as f64),
        ));
    }
    if sustain != 0xFF {
        let level = if sustain == 0 {
            1000
        } else {
            (100.0 * (256.0 / sustain as f64).ln()) as i16
        };
        gens.push((GeneratorType::SustainVolEnv, level));
        if decay != 0 {
            let mut dec_time = LN_256 / (LN_256 - (decay as f64).ln()) / 60.0;
            dec_time *= 10.0 / LN_256;
            gens.push((GeneratorType::DecayVolEnv, (1200.0 * dec_time.log2()) as i16));
        }
    }
    if release != 0 {
        let rel_time = LN_256 / (LN_256 - (release as f64).ln()) / 60.0;
        gens.push((GeneratorType::ReleaseVolEnv, (1200.0 * rel_time.log2()) as i16));
    }
    gens
}

const LN_256: f64 = 5.545177444479562;

/// Volume-envelope generators for a PSG channel. Components live in 0..=15;
/// anything else marks the record as garbage.
fn psg_envelope(adsr: u32) -> Result<Vec<(GeneratorType, i16)>, InstrumentError> {
    let [attack, decay, sustain, release] = adsr.to_le_bytes();
    for v in [attack, decay, sustain, release] {
        if v > 15 {
            return Err(InstrumentError::PsgEnvelope(v));
        }
    }
    let mut gens = Vec::new();
    if attack != 0 {
        gens.push((GeneratorType::AttackVolEnv, timecents(attack as f64 / 5.0)));
    }
    if sustain != 15 {
        let level = if sustain == 0 {
            1000
        } else {
            (100.0 * (15.0 / sustain as f64).ln()) as i16
        };
        gens.push((GeneratorType::SustainVolEnv, level));
        gens.push((
            GeneratorType::DecayVolEnv,
            (1200.0 * (decay as f64 / 5.0 + 1.0).log2()) as i16,
        ));
    }
    if release != 0 {
        gens.push((GeneratorType::ReleaseVolEnv, timecents(release as f64 / 5.0)));
    }
    Ok(gens)
}

/// Builds SoundFont instruments and presets from sound-bank records,
/// de-duplicating instruments by record content and samples by origin.
#[derive(Debug)]
pub struct InstrumentBuilder {
    sample_rate: u32,
    main_volume: u8,
    gm_names: bool,
    instruments: HashMap<InstrumentRecord, u16>,
    samples: HashMap<SampleKey, u16>,
}

impl InstrumentBuilder {
    pub fn new(sample_rate: u32, main_volume: u8, gm_names: bool) -> Self {
        Self {
            sample_rate,
            main_volume,
            gm_names,
            instruments: HashMap::new(),
            samples: HashMap::new(),
        }
    }

    /// Translates `record` and wires a preset at `(bank, patch)` to it.
    pub fn add_preset(
        &mut self,
        sf2: &mut SoundFont,
        rom: &Rom,
        record: InstrumentRecord,
        bank: u16,
        patch: u8,
    ) -> Result<(), InstrumentError> {
        let instrument = self.instrument(sf2, rom, record)?;
        let name = if self.gm_names {
            GM_PATCH_NAMES[patch as usize & 0x7F].to_owned()
        } else {
            format!("Instrument {patch}")
        };
        sf2.add_new_preset(&name, patch as u16, bank);
        sf2.add_new_preset_bag();
        if !record.is_gameboy() && self.main_volume < 15 {
            let attenuation = (100.0 * (15.0 / self.main_volume as f64).ln()) as i16;
            sf2.add_new_preset_generator(
                GeneratorType::InitialAttenuation,
                GenAmount::Value(attenuation),
            );
        }
        sf2.add_new_preset_generator(
            GeneratorType::Instrument,
            GenAmount::Value(instrument as i16),
        );
        Ok(())
    }

    /// Translates `record` into an SF2 instrument, reusing a previous
    /// translation of the same record.
    pub fn instrument(
        &mut self,
        sf2: &mut SoundFont,
        rom: &Rom,
        record: InstrumentRecord,
    ) -> Result<u16, InstrumentError> {
        if let Some(&index) = self.instruments.get(&record) {
            return Ok(index);
        }
        let index = match record.tag() {
            t if is_sampled_tag(t) => self.build_sampled(sf2, rom, record)?,
            0x01 | 0x09 | 0x02 | 0x0A => self.build_pulse(sf2, record)?,
            0x03 | 0x0B => self.build_wave(sf2, rom, record)?,
            0x04 | 0x0C => self.build_noise(sf2, record)?,
            0x40 => self.build_key_split(sf2, rom, record)?,
            0x80 => self.build_every_key_split(sf2, rom, record)?,
            t => return Err(InstrumentError::UnknownType(t)),
        };
        self.instruments.insert(record, index);
        Ok(index)
    }

    fn build_sampled(
        &mut self,
        sf2: &mut SoundFont,
        rom: &Rom,
        record: InstrumentRecord,
    ) -> Result<u16, InstrumentError> {
        let offset = (record.w1 & GBA_PTR_MASK) as usize;
        let header = read_sample_header(rom, offset)?;
        if header.len == 0 && header.loop_pos == 0 {
            let mut r = rom.reader_at(header.data_offset)?;
            if r.read_u8()? == 0x80 {
                return self.build_goldensun(sf2, rom, record, header.data_offset);
            }
        }
        let sample = self.rom_sample(sf2, rom, offset, &header)?;
        let index = sf2.add_new_instrument(&format!("Instrument @{offset:#x}"));
        sf2.add_new_inst_bag();
        for (oper, value) in sampled_envelope(record.w2) {
            sf2.add_new_inst_generator(oper, GenAmount::Value(value));
        }
        if is_fixed_pitch_tag(record.tag()) {
            sf2.add_new_inst_generator(GeneratorType::ScaleTuning, GenAmount::Value(0));
        }
        sf2.add_new_inst_generator(
            GeneratorType::SampleModes,
            GenAmount::Value(header.looping as i16),
        );
        sf2.add_new_inst_generator(GeneratorType::SampleId, GenAmount::Value(sample as i16));
        Ok(index)
    }

    /// Transcodes a cartridge sample into the arena, once per ROM offset.
    fn rom_sample(
        &mut self,
        sf2: &mut SoundFont,
        rom: &Rom,
        offset: usize,
        header: &GbaSampleHeader,
    ) -> Result<u16, InstrumentError> {
        if let Some(&index) = self.samples.get(&SampleKey::Rom(offset)) {
            return Ok(index);
        }
        if header.len < 16 || header.len > 0x3F_FFFF {
            return Err(InstrumentError::SampleLength(header.len));
        }
        if header.pitch == 0 {
            return Err(InstrumentError::SamplePitch);
        }
        let size = header.len as usize;
        let source = if header.bdpcm {
            let bytes = (size / crate::sf2::sample::BDPCM_BLOCK_SAMPLES)
                * crate::sf2::sample::BDPCM_BLOCK_BYTES;
            SampleSource::Bdpcm(rom_slice(rom, header.data_offset, bytes)?)
        } else {
            SampleSource::Signed8(rom_slice(rom, header.data_offset, size)?)
        };
        let (root, correction) = root_key_from_pitch(self.sample_rate, header.pitch);
        let index = sf2.add_new_sample(
            &format!("Sample @{offset:#x}"),
            source,
            size,
            header.looping,
            header.loop_pos as usize,
            self.sample_rate,
            root,
            correction,
        )?;
        self.samples.insert(SampleKey::Rom(offset), index);
        Ok(index)
    }

    fn build_goldensun(
        &mut self,
        sf2: &mut SoundFont,
        rom: &Rom,
        record: InstrumentRecord,
        data_offset: usize,
    ) -> Result<u16, InstrumentError> {
        let mut r = rom.reader_at(data_offset)?;
        let _magic = r.read_u8()?;
        let shape = r.read_u8()?;
        let duty = r.read_u8()? >> 2;
        let sweep = r.read_u8()? != 0;
        let (region_offset, region_len, name) = match shape {
            0 if sweep => (GS_SQUARE_OFFSET, GS_SWEEP_LEN, "Square sweep"),
            0 => (GS_SQUARE_OFFSET + GS_PERIOD * duty as usize, GS_PERIOD, "Square"),
            1 => (GS_SAW_OFFSET, GS_PERIOD, "Saw"),
            2 => (GS_TRIANGLE_OFFSET, GS_PERIOD, "Triangle"),
            t => return Err(InstrumentError::UnknownType(t)),
        };
        let key = SampleKey::GoldenSun { shape, duty, sweep };
        let sample = match self.samples.get(&key) {
            Some(&index) => index,
            None => {
                let bytes = psg::goldensun_synth().region(region_offset, region_len);
                let (root, correction) = root_key_from_freq(
                    PSG_SAMPLE_RATE as f64 / GS_PERIOD as f64,
                );
                let index = sf2.add_new_sample(
                    name,
                    SampleSource::Unsigned8(bytes),
                    region_len,
                    true,
                    0,
                    PSG_SAMPLE_RATE,
                    root,
                    correction,
                )?;
                self.samples.insert(key, index);
                index
            }
        };
        let index = sf2.add_new_instrument(name);
        sf2.add_new_inst_bag();
        for (oper, value) in sampled_envelope(record.w2) {
            sf2.add_new_inst_generator(oper, GenAmount::Value(value));
        }
        if is_fixed_pitch_tag(record.tag()) {
            sf2.add_new_inst_generator(GeneratorType::ScaleTuning, GenAmount::Value(0));
        }
        sf2.add_new_inst_generator(GeneratorType::SampleModes, GenAmount::Value(1));
        sf2.add_new_inst_generator(GeneratorType::SampleId, GenAmount::Value(sample as i16));
        Ok(index)
    }

    fn build_pulse(
        &mut self,
        sf2: &mut SoundFont,
        record: InstrumentRecord,
    ) -> Result<u16, InstrumentError> {
        let duty = match record.w1 {
            0 => 0u8,
            1 | 3 => 1,
            2 => 2,
            d => return Err(InstrumentError::DutyCycle(d)),
        };
        let envelope = psg_envelope(record.w2)?;
        const NAMES: [&str; 3] = ["Pulse 12.5%", "Pulse 25%", "Pulse 50%"];
        let index = sf2.add_new_instrument(NAMES[duty as usize]);
        for (region, &(lo, hi)) in PULSE_KEY_RANGES.iter().enumerate() {
            let sample = self.pulse_sample(sf2, duty, region)?;
            sf2.add_new_inst_bag();
            sf2.add_new_inst_generator(GeneratorType::KeyRange, GenAmount::Range { lo, hi });
            for &(oper, value) in &envelope {
                sf2.add_new_inst_generator(oper, GenAmount::Value(value));
            }
            sf2.add_new_inst_generator(GeneratorType::SampleModes, GenAmount::Value(1));
            sf2.add_new_inst_generator(GeneratorType::SampleId, GenAmount::Value(sample as i16));
        }
        Ok(index)
    }

    fn pulse_sample(
        &mut self,
        sf2: &mut SoundFont,
        duty: u8,
        region: usize,
    ) -> Result<u16, InstrumentError> {
        let key = SampleKey::Pulse {
            duty,
            region: region as u8,
        };
        if let Some(&index) = self.samples.get(&key) {
            return Ok(index);
        }
        let (bytes, reg) = psg::psg_data().pulse(duty, region);
        let (root, correction) = root_key_from_freq(PSG_SAMPLE_RATE as f64 / reg.loop_len as f64);
        let index = sf2.add_new_sample(
            &format!("Pulse {duty} region {region}"),
            SampleSource::Unsigned8(bytes),
            reg.size,
            true,
            reg.size - reg.loop_len,
            PSG_SAMPLE_RATE,
            root,
            correction,
        )?;
        self.samples.insert(key, index);
        Ok(index)
    }

    fn build_wave(
        &mut self,
        sf2: &mut SoundFont,
        rom: &Rom,
        record: InstrumentRecord,
    ) -> Result<u16, InstrumentError> {
        let envelope = psg_envelope(record.w2)?;
        let offset = (record.w1 & GBA_PTR_MASK) as usize;
        let wave = rom_slice(rom, offset, 16)?;
        let index = sf2.add_new_instrument(&format!("Waveform @{offset:#x}"));
        for (region, &(lo, hi)) in WAVE_KEY_RANGES.iter().enumerate() {
            let size = WAVE_REGION_SIZES[region];
            let sample = self.wave_sample(sf2, wave, offset, size)?;
            sf2.add_new_inst_bag();
            sf2.add_new_inst_generator(GeneratorType::KeyRange, GenAmount::Range { lo, hi });
            for &(oper, value) in &envelope {
                sf2.add_new_inst_generator(oper, GenAmount::Value(value));
            }
            sf2.add_new_inst_generator(GeneratorType::SampleModes, GenAmount::Value(1));
            sf2.add_new_inst_generator(GeneratorType::SampleId, GenAmount::Value(sample as i16));
        }
        Ok(index)
    }

    fn wave_sample(
        &mut self,
        sf2: &mut SoundFont,
        wave: &[u8],
        offset: usize,
        size: usize,
    ) -> Result<u16, InstrumentError> {
        let key = SampleKey::Wave { offset, size };
        if let Some(&index) = self.samples.get(&key) {
            return Ok(index);
        }
        let (root, correction) = root_key_from_freq(PSG_SAMPLE_RATE as f64 / size as f64);
        let index = sf2.add_new_sample(
            &format!("Waveform @{offset:#x}/{size}"),
            SampleSource::GameBoyCh3(wave),
            size,
            true,
            0,
            PSG_SAMPLE_RATE,
            root,
            correction,
        )?;
        self.samples.insert(key, index);
        Ok(index)
    }

    fn build_noise(
        &mut self,
        sf2: &mut SoundFont,
        record: InstrumentRecord,
    ) -> Result<u16, InstrumentError> {
        let metallic = match record.w1 {
            0 => false,
            1 => true,
            m => return Err(InstrumentError::NoiseMode(m)),
        };
        let envelope = psg_envelope(record.w2)?;
        let index =
            sf2.add_new_instrument(if metallic { "Noise metallic" } else { "Noise" });

        let zone = |sf2: &mut SoundFont,
                    samples: &mut Self,
                    lo: u8,
                    hi: u8,
                    sample_key: u8,
                    clamped: bool|
         -> Result<(), InstrumentError> {
            let sample = samples.noise_sample(sf2, metallic, sample_key)?;
            sf2.add_new_inst_bag();
            sf2.add_new_inst_generator(GeneratorType::KeyRange, GenAmount::Range { lo, hi });
            for &(oper, value) in &envelope {
                sf2.add_new_inst_generator(oper, GenAmount::Value(value));
            }
            if clamped {
                sf2.add_new_inst_generator(GeneratorType::ScaleTuning, GenAmount::Value(0));
            }
            sf2.add_new_inst_generator(GeneratorType::SampleModes, GenAmount::Value(1));
            sf2.add_new_inst_generator(GeneratorType::SampleId, GenAmount::Value(sample as i16));
            Ok(())
        };

        zone(sf2, self, 0, NOISE_KEY_LOW - 1, NOISE_KEY_LOW, true)?;
        for key in NOISE_KEY_LOW..=NOISE_KEY_HIGH {
            zone(sf2, self, key, key, key, false)?;
        }
        zone(sf2, self, NOISE_KEY_HIGH + 1, 127, 127, true)?;
        Ok(index)
    }

    fn noise_sample(
        &mut self,
        sf2: &mut SoundFont,
        metallic: bool,
        key: u8,
    ) -> Result<u16, InstrumentError> {
        let (bytes, clamped) = psg::psg_data().noise(metallic, key);
        let cache_key = SampleKey::Noise {
            metallic,
            key: clamped,
        };
        if let Some(&index) = self.samples.get(&cache_key) {
            return Ok(index);
        }
        let index = sf2.add_new_sample(
            &format!("Noise {clamped}"),
            SampleSource::Unsigned8(bytes),
            bytes.len(),
            true,
            0,
            PSG_SAMPLE_RATE,
            clamped,
            0,
        )?;
        self.samples.insert(cache_key, index);
        Ok(index)
    }

    fn build_key_split(
        &mut self,
        sf2: &mut SoundFont,
        rom: &Rom,
        record: InstrumentRecord,
    ) -> Result<u16, InstrumentError> {
        let table = (record.w1 & GBA_PTR_MASK) as usize;
        let map_offset = (record.w2 & GBA_PTR_MASK) as usize;
        let map: Vec<u8> = rom_slice(rom, map_offset, 128)?.to_vec();
        let index = sf2.add_new_instrument(&format!("Split @{table:#x}"));
        let mut lo = 0usize;
        while lo < 128 {
            let sub_index = map[lo];
            let mut hi = lo;
            while hi + 1 < 128 && map[hi + 1] == sub_index {
                hi += 1;
            }
            match self.key_split_zone(sf2, rom, table, sub_index, lo as u8, hi as u8) {
                Ok(()) => {}
                Err(e @ InstrumentError::RecursiveSplit) => return Err(e),
                Err(e) => debug!("key split {table:#x}: skipping keys {lo}..={hi}: {e}"),
            }
            lo = hi + 1;
        }
        Ok(index)
    }

    fn key_split_zone(
        &mut self,
        sf2: &mut SoundFont,
        rom: &Rom,
        table: usize,
        sub_index: u8,
        lo: u8,
        hi: u8,
    ) -> Result<(), InstrumentError> {
        let sub = InstrumentRecord::read(rom, table + 12 * sub_index as usize)?;
        let tag = sub.tag();
        if tag == 0x40 || tag == 0x80 {
            return Err(InstrumentError::RecursiveSplit);
        }
        if !is_sampled_tag(tag) {
            return Err(InstrumentError::UnknownType(tag));
        }
        let offset = (sub.w1 & GBA_PTR_MASK) as usize;
        let header = read_sample_header(rom, offset)?;
        let sample = self.rom_sample(sf2, rom, offset, &header)?;
        sf2.add_new_inst_bag();
        sf2.add_new_inst_generator(GeneratorType::KeyRange, GenAmount::Range { lo, hi });
        for (oper, value) in sampled_envelope(sub.w2) {
            sf2.add_new_inst_generator(oper, GenAmount::Value(value));
        }
        if is_fixed_pitch_tag(tag) {
            sf2.add_new_inst_generator(GeneratorType::ScaleTuning, GenAmount::Value(0));
        }
        sf2.add_new_inst_generator(
            GeneratorType::SampleModes,
            GenAmount::Value(header.looping as i16),
        );
        sf2.add_new_inst_generator(GeneratorType::SampleId, GenAmount::Value(sample as i16));
        Ok(())
    }

    fn build_every_key_split(
        &mut self,
        sf2: &mut SoundFont,
        rom: &Rom,
        record: InstrumentRecord,
    ) -> Result<u16, InstrumentError> {
        let base = (record.w1 & GBA_PTR_MASK) as usize;
        let index = sf2.add_new_instrument(&format!("Drum kit @{base:#x}"));
        for key in 0..128u8 {
            match self.every_key_zone(sf2, rom, base, key) {
                Ok(()) => {}
                Err(e @ InstrumentError::RecursiveSplit) => return Err(e),
                Err(e) => debug!("drum kit {base:#x}: skipping key {key}: {e}"),
            }
        }
        Ok(index)
    }

    fn every_key_zone(
        &mut self,
        sf2: &mut SoundFont,
        rom: &Rom,
        base: usize,
        key: u8,
    ) -> Result<(), InstrumentError> {
        let sub = InstrumentRecord::read(rom, base + 12 * key as usize)?;
        let tag = sub.tag();
        if tag == 0x40 || tag == 0x80 {
            return Err(InstrumentError::RecursiveSplit);
        }
        if is_sampled_tag(tag) {
            let offset = (sub.w1 & GBA_PTR_MASK) as usize;
            let header = read_sample_header(rom, offset)?;
            let (root, _) = root_key_from_pitch(self.sample_rate, header.pitch.max(1));
            let sample = self.rom_sample(sf2, rom, offset, &header)?;
            sf2.add_new_inst_bag();
            sf2.add_new_inst_generator(
                GeneratorType::KeyRange,
                GenAmount::Range { lo: key, hi: key },
            );
            if sub.panning() != 0 {
                let pan = ((sub.panning() as i32 - 192) * 500 / 128) as i16;
                sf2.add_new_inst_generator(GeneratorType::Pan, GenAmount::Value(pan));
            }
            for (oper, value) in sampled_envelope(sub.w2) {
                sf2.add_new_inst_generator(oper, GenAmount::Value(value));
            }
            let override_root = (root as i32 - sub.keynum() as i32 + key as i32).clamp(0, 127);
            sf2.add_new_inst_generator(
                GeneratorType::OverridingRootKey,
                GenAmount::Value(override_root as i16),
            );
            sf2.add_new_inst_generator(
                GeneratorType::SampleModes,
                GenAmount::Value(header.looping as i16),
            );
            sf2.add_new_inst_generator(GeneratorType::SampleId, GenAmount::Value(sample as i16));
            Ok(())
        } else if tag == 0x04 || tag == 0x0C {
            let metallic = match sub.w1 {
                0 => false,
                1 => true,
                m => return Err(InstrumentError::NoiseMode(m)),
            };
            let envelope = psg_envelope(sub.w2)?;
            let sample = self.noise_sample(sf2, metallic, key)?;
            sf2.add_new_inst_bag();
            sf2.add_new_inst_generator(
                GeneratorType::KeyRange,
                GenAmount::Range { lo: key, hi: key },
            );
            for (oper, value) in envelope {
                sf2.add_new_inst_generator(oper, GenAmount::Value(value));
            }
            sf2.add_new_inst_generator(GeneratorType::SampleModes, GenAmount::Value(1));
            sf2.add_new_inst_generator(GeneratorType::SampleId, GenAmount::Value(sample as i16));
            Ok(())
        } else {
            Err(InstrumentError::UnknownType(tag))
        }
    }
}

/// General MIDI patch names, used when presets are named by index.
pub const GM_PATCH_NAMES: [&str; 128] = [
    "Acoustic Grand Piano",
    "Bright Acoustic Piano",
    "Electric Grand Piano",
    "Honky-tonk Piano",
    "Electric Piano 1",
    "Electric Piano 2",
    "Harpsichord",
    "Clavinet",
    "Celesta",
    "Glockenspiel",
    "Music Box",
    "Vibraphone",
    "Marimba",
    "Xylophone",
    "Tubular Bells",
    "Dulcimer",
    "Drawbar Organ",
    "Percussive Organ",
    "Rock Organ",
    "Church Organ",
    "Reed Organ",
    "Accordion",
    "Harmonica",
    "Tango Accordion",
    "Acoustic Guitar (nylon)",
    "Acoustic Guitar (steel)",
    "Electric Guitar (jazz)",
    "Electric Guitar (clean)",
    "Electric Guitar (muted)",
    "Overdriven Guitar",
    "Distortion Guitar",
    "Guitar Harmonics",
    "Acoustic Bass",
    "Electric Bass (finger)",
    "Electric Bass (pick)",
    "Fretless Bass",
    "Slap Bass 1",
    "Slap Bass 2",
    "Synth Bass 1",
    "Synth Bass 2",
    "Violin",
    "Viola",
    "Cello",
    "Contrabass",
    "Tremolo Strings",
    "Pizzicato Strings",
    "Orchestral Harp",
    "Timpani",
    "String Ensemble 1",
    "String Ensemble 2",
    "Synth Strings 1",
    "Synth Strings 2",
    "Choir Aahs",
    "Voice Oohs",
    "Synth Choir",
    "Orchestra Hit",
    "Trumpet",
    "Trombone",
    "Tuba",
    "Muted Trumpet",
    "French Horn",
    "Brass Section",
    "Synth Brass 1",
    "Synth Brass 2",
    "Soprano Sax",
    "Alto Sax",
    "Tenor Sax",
    "Baritone Sax",
    "Oboe",
    "English Horn",
    "Bassoon",
    "Clarinet",
    "Piccolo",
    "Flute",
    "Recorder",
    "Pan Flute",
    "Blown Bottle",
    "Shakuhachi",
    "Whistle",
    "Ocarina",
    "Lead 1 (square)",
    "Lead 2 (sawtooth)",
    "Lead 3 (calliope)",
    "Lead 4 (chiff)",
    "Lead 5 (charang)",
    "Lead 6 (voice)",
    "Lead 7 (fifths)",
    "Lead 8 (bass + lead)",
    "Pad 1 (new age)",
    "Pad 2 (warm)",
    "Pad 3 (polysynth)",
    "Pad 4 (choir)",
    "Pad 5 (bowed)",
    "Pad 6 (metallic)",
    "Pad 7 (halo)",
    "Pad 8 (sweep)",
    "FX 1 (rain)",
    "FX 2 (soundtrack)",
    "FX 3 (crystal)",
    "FX 4 (atmosphere)",
    "FX 5 (brightness)",
    "FX 6 (goblins)",
    "FX 7 (echoes)",
    "FX 8 (sci-fi)",
    "Sitar",
    "Banjo",
    "Shamisen",
    "Koto",
    "Kalimba",
    "Bagpipe",
    "Fiddle",
    "Shanai",
    "Tinkle Bell",
    "Agogo",
    "Steel Drums",
    "Woodblock",
    "Taiko Drum",
    "Melodic Tom",
    "Synth Drum",
    "Reverse Cymbal",
    "Guitar Fret Noise",
    "Breath Noise",
    "Seashore",
    "Bird Tweet",
    "Telephone Ring",
    "Helicopter",
    "Applause",
    "Gunshot",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_key_matches_engine_rate() {
        // A sample recorded at the engine rate pitches middle C at root 60.
        let (root, correction) = root_key_from_pitch(13379, 13379 * 1024);
        assert_eq!(root, 60);
        assert_eq!(correction, 0);
    }

    #[test]
    fn test_root_key_octave_down() {
        let (root, correction) = root_key_from_pitch(13379, 13379 * 2048);
        assert_eq!(root, 48);
        assert_eq!(correction, 0);
    }

    #[test]
    fn test_pitch_round_trip_within_one_cent() {
        for pitch in [7_000_000u32, 8_123_456, 13_379 * 1024, 22_050 * 1024] {
            let (root, correction) = root_key_from_pitch(13379, pitch);
            // Cents offset of the played note relative to middle C.
            let played = (root as f64 - 60.0) * 100.0 - correction as f64;
            let expected = 1200.0 * ((13379.0 * 1024.0) / pitch as f64).log2();
            assert!(
                (played - expected).abs() <= 1.0,
                "pitch {pitch}: played {played} expected {expected}"
            );
        }
    }

    #[test]
    fn test_psg_envelope_rejects_out_of_range() {
        assert!(matches!(
            psg_envelope(0x0000_0010),
            Err(InstrumentError::PsgEnvelope(16))
        ));
    }

    #[test]
    fn test_sampled_envelope_shape() {
        // attack 0x7F, decay 0xCE, sustain 0x80, release 0x10
        let gens = sampled_envelope(0x10_80_CE_7F);
        let opers: Vec<_> = gens.iter().map(|g| g.0).collect();
        assert_eq!(
            opers,
            vec![
                GeneratorType::AttackVolEnv,
                GeneratorType::SustainVolEnv,
                GeneratorType::DecayVolEnv,
                GeneratorType::ReleaseVolEnv,
            ]
        );
    }

    #[test]
    fn test_unused_slot_sentinel() {
        let record = InstrumentRecord {
            w0: 0x3C01,
            w1: 0x02,
            w2: 0x000F_0000,
        };
        assert!(record.is_unused());
    }
}
