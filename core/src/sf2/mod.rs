//! SoundFont 2.1 document model.
//!
//! The hydra lists are append-only: bag indices are recorded when the bag is
//! created and point at the next generator/modulator slot, which gives the
//! format's monotonic-index invariant for free. Terminator records (EOP/EOI/
//! EOS plus one blank bag, generator and modulator on each side) are added
//! once, when the document is written.

use std::io::{self, Write};

pub mod hydra;
pub mod sample;
mod writer;

pub use hydra::{GenAmount, GeneratorType};
pub use sample::{SampleError, SampleSource};

use hydra::{Bag, Generator, InstHeader, Modulator, PresetHeader, SampleHeader};

/// Samples of silence appended after every sample body, as the format's
/// interpolation guard band.
const SAMPLE_TERMINATOR_LEN: usize = 46;
/// Samples re-transmitted from the loop point after a looping body.
const LOOP_FOLLOW_LEN: usize = 8;

#[derive(Debug, Default)]
pub struct SoundFont {
    presets: Vec<PresetHeader>,
    pbags: Vec<Bag>,
    pmods: Vec<Modulator>,
    pgens: Vec<Generator>,
    insts: Vec<InstHeader>,
    ibags: Vec<Bag>,
    imods: Vec<Modulator>,
    igens: Vec<Generator>,
    samples: Vec<SampleHeader>,
    smpl: Vec<i16>,
}

impl SoundFont {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new preset. Its bag index points at the next preset bag.
    pub fn add_new_preset(&mut self, name: &str, patch: u16, bank: u16) {
        self.presets.push(PresetHeader {
            name: name.to_owned(),
            preset: patch,
            bank,
            bag_ndx: self.pbags.len() as u16,
        });
    }

    pub fn add_new_preset_bag(&mut self) {
        self.pbags.push(Bag {
            gen_ndx: self.pgens.len() as u16,
            mod_ndx: self.pmods.len() as u16,
        });
    }

    pub fn add_new_preset_generator(&mut self, oper: GeneratorType, amount: GenAmount) {
        self.pgens.push(Generator::new(oper, amount));
    }

    /// Starts a new instrument and returns its index.
    pub fn add_new_instrument(&mut self, name: &str) -> u16 {
        let index = self.insts.len() as u16;
        self.insts.push(InstHeader {
            name: name.to_owned(),
            bag_ndx: self.ibags.len() as u16,
        });
        index
    }

    pub fn add_new_inst_bag(&mut self) {
        self.ibags.push(Bag {
            gen_ndx: self.igens.len() as u16,
            mod_ndx: self.imods.len() as u16,
        });
    }

    pub fn add_new_inst_generator(&mut self, oper: GeneratorType, amount: GenAmount) {
        self.igens.push(Generator::new(oper, amount));
    }

    /// Transcodes `source` into the arena and appends a sample header.
    /// Returns the sample index.
    ///
    /// A looping sample re-transmits eight samples from the loop point after
    /// the body; every sample is followed by the 46-sample silence band.
    #[allow(clippy::too_many_arguments)]
    pub fn add_new_sample(
        &mut self,
        name: &str,
        source: SampleSource<'_>,
        size: usize,
        looping: bool,
        loop_pos: usize,
        sample_rate: u32,
        original_pitch: u8,
        pitch_correction: i8,
    ) -> Result<u16, SampleError> {
        let pcm = sample::transcode(source, size)?;
        let start = self.smpl.len() as u32;
        self.smpl.extend_from_slice(&pcm);
        let (end, loop_start, loop_end) = if looping && size > 0 {
            // Garbage loop points past the body still produce a readable
            // file; the loop collapses onto the final sample.
            let loop_pos = loop_pos.min(size - 1);
            let span = size - loop_pos;
            for i in 0..LOOP_FOLLOW_LEN {
                self.smpl.push(pcm[loop_pos + i % span]);
            }
            (
                start + size as u32 + LOOP_FOLLOW_LEN as u32,
                start + loop_pos as u32,
                start + size as u32,
            )
        } else {
            (start + size as u32, 0, 0)
        };
        self.smpl.extend(std::iter::repeat(0).take(SAMPLE_TERMINATOR_LEN));

        let index = self.samples.len() as u16;
        self.samples.push(SampleHeader {
            name: name.to_owned(),
            start,
            end,
            loop_start,
            loop_end,
            sample_rate,
            original_pitch,
            pitch_correction,
        });
        Ok(index)
    }

    pub fn instrument_count(&self) -> usize {
        self.insts.len()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Length of the sample arena in 16-bit samples.
    pub fn arena_len(&self) -> usize {
        self.smpl.len()
    }

    /// The header for a previously added sample.
    pub fn sample_header(&self, index: u16) -> &SampleHeader {
        &self.samples[index as usize]
    }

    pub fn preset_bag_indices(&self) -> Vec<u16> {
        self.presets.iter().map(|p| p.bag_ndx).collect()
    }

    pub fn inst_bag_indices(&self) -> Vec<u16> {
        self.insts.iter().map(|i| i.bag_ndx).collect()
    }

    pub fn pbag_gen_indices(&self) -> Vec<u16> {
        self.pbags.iter().map(|b| b.gen_ndx).collect()
    }

    pub fn ibag_gen_indices(&self) -> Vec<u16> {
        self.ibags.iter().map(|b| b.gen_ndx).collect()
    }

    /// Appends the terminator records, then writes the complete RIFF file.
    /// The document is consumed; a bank is flushed exactly once.
    pub fn write<W: Write>(mut self, out: &mut W) -> io::Result<()> {
        self.close();
        writer::write_riff(&self, out)
    }

    fn close(&mut self) {
        self.insts.push(InstHeader {
            name: "EOI".to_owned(),
            bag_ndx: self.ibags.len() as u16,
        });
        self.ibags.push(Bag {
            gen_ndx: self.igens.len() as u16,
            mod_ndx: self.imods.len() as u16,
        });
        self.igens.push(Generator::blank());
        self.imods.push(Modulator::default());

        self.presets.push(PresetHeader {
            name: "EOP".to_owned(),
            preset: 0,
            bank: 0,
            bag_ndx: self.pbags.len() as u16,
        });
        self.pbags.push(Bag {
            gen_ndx: self.pgens.len() as u16,
            mod_ndx: self.pmods.len() as u16,
        });
        self.pgens.push(Generator::blank());
        self.pmods.push(Modulator::default());

        self.samples.push(SampleHeader {
            name: "EOS".to_owned(),
            start: 0,
            end: 0,
            loop_start: 0,
            loop_end: 0,
            sample_rate: 0,
            original_pitch: 0,
            pitch_correction: 0,
        });
    }
}
