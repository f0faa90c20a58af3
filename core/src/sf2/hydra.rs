//! Fixed-size SoundFont 2.1 "hydra" records and their on-disk encodings.
//!
//! Every record serialises little-endian at the exact sizes the format
//! mandates: phdr 38, pbag/ibag 4, pmod/imod 10, pgen/igen 4, inst 22,
//! shdr 46 bytes. Names occupy 20 bytes, left-aligned and NUL-padded.

/// Generator operators used by the translator. Values are the SF2 2.1
/// enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum GeneratorType {
    Pan = 17,
    AttackVolEnv = 34,
    DecayVolEnv = 36,
    SustainVolEnv = 37,
    ReleaseVolEnv = 38,
    Instrument = 41,
    KeyRange = 43,
    InitialAttenuation = 48,
    SampleId = 53,
    SampleModes = 54,
    ScaleTuning = 56,
    OverridingRootKey = 58,
}

/// A generator amount: either a signed word or a key/velocity range pair.
#[derive(Debug, Clone, Copy)]
pub enum GenAmount {
    Value(i16),
    Range { lo: u8, hi: u8 },
}

impl GenAmount {
    fn to_le_bytes(self) -> [u8; 2] {
        match self {
            GenAmount::Value(v) => v.to_le_bytes(),
            GenAmount::Range { lo, hi } => [lo, hi],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Generator {
    pub oper: u16,
    pub amount: GenAmount,
}

impl Generator {
    pub fn new(oper: GeneratorType, amount: GenAmount) -> Self {
        Self {
            oper: oper as u16,
            amount,
        }
    }

    /// The all-zero terminator generator.
    pub fn blank() -> Self {
        Self {
            oper: 0,
            amount: GenAmount::Value(0),
        }
    }

    pub fn write_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.oper.to_le_bytes());
        out.extend_from_slice(&self.amount.to_le_bytes());
    }
}

/// A modulator record. The translator never emits real modulators; only the
/// blank terminator instances exist.
#[derive(Debug, Clone, Default)]
pub struct Modulator {
    pub src_oper: u16,
    pub dest_oper: u16,
    pub amount: i16,
    pub amt_src_oper: u16,
    pub trans_oper: u16,
}

impl Modulator {
    pub fn write_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.src_oper.to_le_bytes());
        out.extend_from_slice(&self.dest_oper.to_le_bytes());
        out.extend_from_slice(&self.amount.to_le_bytes());
        out.extend_from_slice(&self.amt_src_oper.to_le_bytes());
        out.extend_from_slice(&self.trans_oper.to_le_bytes());
    }
}

/// A preset or instrument bag: indices of the first generator and modulator
/// belonging to the zone. Recorded at bag creation, never renumbered.
#[derive(Debug, Clone, Copy)]
pub struct Bag {
    pub gen_ndx: u16,
    pub mod_ndx: u16,
}

impl Bag {
    pub fn write_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.gen_ndx.to_le_bytes());
        out.extend_from_slice(&self.mod_ndx.to_le_bytes());
    }
}

#[derive(Debug, Clone)]
pub struct PresetHeader {
    pub name: String,
    pub preset: u16,
    pub bank: u16,
    pub bag_ndx: u16,
}

impl PresetHeader {
    pub fn write_into(&self, out: &mut Vec<u8>) {
        write_name20(out, &self.name);
        out.extend_from_slice(&self.preset.to_le_bytes());
        out.extend_from_slice(&self.bank.to_le_bytes());
        out.extend_from_slice(&self.bag_ndx.to_le_bytes());
        // library, genre, morphology: reserved, zero.
        out.extend_from_slice(&[0u8; 12]);
    }
}

#[derive(Debug, Clone)]
pub struct InstHeader {
    pub name: String,
    pub bag_ndx: u16,
}

impl InstHeader {
    pub fn write_into(&self, out: &mut Vec<u8>) {
        write_name20(out, &self.name);
        out.extend_from_slice(&self.bag_ndx.to_le_bytes());
    }
}

/// monoSample in the shdr sampleType field.
pub const SAMPLE_TYPE_MONO: u16 = 1;

#[derive(Debug, Clone)]
pub struct SampleHeader {
    pub name: String,
    pub start: u32,
    pub end: u32,
    pub loop_start: u32,
    pub loop_end: u32,
    pub sample_rate: u32,
    pub original_pitch: u8,
    pub pitch_correction: i8,
}

impl SampleHeader {
    pub fn write_into(&self, out: &mut Vec<u8>) {
        write_name20(out, &self.name);
        out.extend_from_slice(&self.start.to_le_bytes());
        out.extend_from_slice(&self.end.to_le_bytes());
        out.extend_from_slice(&self.loop_start.to_le_bytes());
        out.extend_from_slice(&self.loop_end.to_le_bytes());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.push(self.original_pitch);
        out.push(self.pitch_correction as u8);
        out.extend_from_slice(&0u16.to_le_bytes()); // sampleLink
        out.extend_from_slice(&SAMPLE_TYPE_MONO.to_le_bytes());
    }
}

fn write_name20(out: &mut Vec<u8>, name: &str) {
    let bytes = name.as_bytes();
    let n = bytes.len().min(19);
    out.extend_from_slice(&bytes[..n]);
    out.extend_from_slice(&vec![0u8; 20 - n]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes() {
        let mut buf = Vec::new();
        PresetHeader {
            name: "test".into(),
            preset: 0,
            bank: 0,
            bag_ndx: 0,
        }
        .write_into(&mut buf);
        assert_eq!(buf.len(), 38);

        buf.clear();
        InstHeader {
            name: "test".into(),
            bag_ndx: 0,
        }
        .write_into(&mut buf);
        assert_eq!(buf.len(), 22);

        buf.clear();
        SampleHeader {
            name: "test".into(),
            start: 0,
            end: 0,
            loop_start: 0,
            loop_end: 0,
            sample_rate: 44100,
            original_pitch: 60,
            pitch_correction: 0,
        }
        .write_into(&mut buf);
        assert_eq!(buf.len(), 46);

        buf.clear();
        Bag {
            gen_ndx: 0,
            mod_ndx: 0,
        }
        .write_into(&mut buf);
        assert_eq!(buf.len(), 4);

        buf.clear();
        Modulator::default().write_into(&mut buf);
        assert_eq!(buf.len(), 10);

        buf.clear();
        Generator::new(GeneratorType::KeyRange, GenAmount::Range { lo: 10, hi: 20 })
            .write_into(&mut buf);
        assert_eq!(buf.len(), 4);
        assert_eq!(&buf, &[43, 0, 10, 20]);
    }

    #[test]
    fn test_long_names_truncate_with_terminator() {
        let mut buf = Vec::new();
        InstHeader {
            name: "a name much longer than twenty bytes".into(),
            bag_ndx: 0,
        }
        .write_into(&mut buf);
        assert_eq!(buf.len(), 22);
        assert_eq!(buf[19], 0);
    }
}
