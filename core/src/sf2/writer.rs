//! RIFF assembly for the SoundFont document.
//!
//! Tree: RIFF('sfbk', LIST('INFO', ...), LIST('sdta', smpl),
//! LIST('pdta', phdr pbag pmod pgen inst ibag imod igen shdr)). Chunk sizes
//! are computed after the hydra lists are final; all scalars little-endian.

use std::io::{self, Write};

use super::SoundFont;

const VERSION_MAJOR: u16 = 2;
const VERSION_MINOR: u16 = 1;
const SOUND_ENGINE: &str = "EMU8000";
const BANK_NAME: &str = "Unnamed";
const ENGINEER: &str = "Nintendo Game Boy Advance SoundFont";
const COPYRIGHT: &str = "Ripped with SF2Ripper v0.0 (c) 2012 by Bregalad";

pub(super) fn write_riff<W: Write>(sf: &SoundFont, out: &mut W) -> io::Result<()> {
    let info = build_info();
    let sdta = build_sdta(sf);
    let pdta = build_pdta(sf);

    let riff_len = 4 + (8 + info.len()) + (8 + sdta.len()) + (8 + pdta.len());
    out.write_all(b"RIFF")?;
    out.write_all(&(riff_len as u32).to_le_bytes())?;
    out.write_all(b"sfbk")?;
    for (kind, payload) in [(b"INFO", &info), (b"sdta", &sdta), (b"pdta", &pdta)] {
        out.write_all(b"LIST")?;
        out.write_all(&(payload.len() as u32 + 4).to_le_bytes())?;
        out.write_all(kind)?;
        out.write_all(payload)?;
    }
    Ok(())
}

fn chunk(out: &mut Vec<u8>, id: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(id);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

/// A NUL-terminated ASCII INFO string; the terminator counts in the size.
fn zstr_chunk(out: &mut Vec<u8>, id: &[u8; 4], text: &str) {
    out.extend_from_slice(id);
    out.extend_from_slice(&(text.len() as u32 + 1).to_le_bytes());
    out.extend_from_slice(text.as_bytes());
    out.push(0);
}

fn build_info() -> Vec<u8> {
    let mut info = Vec::new();
    let mut ifil = Vec::with_capacity(4);
    ifil.extend_from_slice(&VERSION_MAJOR.to_le_bytes());
    ifil.extend_from_slice(&VERSION_MINOR.to_le_bytes());
    chunk(&mut info, b"ifil", &ifil);
    zstr_chunk(&mut info, b"isng", SOUND_ENGINE);
    zstr_chunk(&mut info, b"INAM", BANK_NAME);
    zstr_chunk(&mut info, b"IENG", ENGINEER);
    zstr_chunk(&mut info, b"ICOP", COPYRIGHT);
    info
}

fn build_sdta(sf: &SoundFont) -> Vec<u8> {
    let mut smpl = Vec::with_capacity(sf.smpl.len() * 2);
    for s in &sf.smpl {
        smpl.extend_from_slice(&s.to_le_bytes());
    }
    let mut sdta = Vec::with_capacity(smpl.len() + 8);
    chunk(&mut sdta, b"smpl", &smpl);
    sdta
}

fn build_pdta(sf: &SoundFont) -> Vec<u8> {
    let mut pdta = Vec::new();

    let mut buf = Vec::new();
    for p in &sf.presets {
        p.write_into(&mut buf);
    }
    chunk(&mut pdta, b"phdr", &buf);

    buf.clear();
    for b in &sf.pbags {
        b.write_into(&mut buf);
    }
    chunk(&mut pdta, b"pbag", &buf);

    buf.clear();
    for m in &sf.pmods {
        m.write_into(&mut buf);
    }
    chunk(&mut pdta, b"pmod", &buf);

    buf.clear();
    for g in &sf.pgens {
        g.write_into(&mut buf);
    }
    chunk(&mut pdta, b"pgen", &buf);

    buf.clear();
    for i in &sf.insts {
        i.write_into(&mut buf);
    }
    chunk(&mut pdta, b"inst", &buf);

    buf.clear();
    for b in &sf.ibags {
        b.write_into(&mut buf);
    }
    chunk(&mut pdta, b"ibag", &buf);

    buf.clear();
    for m in &sf.imods {
        m.write_into(&mut buf);
    }
    chunk(&mut pdta, b"imod", &buf);

    buf.clear();
    for g in &sf.igens {
        g.write_into(&mut buf);
    }
    chunk(&mut pdta, b"igen", &buf);

    buf.clear();
    for s in &sf.samples {
        s.write_into(&mut buf);
    }
    chunk(&mut pdta, b"shdr", &buf);

    pdta
}
