use thiserror::Error;

/// Base address the GBA maps cartridge ROM at. Pointers found inside a ROM
/// image are offsets from this base.
pub const GBA_ROM_BASE: u32 = 0x0800_0000;

/// Mask extracting the file offset from a GBA ROM pointer.
pub const GBA_PTR_MASK: u32 = 0x03FF_FFFF;

#[derive(Debug, Error)]
pub enum RomError {
    #[error("offset {offset:#x} is outside the ROM ({len:#x} bytes)")]
    OutOfRange { offset: usize, len: usize },
    #[error("unexpected end of ROM data at {offset:#x}")]
    UnexpectedEof { offset: usize },
}

/// An immutable GBA cartridge image, loaded once and shared read-only by
/// every subsystem for the duration of a rip.
#[derive(Debug)]
pub struct Rom {
    data: Vec<u8>,
}

impl Rom {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// True when `count` bytes starting at `offset` lie inside the image.
    pub fn contains(&self, offset: usize, count: usize) -> bool {
        offset
            .checked_add(count)
            .map(|end| end <= self.data.len())
            .unwrap_or(false)
    }

    pub fn reader(&self) -> RomReader<'_> {
        RomReader {
            data: &self.data,
            pos: 0,
        }
    }

    pub fn reader_at(&self, offset: usize) -> Result<RomReader<'_>, RomError> {
        let mut reader = self.reader();
        reader.seek(offset)?;
        Ok(reader)
    }
}

/// True when `word` looks like a pointer into cartridge ROM space
/// (top byte 0x08 or 0x09).
pub fn is_gba_rom_pointer(word: u32) -> bool {
    matches!(word >> 24, 0x08 | 0x09)
}

/// A cheap little-endian cursor over a shared ROM image.
#[derive(Debug, Clone)]
pub struct RomReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RomReader<'a> {
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, offset: usize) -> Result<(), RomError> {
        if offset > self.data.len() {
            return Err(RomError::OutOfRange {
                offset,
                len: self.data.len(),
            });
        }
        self.pos = offset;
        Ok(())
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], RomError> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or(RomError::UnexpectedEof { offset: self.pos })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, RomError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, RomError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, RomError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, RomError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, RomError> {
        Ok(self.read_u32()? as i32)
    }

    /// Reads a 32-bit GBA pointer and converts it to a file offset.
    pub fn read_gba_pointer(&mut self) -> Result<usize, RomError> {
        Ok((self.read_u32()? & GBA_PTR_MASK) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_reads() {
        let rom = Rom::new(vec![0x01, 0x02, 0x03, 0x04, 0xFF]);
        let mut r = rom.reader();
        assert_eq!(r.read_u16().unwrap(), 0x0201);
        assert_eq!(r.read_u16().unwrap(), 0x0403);
        assert_eq!(r.read_i8().unwrap(), -1);
    }

    #[test]
    fn test_gba_pointer_masks_base() {
        let rom = Rom::new(vec![0x34, 0x12, 0x00, 0x08]);
        let mut r = rom.reader();
        assert_eq!(r.read_gba_pointer().unwrap(), 0x1234);
    }

    #[test]
    fn test_seek_past_end_fails() {
        let rom = Rom::new(vec![0; 8]);
        let mut r = rom.reader();
        assert!(r.seek(8).is_ok());
        assert!(matches!(r.seek(9), Err(RomError::OutOfRange { .. })));
    }

    #[test]
    fn test_read_crossing_end_fails() {
        let rom = Rom::new(vec![0; 3]);
        let mut r = rom.reader();
        assert!(matches!(r.read_u32(), Err(RomError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_rom_pointer_check() {
        assert!(is_gba_rom_pointer(0x0800_0000));
        assert!(is_gba_rom_pointer(0x0912_3456));
        assert!(!is_gba_rom_pointer(0x0300_0000));
        assert!(!is_gba_rom_pointer(0));
    }
}
