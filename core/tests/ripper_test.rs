use agbrip_core::{rip, RipFlags, RipOptions, Rom};

const SELECTSONG: [u8; 30] = [
    0x00, 0xB5, 0x00, 0x04, 0x07, 0x4A, 0x08, 0x49, 0x40, 0x0B, 0x40, 0x18, 0x83, 0x88, 0x59,
    0x00, 0xC9, 0x18, 0x89, 0x00, 0x89, 0x18, 0x0A, 0x68, 0x01, 0x68, 0x10, 0x1C, 0x00, 0xF0,
];

fn put_u32(image: &mut [u8], offset: usize, value: u32) {
    image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn gba_ptr(offset: usize) -> u32 {
    0x0800_0000 + offset as u32
}

const PARAM_OFFSET: usize = 0x100;
const MAIN_OFFSET: usize = 0x110;
const SELECTSONG_OFFSET: usize = 0x120;
const SONG_TABLE: usize = 0x200;
const SONG0_HEADER: usize = 0x300;
const SONG1_HEADER: usize = 0x340;
const TRACK0: usize = 0x380;
const TRACK1: usize = 0x390;
const BANK0: usize = 0x400;
const BANK1: usize = 0x460;
const SAMPLE: usize = 0x500;

/// A ROM with a locatable engine, two one-track songs on two banks, one
/// sampled instrument and one PSG pulse instrument.
fn build_rom() -> Rom {
    let mut image = vec![0u8; 0x600];

    // Engine block, entry push and selectsong routine.
    let param = (9u32 << 20) | (4 << 16) | (15 << 12) | (5 << 8);
    put_u32(&mut image, PARAM_OFFSET, param);
    put_u32(&mut image, PARAM_OFFSET + 4, 0);
    put_u32(&mut image, PARAM_OFFSET + 8, gba_ptr(SONG_TABLE));
    image[MAIN_OFFSET] = 0x00;
    image[MAIN_OFFSET + 1] = 0xB5;
    image[SELECTSONG_OFFSET..SELECTSONG_OFFSET + 30].copy_from_slice(&SELECTSONG);
    put_u32(&mut image, SELECTSONG_OFFSET + 40, gba_ptr(SONG_TABLE));

    // Two-entry song table.
    put_u32(&mut image, SONG_TABLE, gba_ptr(SONG0_HEADER));
    put_u32(&mut image, SONG_TABLE + 8, gba_ptr(SONG1_HEADER));
    put_u32(&mut image, SONG_TABLE + 16, 0);

    // Song headers: one track each, different banks.
    image[SONG0_HEADER] = 1;
    put_u32(&mut image, SONG0_HEADER + 4, gba_ptr(BANK0));
    put_u32(&mut image, SONG0_HEADER + 8, gba_ptr(TRACK0));
    image[SONG1_HEADER] = 1;
    put_u32(&mut image, SONG1_HEADER + 4, gba_ptr(BANK1));
    put_u32(&mut image, SONG1_HEADER + 8, gba_ptr(TRACK1));

    // Track streams: program change then one note.
    image[TRACK0..TRACK0 + 6].copy_from_slice(&[0xBD, 0x00, 0xD4, 0x3C, 0x60, 0xB1]);
    image[TRACK1..TRACK1 + 6].copy_from_slice(&[0xBD, 0x00, 0xD4, 0x40, 0x50, 0xB1]);

    // Bank 0, patch 0: sampled instrument with a plain envelope.
    put_u32(&mut image, BANK0, 0x0000_0000);
    put_u32(&mut image, BANK0 + 4, gba_ptr(SAMPLE));
    put_u32(&mut image, BANK0 + 8, 0x00FF_00FF);

    // Bank 1, patch 0: 50% duty pulse channel.
    put_u32(&mut image, BANK1, 0x0000_0001);
    put_u32(&mut image, BANK1 + 4, 2);
    put_u32(&mut image, BANK1 + 8, 0x000F_0000);

    // One-shot signed 8-bit sample pitched at the engine rate.
    put_u32(&mut image, SAMPLE, 0);
    put_u32(&mut image, SAMPLE + 4, 13379 * 1024);
    put_u32(&mut image, SAMPLE + 8, 0);
    put_u32(&mut image, SAMPLE + 12, 32);
    for i in 0..32 {
        image[SAMPLE + 16 + i] = (i * 8) as u8;
    }

    Rom::new(image)
}

#[test]
fn test_full_rip_produces_songs_and_aggregate_bank() {
    let rom = build_rom();
    let output = rip(&rom, &RipOptions::default()).expect("rip should succeed");

    assert_eq!(output.songs.len(), 2);
    for song in &output.songs {
        assert_eq!(&song.data[0..4], b"MThd");
        assert_eq!(
            &song.data[song.data.len() - 4..],
            &[0x00, 0xFF, 0x2F, 0x00]
        );
    }

    assert_eq!(output.soundfonts.len(), 1);
    let sf2 = &output.soundfonts[0];
    assert!(sf2.bank.is_none());
    assert_eq!(&sf2.data[0..4], b"RIFF");
    // Both banks' instruments made it into the aggregate.
    let has = |needle: &[u8]| sf2.data.windows(needle.len()).any(|w| w == needle);
    assert!(has(b"Pulse 50%"));
    assert!(has(b"Instrument 0"));
}

#[test]
fn test_per_bank_output_splits_soundfonts() {
    let rom = build_rom();
    let options = RipOptions {
        flags: RipFlags::SB,
        song_table: None,
    };
    let output = rip(&rom, &options).expect("rip should succeed");
    assert_eq!(output.soundfonts.len(), 2);
    assert_eq!(output.soundfonts[0].bank, Some(0));
    assert_eq!(output.soundfonts[1].bank, Some(1));
    for sf2 in &output.soundfonts {
        assert_eq!(&sf2.data[0..4], b"RIFF");
    }
}

#[test]
fn test_gm_flag_names_presets_from_patch_map() {
    let rom = build_rom();
    let options = RipOptions {
        flags: RipFlags::GM,
        song_table: None,
    };
    let output = rip(&rom, &options).expect("rip should succeed");
    let sf2 = &output.soundfonts[0];
    let has = |needle: &[u8]| sf2.data.windows(needle.len()).any(|w| w == needle);
    assert!(has(b"Acoustic Grand Pian"));
}

#[test]
fn test_manual_song_table_bypasses_locator() {
    let rom = build_rom();
    // Wipe the engine signature; only the explicit table offset remains.
    let mut image = rom.bytes().to_vec();
    image[SELECTSONG_OFFSET..SELECTSONG_OFFSET + 30].fill(0);
    let rom = Rom::new(image);
    let options = RipOptions {
        flags: RipFlags::empty(),
        song_table: Some(SONG_TABLE),
    };
    let output = rip(&rom, &options).expect("manual table should work");
    assert_eq!(output.songs.len(), 2);
}

#[test]
fn test_table_past_eof_is_fatal() {
    let rom = build_rom();
    let options = RipOptions {
        flags: RipFlags::empty(),
        song_table: Some(0x10_0000),
    };
    assert!(rip(&rom, &options).is_err());
}

#[test]
fn test_leading_zero_words_are_skipped() {
    let rom = build_rom();
    let mut image = rom.bytes().to_vec();
    // Two zero words in front of the real table.
    let padded_table = SONG_TABLE - 8;
    put_u32(&mut image, padded_table, 0);
    put_u32(&mut image, padded_table + 4, 0);
    let rom = Rom::new(image);
    let options = RipOptions {
        flags: RipFlags::empty(),
        song_table: Some(padded_table),
    };
    let output = rip(&rom, &options).expect("rip should succeed");
    assert_eq!(output.songs.len(), 2);
}
