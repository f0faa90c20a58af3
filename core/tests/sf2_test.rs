use agbrip_core::sf2::{GenAmount, GeneratorType, SampleSource};
use agbrip_core::SoundFont;

#[test]
fn test_one_shot_sample_directory_math() {
    let mut sf2 = SoundFont::new();
    let body = [0u8; 32];
    let index = sf2
        .add_new_sample(
            "one shot",
            SampleSource::Signed8(&body),
            32,
            false,
            0,
            22050,
            60,
            0,
        )
        .unwrap();
    let header = sf2.sample_header(index);
    assert_eq!(header.start, 0);
    assert_eq!(header.end, 32);
    assert_eq!(header.loop_start, 0);
    assert_eq!(header.loop_end, 0);
    // 32 samples plus the 46-sample guard band, two bytes each.
    assert_eq!(sf2.arena_len() * 2, 156);
}

#[test]
fn test_looping_sample_directory_math() {
    let mut sf2 = SoundFont::new();
    let body: Vec<u8> = (0..64).collect();
    let index = sf2
        .add_new_sample(
            "looped",
            SampleSource::Signed8(&body),
            64,
            true,
            32,
            22050,
            60,
            0,
        )
        .unwrap();
    let header = sf2.sample_header(index);
    assert_eq!(header.end, 64 + 8);
    assert_eq!(header.loop_start, 32);
    assert_eq!(header.loop_end, 64);
    assert_eq!(sf2.arena_len() * 2, (64 + 8 + 46) * 2);
}

#[test]
fn test_arena_length_accumulates() {
    let mut sf2 = SoundFont::new();
    let a = [0u8; 100];
    let b = [0u8; 50];
    sf2.add_new_sample("a", SampleSource::Signed8(&a), 100, true, 10, 32000, 60, 0)
        .unwrap();
    sf2.add_new_sample("b", SampleSource::Signed8(&b), 50, false, 0, 32000, 60, 0)
        .unwrap();
    assert_eq!(sf2.arena_len(), (100 + 8 + 46) + (50 + 46));
}

#[test]
fn test_bag_indices_are_monotonic() {
    let mut sf2 = SoundFont::new();
    let body = [0u8; 32];
    let sample = sf2
        .add_new_sample("s", SampleSource::Signed8(&body), 32, false, 0, 22050, 60, 0)
        .unwrap();
    for i in 0..4 {
        let inst = sf2.add_new_instrument(&format!("inst {i}"));
        for _ in 0..=i {
            sf2.add_new_inst_bag();
            sf2.add_new_inst_generator(GeneratorType::SampleModes, GenAmount::Value(0));
            sf2.add_new_inst_generator(GeneratorType::SampleId, GenAmount::Value(sample as i16));
        }
        sf2.add_new_preset(&format!("preset {i}"), i as u16, 0);
        sf2.add_new_preset_bag();
        sf2.add_new_preset_generator(GeneratorType::Instrument, GenAmount::Value(inst as i16));
    }
    for pair in sf2.preset_bag_indices().windows(2) {
        assert!(pair[0] <= pair[1]);
    }
    for pair in sf2.inst_bag_indices().windows(2) {
        assert!(pair[0] <= pair[1]);
    }
    for pair in sf2.pbag_gen_indices().windows(2) {
        assert!(pair[0] <= pair[1]);
    }
    for pair in sf2.ibag_gen_indices().windows(2) {
        assert!(pair[0] <= pair[1]);
    }
}

/// Walks a RIFF LIST payload, returning (id, payload) pairs.
fn walk_chunks(mut data: &[u8]) -> Vec<([u8; 4], Vec<u8>)> {
    let mut chunks = Vec::new();
    while data.len() >= 8 {
        let id: [u8; 4] = data[0..4].try_into().unwrap();
        let size = u32::from_le_bytes(data[4..8].try_into().unwrap()) as usize;
        chunks.push((id, data[8..8 + size].to_vec()));
        data = &data[8 + size..];
    }
    chunks
}

#[test]
fn test_written_file_structure() {
    let mut sf2 = SoundFont::new();
    let body = [0u8; 32];
    let sample = sf2
        .add_new_sample("s", SampleSource::Signed8(&body), 32, false, 0, 22050, 60, 0)
        .unwrap();
    let inst = sf2.add_new_instrument("inst");
    sf2.add_new_inst_bag();
    sf2.add_new_inst_generator(GeneratorType::SampleModes, GenAmount::Value(0));
    sf2.add_new_inst_generator(GeneratorType::SampleId, GenAmount::Value(sample as i16));
    sf2.add_new_preset("preset", 0, 0);
    sf2.add_new_preset_bag();
    sf2.add_new_preset_generator(GeneratorType::Instrument, GenAmount::Value(inst as i16));

    let mut file = Vec::new();
    sf2.write(&mut file).unwrap();

    assert_eq!(&file[0..4], b"RIFF");
    let riff_len = u32::from_le_bytes(file[4..8].try_into().unwrap()) as usize;
    assert_eq!(riff_len + 8, file.len());
    assert_eq!(&file[8..12], b"sfbk");

    let mut info = None;
    let mut sdta = None;
    let mut pdta = None;
    let mut rest = &file[12..];
    while rest.len() >= 12 {
        assert_eq!(&rest[0..4], b"LIST");
        let size = u32::from_le_bytes(rest[4..8].try_into().unwrap()) as usize;
        let kind: [u8; 4] = rest[8..12].try_into().unwrap();
        let payload = rest[12..8 + size].to_vec();
        match &kind {
            b"INFO" => info = Some(payload),
            b"sdta" => sdta = Some(payload),
            b"pdta" => pdta = Some(payload),
            other => panic!("unexpected list {other:?}"),
        }
        rest = &rest[8 + size..];
    }

    let info = walk_chunks(&info.expect("INFO list"));
    assert_eq!(info[0].0, *b"ifil");
    assert_eq!(info[0].1, vec![2, 0, 1, 0]);
    assert_eq!(info[1].1, b"EMU8000\0");
    assert_eq!(info[2].1, b"Unnamed\0");
    assert_eq!(info[3].1, b"Nintendo Game Boy Advance SoundFont\0");
    assert_eq!(
        info[4].1,
        b"Ripped with SF2Ripper v0.0 (c) 2012 by Bregalad\0"
    );

    let sdta = walk_chunks(&sdta.expect("sdta list"));
    assert_eq!(sdta[0].0, *b"smpl");
    assert_eq!(sdta[0].1.len(), (32 + 46) * 2);

    let pdta = walk_chunks(&pdta.expect("pdta list"));
    let sizes: Vec<(String, usize)> = pdta
        .iter()
        .map(|(id, payload)| (String::from_utf8_lossy(id).into_owned(), payload.len()))
        .collect();
    let expect_record = |name: &str, record: usize, count: usize| {
        let entry = sizes
            .iter()
            .find(|(id, _)| id == name)
            .unwrap_or_else(|| panic!("missing {name}"));
        assert_eq!(entry.1 % record, 0, "{name} record size");
        assert_eq!(entry.1 / record, count, "{name} record count");
    };
    // One real record on each side plus the terminators added at write time.
    expect_record("phdr", 38, 2);
    expect_record("pbag", 4, 2);
    expect_record("pmod", 10, 1);
    expect_record("pgen", 4, 2);
    expect_record("inst", 22, 2);
    expect_record("ibag", 4, 2);
    expect_record("imod", 10, 1);
    expect_record("igen", 4, 3);
    expect_record("shdr", 46, 2);
}

#[test]
fn test_terminator_names_present() {
    let sf2 = SoundFont::new();
    let mut file = Vec::new();
    sf2.write(&mut file).unwrap();
    let has = |needle: &[u8]| file.windows(needle.len()).any(|w| w == needle);
    assert!(has(b"EOP"));
    assert!(has(b"EOI"));
    assert!(has(b"EOS"));
}
