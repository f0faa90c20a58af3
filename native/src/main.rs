use agbrip_core::{rip, LocateError, RipError, RipFlags, RipOptions, Rom};
use clap::Parser;
use log::{error, info};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const EXIT_OK: i32 = 0;
const EXIT_INPUT: i32 = -1;
const EXIT_NOT_FOUND: i32 = -2;
const EXIT_STRUCTURAL: i32 = -3;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// ROM file to rip
    rom_path: PathBuf,

    /// Song table offset, hex with an 0x prefix or decimal; found by
    /// scanning for the sound engine when omitted
    song_table: Option<String>,

    /// Output directory (defaults to the ROM's directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Name presets after the General MIDI patch map
    #[arg(long)]
    gm: bool,

    /// Rearrange channels to avoid MIDI channel 10
    #[arg(long)]
    rc: bool,

    /// Emit XG bank select and reset sysex; default is GS
    #[arg(long)]
    xg: bool,

    /// One SoundFont per bank, each in its own sub-directory
    #[arg(long)]
    sb: bool,

    /// Disable volume linearisation and vibrato simulation
    #[arg(long)]
    raw: bool,
}

#[derive(Debug, Error)]
enum AddressError {
    #[error("cannot parse song table address `{0}`")]
    Unparseable(String),
}

fn parse_address(text: &str) -> Result<usize, AddressError> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.map_err(|_| AddressError::Unparseable(text.to_owned()))
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    std::process::exit(run(&args));
}

fn run(args: &Args) -> i32 {
    let rom_bytes = match fs::read(&args.rom_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("cannot read {}: {e}", args.rom_path.display());
            return EXIT_INPUT;
        }
    };
    let rom = Rom::new(rom_bytes);

    let song_table = match args.song_table.as_deref().map(parse_address) {
        Some(Ok(addr)) => Some(addr),
        Some(Err(e)) => {
            error!("{e}");
            return EXIT_INPUT;
        }
        None => None,
    };

    let mut flags = RipFlags::empty();
    flags.set(RipFlags::GM, args.gm);
    flags.set(RipFlags::RC, args.rc);
    flags.set(RipFlags::XG, args.xg);
    flags.set(RipFlags::SB, args.sb);
    flags.set(RipFlags::RAW, args.raw);
    let options = RipOptions { flags, song_table };

    let output = match rip(&rom, &options) {
        Ok(output) => output,
        Err(RipError::Locate(LocateError::NotFound)) => {
            error!("no Sappy/M4A sound engine found; pass a song table address to override");
            return EXIT_NOT_FOUND;
        }
        Err(e) => {
            error!("{e}");
            return EXIT_STRUCTURAL;
        }
    };

    let out_dir = match &args.output {
        Some(dir) => dir.clone(),
        None => args
            .rom_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let stem = args
        .rom_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "rip".to_owned());

    if let Err(e) = fs::create_dir_all(&out_dir) {
        error!("cannot create {}: {e}", out_dir.display());
        return EXIT_INPUT;
    }

    let mut written = 0usize;
    for song in &output.songs {
        let path = out_dir.join(format!("song{:03}.mid", song.index));
        match fs::write(&path, &song.data) {
            Ok(()) => written += 1,
            Err(e) => error!("cannot write {}: {e}", path.display()),
        }
    }

    for sf in &output.soundfonts {
        let path = match sf.bank {
            Some(bank) => {
                let dir = out_dir.join(format!("bank_{bank:02}"));
                if let Err(e) = fs::create_dir_all(&dir) {
                    error!("cannot create {}: {e}", dir.display());
                    continue;
                }
                dir.join(format!("{stem}.sf2"))
            }
            None => out_dir.join(format!("{stem}.sf2")),
        };
        match fs::write(&path, &sf.data) {
            Ok(()) => written += 1,
            Err(e) => error!("cannot write {}: {e}", path.display()),
        }
    }

    info!(
        "wrote {written} files ({} songs, {} soundfonts) to {}",
        output.songs.len(),
        output.soundfonts.len(),
        out_dir.display()
    );
    EXIT_OK
}
