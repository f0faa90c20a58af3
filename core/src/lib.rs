pub mod instruments;
pub mod locator;
pub mod midi;
pub mod psg;
pub mod ripper;
pub mod rom;
pub mod sequencer;
pub mod sf2;

pub use instruments::{InstrumentBuilder, InstrumentError, InstrumentRecord};
pub use locator::{locate, EngineInfo, EngineParams, LocateError};
pub use midi::MidiFile;
pub use ripper::{rip, RipError, RipFlags, RipOptions, RipOutput};
pub use rom::{Rom, RomError};
pub use sequencer::{Sequencer, SongError, SongHeader, SongOptions};
pub use sf2::SoundFont;
