pub mod core;
pub mod time;

pub use self::core::{create_smf, write_smf, MidiError, MidiSettings};
pub use self::time::{Tempo, Tick};
