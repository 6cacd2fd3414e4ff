//! Nasalance - derived nasalance tracks from dual-channel airflow recordings
//!
//! Reads a two-channel WAV plus one Praat intensity track per channel,
//! normalizes them per speaker, computes intensity, LPF and raw-difference
//! nasalance, gates them by annotated segments and writes `.Intensity` files.

pub mod audio;
pub mod config;
pub mod error;
pub mod processing;
pub mod track;

pub use config::{Args, Config};
pub use error::{NasalanceError, Result};
pub use processing::{BatchOrchestrator, BatchReport, NasalanceVariant};
pub use track::{IntensityCodec, IntensityTrack};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// `RUST_LOG` wins when set; otherwise `debug` with `verbose`, `info` without.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .try_init()
        .ok();
}

pub fn get_library_info() -> LibraryInfo {
    LibraryInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct LibraryInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

impl std::fmt::Display for LibraryInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} v{} - {}", self.name, self.version, self.description)
    }
}
