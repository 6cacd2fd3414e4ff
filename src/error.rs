//! Error Types

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type
#[derive(Debug, Error)]
pub enum NasalanceError {
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("File already exists: {}", path.display())]
    FileExists { path: PathBuf },

    #[error("Malformed intensity track {}: {message}", path.display())]
    MalformedTrack { path: PathBuf, message: String },

    /// Recoverable: oral and nasal channels differ in length after filtering.
    #[error("Channel length mismatch: oral {oral} samples, nasal {nasal} samples")]
    ChannelLengthMismatch { oral: usize, nasal: usize },

    /// Recoverable: the group has no usable statistics (empty, all undefined or zero spread).
    #[error("Group statistics undefined for {group}")]
    GroupStatisticsUndefined { group: String },

    #[error("Audio error: {message}")]
    Audio { message: String },

    #[error("Config error: {message}")]
    Config { message: String },

    #[error("IO error: {message}")]
    Io { message: String },

    #[error("Processing error: {message}")]
    Processing { message: String },

    #[error("Batch aborted before recording {recording}")]
    Aborted { recording: String },
}

impl NasalanceError {
    pub fn file_not_found<P: AsRef<Path>>(path: P) -> Self {
        Self::FileNotFound { path: path.as_ref().to_path_buf() }
    }
    pub fn file_exists<P: AsRef<Path>>(path: P) -> Self {
        Self::FileExists { path: path.as_ref().to_path_buf() }
    }
    pub fn malformed<P: AsRef<Path>, S: Into<String>>(path: P, msg: S) -> Self {
        Self::MalformedTrack { path: path.as_ref().to_path_buf(), message: msg.into() }
    }
    pub fn group_undefined<S: Into<String>>(group: S) -> Self {
        Self::GroupStatisticsUndefined { group: group.into() }
    }
    pub fn audio<S: Into<String>>(msg: S) -> Self { Self::Audio { message: msg.into() } }
    pub fn config<S: Into<String>>(msg: S) -> Self { Self::Config { message: msg.into() } }
    pub fn io<S: Into<String>>(msg: S) -> Self { Self::Io { message: msg.into() } }
    pub fn processing<S: Into<String>>(msg: S) -> Self { Self::Processing { message: msg.into() } }

    /// True for conditions that are reported but never abort a recording.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ChannelLengthMismatch { .. } | Self::GroupStatisticsUndefined { .. })
    }
}

pub type Result<T> = std::result::Result<T, NasalanceError>;

impl From<std::io::Error> for NasalanceError {
    fn from(err: std::io::Error) -> Self { Self::io(err.to_string()) }
}

impl From<hound::Error> for NasalanceError {
    fn from(err: hound::Error) -> Self { Self::audio(format!("WAV: {}", err)) }
}
