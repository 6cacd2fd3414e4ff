//! Audio Module
//!
//! Dual-channel airflow WAV ingestion and frequency-domain low-pass filtering.

pub mod wav;
pub mod filter;

pub use wav::{AirflowAudio, AudioFormat, AudioHeader};
pub use filter::LowPassFilter;
