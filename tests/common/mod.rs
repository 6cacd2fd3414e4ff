//! Synthetic recordings shared by the integration tests.

#![allow(dead_code)]

use nasalance::audio::{AirflowAudio, AudioFormat};
use nasalance::{IntensityCodec, IntensityTrack};
use std::f64::consts::PI;
use std::path::Path;

pub const RATE: u32 = 1000;

/// One second of 3 Hz airflow on both channels plus matching intensity
/// tracks (`x1 = 0.025`, `dx = 0.01`, 95 frames, `xmax = 1.0`).
pub fn write_recording(dir: &Path, base: &str, nasal_amp: f64) {
    let wave = |amp: f64| -> Vec<f64> {
        (0..RATE as usize)
            .map(|i| amp * (2.0 * PI * 3.0 * i as f64 / RATE as f64).sin())
            .collect()
    };
    AirflowAudio::from_channels(RATE, AudioFormat::Int16, &wave(0.8), &wave(nasal_amp))
        .unwrap()
        .save_to_file(dir.join(format!("{}.wav", base)))
        .unwrap();

    let level = |amp: f64| -> Vec<Option<f64>> {
        (0..95)
            .map(|i| if i == 50 { None } else { Some(amp * (40.0 + 10.0 * (i as f64 * 0.2).sin())) })
            .collect()
    };
    for (channel, amp) in [(1, 1.0), (2, nasal_amp)] {
        let track = IntensityTrack::new(0.025, 0.01, 1.0, level(amp));
        IntensityCodec::write(&track, dir.join(format!("{}_ch{}.Intensity", base, channel)), true).unwrap();
    }
}

pub fn write_segments(dir: &Path, base: &str, toml: &str) {
    std::fs::write(dir.join(format!("{}.segments.toml", base)), toml).unwrap();
}
