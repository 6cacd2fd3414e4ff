//! Nasalance Engine
//!
//! Three independent derivations from paired oral/nasal tracks:
//!
//! - `Intensity`: `nasal / (nasal + oral)` on normalized intensity tracks.
//! - `Lpf`: the same ratio on moving-average smoothed `|nasal|` and `|oral|`
//!   of the low-pass filtered waveforms.
//! - `RawDifference`: `|nasal| - |oral|` on normalized raw waveforms.
//!
//! Oral and nasal points are paired by time with outer-join semantics: a time
//! present in only one channel (for instance after outlier trimming) yields an
//! undefined value at that time.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::samples::{RecordingMeta, SamplePoint};
use crate::track::{IntensityTrack, TrackPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NasalanceVariant {
    Intensity,
    Lpf,
    RawDifference,
}

impl NasalanceVariant {
    pub const ALL: [NasalanceVariant; 3] = [Self::Intensity, Self::Lpf, Self::RawDifference];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Intensity => "intensity",
            Self::Lpf => "lpf",
            Self::RawDifference => "raw_difference",
        }
    }
}

impl fmt::Display for NasalanceVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One derived nasalance series for one recording.
#[derive(Debug, Clone)]
pub struct NasalanceTrack {
    pub variant: NasalanceVariant,
    pub meta: Arc<RecordingMeta>,
    pub points: Vec<TrackPoint>,
}

impl NasalanceTrack {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn defined_count(&self) -> usize {
        self.points.iter().filter(|p| p.value.is_some()).count()
    }

    pub fn values(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.points.iter().map(|p| p.value)
    }

    /// Lay the series onto a regular grid, carrying the recording's file end time.
    pub fn to_track(&self, x1: f64, dx: f64, nx: usize) -> IntensityTrack {
        IntensityTrack::on_grid(self.points.iter().copied(), x1, dx, nx, self.meta.file_end_time)
    }
}

fn time_key(time: f64) -> i64 {
    (time * 1e9).round() as i64
}

/// Outer join on time: `(time, oral, nasal)` rows in time order.
fn pair_by_time<I, J>(oral: I, nasal: J) -> Vec<(f64, Option<f64>, Option<f64>)>
where
    I: IntoIterator<Item = TrackPoint>,
    J: IntoIterator<Item = TrackPoint>,
{
    let mut rows: BTreeMap<i64, (f64, Option<f64>, Option<f64>)> = BTreeMap::new();
    for p in oral {
        rows.entry(time_key(p.time)).or_insert((p.time, None, None)).1 = p.value;
    }
    for p in nasal {
        rows.entry(time_key(p.time)).or_insert((p.time, None, None)).2 = p.value;
    }
    rows.into_values().collect()
}

/// Centered moving average; a position whose window runs past either end or
/// covers an undefined value is undefined. For even windows the extra sample
/// lies ahead of the centre.
pub fn moving_average(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let window = window.max(1);
    let ahead = window / 2;

    let mut sums = vec![0.0; n + 1];
    let mut gaps = vec![0usize; n + 1];
    for (i, v) in values.iter().enumerate() {
        let defined = v.filter(|x| x.is_finite());
        sums[i + 1] = sums[i] + defined.unwrap_or(0.0);
        gaps[i + 1] = gaps[i] + usize::from(defined.is_none());
    }

    (0..n)
        .map(|i| {
            let hi = i + ahead;
            if hi >= n {
                return None;
            }
            let lo = (hi + 1).checked_sub(window)?;
            (gaps[hi + 1] == gaps[lo]).then(|| (sums[hi + 1] - sums[lo]) / window as f64)
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct NasalanceEngine {
    amplitude_floor: f64,
    smoothing_window_ms: f64,
}

impl NasalanceEngine {
    pub const DEFAULT_FLOOR: f64 = 0.01;

    pub fn new(amplitude_floor: f64, smoothing_window_ms: f64) -> Self {
        Self { amplitude_floor, smoothing_window_ms }
    }

    /// `ceil(sample_rate * window_ms / 1000)`, at least one sample.
    pub fn window_samples(&self, sample_rate: u32) -> usize {
        ((sample_rate as f64 * self.smoothing_window_ms / 1000.0).ceil() as usize).max(1)
    }

    /// `nasal / (nasal + oral)`, undefined when either side is missing or
    /// `|nasal|` is at or below the floor. The range is (0, 1]: an oral value
    /// of exactly 0, the minimum of a min-max scaled group, gives 1.
    pub fn ratio(&self, nasal: Option<f64>, oral: Option<f64>) -> Option<f64> {
        let (n, o) = (nasal?, oral?);
        if n.abs() <= self.amplitude_floor {
            return None;
        }
        let r = n / (n + o);
        r.is_finite().then_some(r)
    }

    pub fn intensity_based(&self, oral: &[SamplePoint], nasal: &[SamplePoint], meta: &Arc<RecordingMeta>) -> NasalanceTrack {
        let points = pair_by_time(oral.iter().map(SamplePoint::track_point), nasal.iter().map(SamplePoint::track_point))
            .into_iter()
            .map(|(time, o, n)| TrackPoint { time, value: self.ratio(n, o) })
            .collect();
        NasalanceTrack { variant: NasalanceVariant::Intensity, meta: Arc::clone(meta), points }
    }

    pub fn lpf_based(&self, oral: &[SamplePoint], nasal: &[SamplePoint], meta: &Arc<RecordingMeta>) -> NasalanceTrack {
        let window = self.window_samples(meta.sampling_rate);
        let smooth = |points: &[SamplePoint]| -> Vec<TrackPoint> {
            let magnitudes: Vec<Option<f64>> = points.iter().map(|p| p.amplitude.map(f64::abs)).collect();
            moving_average(&magnitudes, window)
                .into_iter()
                .zip(points)
                .map(|(value, p)| TrackPoint { time: p.time, value })
                .collect()
        };

        let points = pair_by_time(smooth(oral), smooth(nasal))
            .into_iter()
            .map(|(time, o, n)| TrackPoint { time, value: self.ratio(n, o) })
            .collect();
        NasalanceTrack { variant: NasalanceVariant::Lpf, meta: Arc::clone(meta), points }
    }

    /// True when no defined nasal value of the recording rises above the floor.
    pub fn nasal_below_floor(&self, nasal: &[SamplePoint]) -> bool {
        nasal
            .iter()
            .filter_map(|p| p.amplitude)
            .all(|a| a.abs() <= self.amplitude_floor)
    }

    /// No per-sample floor: defined wherever both channels are. A recording
    /// whose nasal channel never rises above the floor is undefined throughout.
    pub fn raw_difference(&self, oral: &[SamplePoint], nasal: &[SamplePoint], meta: &Arc<RecordingMeta>) -> NasalanceTrack {
        let silent = self.nasal_below_floor(nasal);
        if silent {
            log::debug!("Recording {}: nasal channel below floor, raw difference undefined", meta.recording_id);
        }
        let points = pair_by_time(oral.iter().map(SamplePoint::track_point), nasal.iter().map(SamplePoint::track_point))
            .into_iter()
            .map(|(time, o, n)| TrackPoint {
                time,
                value: n.zip(o).filter(|_| !silent).map(|(n, o)| n.abs() - o.abs()),
            })
            .collect();
        NasalanceTrack { variant: NasalanceVariant::RawDifference, meta: Arc::clone(meta), points }
    }
}

impl Default for NasalanceEngine {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FLOOR, 10.0)
    }
}
