//! Outlier trimming and per-group normalization

use super::samples::{map_groups, GroupKey, SamplePoint, SignalType};
use crate::error::NasalanceError;

/// Reference sound pressure in Pa for dB conversion.
const REFERENCE_PRESSURE: f64 = 2.0e-5;

/// Linear pressure-like unit from an intensity in dB.
pub fn db_to_pressure(db: f64) -> f64 {
    REFERENCE_PRESSURE * 10f64.powf(db / 20.0)
}

/// Summary statistics over the defined amplitudes of one group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupStats {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` with fewer than two values.
    pub std_dev: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub max_abs: f64,
}

impl GroupStats {
    pub fn of(points: &[SamplePoint]) -> Option<Self> {
        let values: Vec<f64> = points
            .iter()
            .filter_map(|p| p.amplitude)
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let std_dev = (count > 1).then(|| {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        });
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        Some(Self { count, mean, std_dev, min, max, max_abs: min.abs().max(max.abs()) })
    }
}

fn report_undefined(key: &GroupKey, why: &str) {
    log::debug!("{} ({})", NasalanceError::group_undefined(key.to_string()), why);
}

/// Drops points whose amplitude is more than `threshold` standard deviations
/// from their group mean. Points are removed, not clamped, so oral and nasal
/// samples may lose their partner; the pairing step tolerates that.
#[derive(Debug, Clone)]
pub struct OutlierTrimmer {
    threshold: f64,
}

impl OutlierTrimmer {
    pub const DEFAULT_THRESHOLD: f64 = 6.0;

    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn trim(&self, points: Vec<SamplePoint>) -> Vec<SamplePoint> {
        map_groups(points, |key, group| self.trim_group(key, group))
    }

    pub fn trim_group(&self, key: &GroupKey, group: Vec<SamplePoint>) -> Vec<SamplePoint> {
        let Some(stats) = GroupStats::of(&group) else {
            report_undefined(key, "no defined amplitudes");
            return group;
        };
        let Some(sd) = stats.std_dev else {
            report_undefined(key, "single value, no spread");
            return group;
        };

        let limit = self.threshold * sd;
        let before = group.len();
        let kept: Vec<SamplePoint> = group
            .into_iter()
            .filter(|p| match p.amplitude {
                Some(a) => (a - stats.mean).abs() <= limit,
                None => true,
            })
            .collect();

        if kept.len() < before {
            log::debug!("Trimmed {} of {} points from {}", before - kept.len(), before, key);
        }
        kept
    }
}

impl Default for OutlierTrimmer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

/// Waveform groups are divided by their peak magnitude (range [-1, 1]);
/// intensity groups are min-max rescaled to [0, 1]. A group without a usable
/// scale comes out entirely undefined.
#[derive(Debug, Clone, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn normalize(&self, points: Vec<SamplePoint>) -> Vec<SamplePoint> {
        map_groups(points, |key, group| self.normalize_group(key, group))
    }

    pub fn normalize_group(&self, key: &GroupKey, mut group: Vec<SamplePoint>) -> Vec<SamplePoint> {
        // (offset, span): waveform peaks map to +-1, intensity min/max to 0/1
        let scale = GroupStats::of(&group).and_then(|stats| {
            if key.signal_type.is_waveform() {
                (stats.max_abs > 0.0).then_some((0.0, stats.max_abs))
            } else {
                let range = stats.max - stats.min;
                (range > 0.0).then_some((stats.min, range))
            }
        });

        match scale {
            Some((offset, span)) => {
                for p in group.iter_mut() {
                    p.amplitude = p.amplitude.filter(|a| a.is_finite()).map(|a| (a - offset) / span);
                }
            }
            None => {
                report_undefined(key, "no scale for normalization");
                for p in group.iter_mut() {
                    p.amplitude = None;
                }
            }
        }
        group
    }
}

/// Unit conversion, trimming and normalization in that order.
#[derive(Debug, Clone)]
pub struct Conditioner {
    trimmer: OutlierTrimmer,
    normalizer: Normalizer,
    convert_db_to_pressure: bool,
}

impl Conditioner {
    pub fn new(trim_threshold: f64, convert_db_to_pressure: bool) -> Self {
        Self {
            trimmer: OutlierTrimmer::new(trim_threshold),
            normalizer: Normalizer,
            convert_db_to_pressure,
        }
    }

    pub fn condition(&self, mut points: Vec<SamplePoint>) -> Vec<SamplePoint> {
        if self.convert_db_to_pressure {
            for p in points.iter_mut().filter(|p| p.signal_type == SignalType::IntensityTrack) {
                p.amplitude = p.amplitude.map(db_to_pressure);
            }
        }
        let trimmed = self.trimmer.trim(points);
        self.normalizer.normalize(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::samples::{from_track, from_wave, select, test_meta, Channel};
    use crate::track::IntensityTrack;

    fn spiky() -> Vec<f64> {
        let mut v: Vec<f64> = (0..200).map(|i| ((i % 7) as f64 - 3.0) * 0.01).collect();
        v[100] = 5.0;
        v
    }

    #[test]
    fn test_db_to_pressure() {
        assert!((db_to_pressure(0.0) - 2.0e-5).abs() < 1e-15);
        assert!((db_to_pressure(20.0) - 2.0e-4).abs() < 1e-15);
    }

    #[test]
    fn test_group_stats() {
        let meta = test_meta("s01", 10);
        let points = from_wave(&[1.0, 2.0, 3.0, -4.0], Channel::Oral, SignalType::RawWave, &meta);
        let stats = GroupStats::of(&points).unwrap();
        assert_eq!(stats.count, 4);
        assert!((stats.mean - 0.5).abs() < 1e-12);
        assert_eq!(stats.max_abs, 4.0);
        assert!(GroupStats::of(&[]).is_none());
    }

    #[test]
    fn test_trim_drops_only_outliers() {
        let meta = test_meta("s01", 100);
        let points = from_wave(&spiky(), Channel::Nasal, SignalType::RawWave, &meta);
        let stats = GroupStats::of(&points).unwrap();
        let limit = 3.0 * stats.std_dev.unwrap();

        let trimmed = OutlierTrimmer::new(3.0).trim(points.clone());
        assert_eq!(trimmed.len(), points.len() - 1);
        assert!(trimmed.iter().all(|p| p.amplitude != Some(5.0)));

        // nothing within k standard deviations is removed
        let inside = points
            .iter()
            .filter(|p| (p.amplitude.unwrap() - stats.mean).abs() <= limit)
            .count();
        assert_eq!(trimmed.len(), inside);
    }

    #[test]
    fn test_trim_statistics_do_not_leak_between_groups() {
        let quiet = test_meta("s01", 100);
        let loud = test_meta("s02", 100);
        let mut points = from_wave(&spiky(), Channel::Oral, SignalType::RawWave, &quiet);
        points.extend(from_wave(&[100.0, -100.0, 100.0, -100.0], Channel::Oral, SignalType::RawWave, &loud));

        let trimmed = OutlierTrimmer::new(3.0).trim(points);
        assert_eq!(trimmed.len(), 199 + 4);
    }

    #[test]
    fn test_normalize_bounds() {
        let meta = test_meta("s01", 100);
        let wave = from_wave(&spiky(), Channel::Oral, SignalType::RawWave, &meta);
        let track = IntensityTrack::new(0.0, 0.01, 1.0, vec![Some(40.0), Some(70.0), None, Some(55.0)]);
        let mut points = wave;
        points.extend(from_track(&track, Channel::Oral, &meta));

        let normalized = Normalizer.normalize(points);
        for p in &normalized {
            let Some(a) = p.amplitude else { continue };
            if p.signal_type.is_waveform() {
                assert!((-1.0..=1.0).contains(&a));
            } else {
                assert!((0.0..=1.0).contains(&a));
            }
        }

        let intensity = select(&normalized, Channel::Oral, SignalType::IntensityTrack);
        let values: Vec<Option<f64>> = intensity.iter().map(|p| p.amplitude).collect();
        assert_eq!(values, vec![Some(0.0), Some(1.0), None, Some(0.5)]);
    }

    #[test]
    fn test_flat_group_becomes_undefined() {
        let meta = test_meta("s01", 100);
        let silent = from_wave(&[0.0; 16], Channel::Nasal, SignalType::RawWave, &meta);
        let normalized = Normalizer.normalize(silent);
        assert!(normalized.iter().all(|p| p.amplitude.is_none()));

        let flat = IntensityTrack::new(0.0, 0.01, 1.0, vec![Some(3.0); 4]);
        let normalized = Normalizer.normalize(from_track(&flat, Channel::Nasal, &meta));
        assert!(normalized.iter().all(|p| p.amplitude.is_none()));
    }

    #[test]
    fn test_conditioner_converts_intensity_only() {
        let meta = test_meta("s01", 100);
        let track = IntensityTrack::new(0.0, 0.01, 1.0, vec![Some(0.0), Some(20.0), Some(40.0)]);
        let mut points = from_track(&track, Channel::Oral, &meta);
        points.extend(from_wave(&[0.5, -0.25], Channel::Oral, SignalType::RawWave, &meta));

        let out = Conditioner::new(6.0, true).condition(points);
        let intensity = select(&out, Channel::Oral, SignalType::IntensityTrack);
        // pressures 2e-5, 2e-4, 2e-3 rescaled to [0, 1]
        let mid = intensity[1].amplitude.unwrap();
        assert!((mid - (2.0e-4 - 2.0e-5) / (2.0e-3 - 2.0e-5)).abs() < 1e-9);

        let wave = select(&out, Channel::Oral, SignalType::RawWave);
        assert_eq!(wave[0].amplitude, Some(1.0));
        assert_eq!(wave[1].amplitude, Some(-0.5));
    }
}
