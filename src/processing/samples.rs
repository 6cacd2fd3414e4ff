//! Sample points and grouping keys
//!
//! Every statistical step works per `(speaker, channel, signal type)` group:
//! points are partitioned by key, each partition is transformed as a whole,
//! and the results are concatenated once in key order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::track::{IntensityTrack, TrackPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    Oral,
    Nasal,
}

impl Channel {
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Oral => "oral",
            Channel::Nasal => "nasal",
        }
    }

    /// 1-based recording channel carrying this flow.
    pub fn index(&self, nasal_channel_index: usize) -> usize {
        match self {
            Channel::Nasal => nasal_channel_index,
            Channel::Oral => 3 - nasal_channel_index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignalType {
    RawWave,
    FilteredWave,
    IntensityTrack,
}

impl SignalType {
    pub fn is_waveform(&self) -> bool {
        !matches!(self, SignalType::IntensityTrack)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SignalType::RawWave => "raw",
            SignalType::FilteredWave => "filtered",
            SignalType::IntensityTrack => "intensity",
        }
    }
}

/// Per-recording metadata shared by every point of that recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingMeta {
    pub speaker_id: Arc<str>,
    pub item_id: String,
    pub recording_id: String,
    pub sampling_rate: u32,
    pub bit_depth: u16,
    /// End time of the source file; carried as is into every export.
    pub file_end_time: f64,
}

#[derive(Debug, Clone)]
pub struct SamplePoint {
    pub time: f64,
    pub amplitude: Option<f64>,
    pub channel: Channel,
    pub signal_type: SignalType,
    pub meta: Arc<RecordingMeta>,
}

impl SamplePoint {
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            speaker_id: Arc::clone(&self.meta.speaker_id),
            channel: self.channel,
            signal_type: self.signal_type,
        }
    }

    pub fn track_point(&self) -> TrackPoint {
        TrackPoint { time: self.time, value: self.amplitude }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub speaker_id: Arc<str>,
    pub channel: Channel,
    pub signal_type: SignalType,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.speaker_id, self.channel.name(), self.signal_type.name())
    }
}

pub fn partition(points: Vec<SamplePoint>) -> BTreeMap<GroupKey, Vec<SamplePoint>> {
    let mut groups: BTreeMap<GroupKey, Vec<SamplePoint>> = BTreeMap::new();
    for point in points {
        groups.entry(point.group_key()).or_default().push(point);
    }
    groups
}

pub fn rejoin(groups: BTreeMap<GroupKey, Vec<SamplePoint>>) -> Vec<SamplePoint> {
    let total = groups.values().map(Vec::len).sum();
    let mut points = Vec::with_capacity(total);
    for (_, group) in groups {
        points.extend(group);
    }
    points
}

/// Partition, transform every group independently, rejoin.
pub fn map_groups<F>(points: Vec<SamplePoint>, f: F) -> Vec<SamplePoint>
where
    F: Fn(&GroupKey, Vec<SamplePoint>) -> Vec<SamplePoint>,
{
    let transformed = partition(points)
        .into_iter()
        .map(|(key, group)| {
            let out = f(&key, group);
            (key, out)
        })
        .collect();
    rejoin(transformed)
}

/// Points of one channel and signal type, in time order.
pub fn select(points: &[SamplePoint], channel: Channel, signal_type: SignalType) -> Vec<SamplePoint> {
    let mut selected: Vec<SamplePoint> = points
        .iter()
        .filter(|p| p.channel == channel && p.signal_type == signal_type)
        .cloned()
        .collect();
    selected.sort_by(|a, b| a.time.total_cmp(&b.time));
    selected
}

pub fn from_track(track: &IntensityTrack, channel: Channel, meta: &Arc<RecordingMeta>) -> Vec<SamplePoint> {
    track
        .points()
        .map(|p| SamplePoint {
            time: p.time,
            amplitude: p.value,
            channel,
            signal_type: SignalType::IntensityTrack,
            meta: Arc::clone(meta),
        })
        .collect()
}

/// Waveform sample `i` sits at the centre of its sampling period, `(i + 0.5) / rate`.
pub fn from_wave(samples: &[f64], channel: Channel, signal_type: SignalType, meta: &Arc<RecordingMeta>) -> Vec<SamplePoint> {
    let period = 1.0 / meta.sampling_rate as f64;
    samples
        .iter()
        .enumerate()
        .map(|(i, &amplitude)| SamplePoint {
            time: (i as f64 + 0.5) * period,
            amplitude: Some(amplitude),
            channel,
            signal_type,
            meta: Arc::clone(meta),
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn test_meta(speaker: &str, sampling_rate: u32) -> Arc<RecordingMeta> {
    Arc::new(RecordingMeta {
        speaker_id: Arc::from(speaker),
        item_id: "item".to_string(),
        recording_id: format!("{}item", speaker),
        sampling_rate,
        bit_depth: 16,
        file_end_time: 1.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_index() {
        assert_eq!(Channel::Nasal.index(2), 2);
        assert_eq!(Channel::Oral.index(2), 1);
        assert_eq!(Channel::Oral.index(1), 2);
    }

    #[test]
    fn test_partition_keeps_groups_apart() {
        let a = test_meta("s01", 100);
        let b = test_meta("s02", 100);
        let mut points = from_wave(&[1.0, 2.0], Channel::Oral, SignalType::RawWave, &a);
        points.extend(from_wave(&[3.0], Channel::Nasal, SignalType::RawWave, &a));
        points.extend(from_wave(&[4.0, 5.0, 6.0], Channel::Oral, SignalType::RawWave, &b));

        let groups = partition(points);
        assert_eq!(groups.len(), 3);
        let sizes: Vec<usize> = groups.values().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 1, 3]);
    }

    #[test]
    fn test_map_groups_and_select() {
        let meta = test_meta("s01", 10);
        let mut points = from_wave(&[1.0, 2.0], Channel::Nasal, SignalType::RawWave, &meta);
        points.extend(from_wave(&[5.0, 6.0], Channel::Oral, SignalType::RawWave, &meta));

        let mapped = map_groups(points, |_, group| group.into_iter().skip(1).collect());
        assert_eq!(mapped.len(), 2);

        let nasal = select(&mapped, Channel::Nasal, SignalType::RawWave);
        assert_eq!(nasal.len(), 1);
        assert_eq!(nasal[0].amplitude, Some(2.0));
        assert!((nasal[0].time - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_group_key_display() {
        let meta = test_meta("s07", 10);
        let p = &from_wave(&[0.0], Channel::Nasal, SignalType::FilteredWave, &meta)[0];
        assert_eq!(p.group_key().to_string(), "s07/nasal/filtered");
    }
}
