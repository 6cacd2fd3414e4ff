//! Batch Orchestrator
//!
//! Walks speakers in sequence and their recordings one at a time (or on a
//! rayon pool), running ingest -> trim/normalize -> nasalance -> gate ->
//! export for each. A failing recording is logged and skipped.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::gate::{SegmentGate, SegmentInterval};
use super::nasalance::{NasalanceEngine, NasalanceTrack, NasalanceVariant};
use super::normalize::Conditioner;
use super::samples::{self, Channel, RecordingMeta, SamplePoint, SignalType};
use crate::audio::{AirflowAudio, LowPassFilter};
use crate::config::Config;
use crate::error::{NasalanceError, Result};
use crate::track::{IntensityCodec, IntensityTrack};

/// Source of annotation intervals for a recording.
pub trait SegmentSource: Send + Sync {
    /// `Ok(None)` when the recording has no annotation at all.
    fn segments(&self, recording_id: &str) -> Result<Option<Vec<SegmentInterval>>>;
}

pub struct NoSegments;

impl SegmentSource for NoSegments {
    fn segments(&self, _recording_id: &str) -> Result<Option<Vec<SegmentInterval>>> {
        Ok(None)
    }
}

/// Intervals held in memory, keyed by recording id.
#[derive(Debug, Clone, Default)]
pub struct SegmentMap(pub HashMap<String, Vec<SegmentInterval>>);

impl SegmentSource for SegmentMap {
    fn segments(&self, recording_id: &str) -> Result<Option<Vec<SegmentInterval>>> {
        Ok(self.0.get(recording_id).cloned())
    }
}

/// Reads `<recording>.segments.toml` files holding `[[interval]]` tables.
#[derive(Debug, Clone)]
pub struct SegmentFiles {
    dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SegmentFile {
    #[serde(default)]
    interval: Vec<SegmentInterval>,
}

impl SegmentFiles {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn path_for(&self, recording_id: &str) -> PathBuf {
        self.dir.join(format!("{}.segments.toml", recording_id))
    }
}

impl SegmentSource for SegmentFiles {
    fn segments(&self, recording_id: &str) -> Result<Option<Vec<SegmentInterval>>> {
        let path = self.path_for(recording_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let file: SegmentFile = toml::from_str(&content)
            .map_err(|e| NasalanceError::processing(format!("Cannot parse {}: {}", path.display(), e)))?;
        Ok(Some(file.interval))
    }
}

/// Which derived tracks get written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    NormalizedChannels,
    IntensityNasalance,
    LpfNasalance,
    RawDifference,
}

impl ExportKind {
    pub const ALL: [ExportKind; 4] = [
        Self::NormalizedChannels,
        Self::IntensityNasalance,
        Self::LpfNasalance,
        Self::RawDifference,
    ];

    pub fn artifacts(&self) -> Vec<Artifact> {
        match self {
            Self::NormalizedChannels => vec![Artifact::NormalizedChannel(1), Artifact::NormalizedChannel(2)],
            Self::IntensityNasalance => vec![Artifact::Nasalance(NasalanceVariant::Intensity)],
            Self::LpfNasalance => vec![Artifact::Nasalance(NasalanceVariant::Lpf)],
            Self::RawDifference => vec![Artifact::Nasalance(NasalanceVariant::RawDifference)],
        }
    }
}

/// One output file of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    /// 1-based recording channel
    NormalizedChannel(usize),
    Nasalance(NasalanceVariant),
}

impl Artifact {
    pub fn file_name(&self, base: &str) -> String {
        match self {
            Artifact::NormalizedChannel(n) => format!("{}_ch{}_normalized.Intensity", base, n),
            Artifact::Nasalance(NasalanceVariant::Intensity) => format!("{}_nasalance.Intensity", base),
            Artifact::Nasalance(NasalanceVariant::Lpf) => format!("{}_LPF_nasalance_normalized.Intensity", base),
            Artifact::Nasalance(NasalanceVariant::RawDifference) => format!("{}_signal_difference.Intensity", base),
        }
    }
}

/// Input files of one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingInput {
    pub recording_id: String,
    pub wav: PathBuf,
    /// `<base>_ch1.Intensity`, `<base>_ch2.Intensity`
    pub intensity: [PathBuf; 2],
}

impl RecordingInput {
    pub fn from_wav<P: AsRef<Path>>(wav: P) -> Result<Self> {
        let wav = wav.as_ref();
        let recording_id = wav
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| NasalanceError::processing(format!("Bad recording file name: {}", wav.display())))?
            .to_string();
        let dir = wav.parent().unwrap_or(Path::new("."));
        let intensity = [1, 2].map(|n| dir.join(format!("{}_ch{}.Intensity", recording_id, n)));
        Ok(Self { recording_id, wav: wav.to_path_buf(), intensity })
    }

    /// 1-based channel
    pub fn intensity_path(&self, channel: usize) -> &Path {
        &self.intensity[channel - 1]
    }
}

/// All `*.wav` recordings in `dir`, sorted by name.
pub fn discover<P: AsRef<Path>>(dir: P) -> Result<Vec<RecordingInput>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(NasalanceError::file_not_found(dir));
    }
    let mut wavs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| p.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("wav")))
        .collect();
    wavs.sort();
    wavs.iter().map(RecordingInput::from_wav).collect()
}

/// Speaker code: the first `prefix_len` characters of the recording name.
pub fn speaker_code(recording_id: &str, prefix_len: usize) -> String {
    recording_id.chars().take(prefix_len).collect()
}

pub fn group_by_speaker(inputs: Vec<RecordingInput>, prefix_len: usize) -> BTreeMap<String, Vec<RecordingInput>> {
    let mut speakers: BTreeMap<String, Vec<RecordingInput>> = BTreeMap::new();
    for input in inputs {
        speakers.entry(speaker_code(&input.recording_id, prefix_len)).or_default().push(input);
    }
    speakers
}

/// Cooperative stop flag, checked before each recording starts.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub x1: f64,
    pub dx: f64,
    pub nx: usize,
}

impl Grid {
    fn of(track: &IntensityTrack) -> Self {
        Self { x1: track.x1, dx: track.dx, nx: track.nx() }
    }

    fn of_wave(sample_rate: u32, nx: usize) -> Self {
        let dx = 1.0 / sample_rate as f64;
        Self { x1: 0.5 * dx, dx, nx }
    }
}

/// Everything derived from one recording, before export.
#[derive(Debug, Clone)]
pub struct DerivedRecording {
    pub meta: Arc<RecordingMeta>,
    /// Normalized intensity per 1-based recording channel
    pub normalized: BTreeMap<usize, IntensityTrack>,
    pub variants: Vec<NasalanceTrack>,
    pub intensity_grid: Grid,
    pub wave_grid: Grid,
}

impl DerivedRecording {
    pub fn variant(&self, variant: NasalanceVariant) -> Option<&NasalanceTrack> {
        self.variants.iter().find(|t| t.variant == variant)
    }

    pub fn artifact_track(&self, artifact: Artifact) -> Option<IntensityTrack> {
        match artifact {
            Artifact::NormalizedChannel(n) => self.normalized.get(&n).cloned(),
            Artifact::Nasalance(variant) => {
                let grid = match variant {
                    NasalanceVariant::Intensity => self.intensity_grid,
                    NasalanceVariant::Lpf | NasalanceVariant::RawDifference => self.wave_grid,
                };
                self.variant(variant).map(|t| t.to_track(grid.x1, grid.dx, grid.nx))
            }
        }
    }
}

#[derive(Debug)]
pub struct RecordingOutcome {
    pub speaker_id: String,
    pub recording_id: String,
    pub result: Result<Vec<PathBuf>>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<RecordingOutcome>,
    pub elapsed_secs: f64,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn files_written(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(Vec::len)
            .sum()
    }

    pub fn outcome(&self, recording_id: &str) -> Option<&RecordingOutcome> {
        self.outcomes.iter().find(|o| o.recording_id == recording_id)
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} recordings: {} processed, {} skipped, {} files written in {:.2}s",
            self.outcomes.len(),
            self.succeeded(),
            self.failed(),
            self.files_written(),
            self.elapsed_secs
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ChannelSource {
    index: usize,
    grid: Grid,
    xmax: f64,
}

/// Raw, filtered and intensity points of one recording, before or after
/// speaker-wide conditioning.
#[derive(Debug, Clone)]
pub struct IngestedRecording {
    pub meta: Arc<RecordingMeta>,
    pub points: Vec<SamplePoint>,
    oral: ChannelSource,
    nasal: ChannelSource,
    wave_grid: Grid,
}

pub struct BatchOrchestrator {
    config: Config,
    filter: LowPassFilter,
    conditioner: Conditioner,
    engine: NasalanceEngine,
    gate: Option<SegmentGate>,
    segments: Box<dyn SegmentSource>,
    abort: AbortHandle,
}

impl BatchOrchestrator {
    pub fn new(config: Config, segments: Box<dyn SegmentSource>) -> Result<Self> {
        config.validate()?;

        let filter = LowPassFilter::new(config.filter.cutoff_hz, config.filter.smoothing_hz)?;
        let conditioner = Conditioner::new(config.trim_threshold_stddev(), config.convert_db_to_pressure());
        let engine = NasalanceEngine::new(config.nasal_amplitude_floor(), config.smoothing_window_ms());
        let gate = if config.gate.enabled {
            Some(SegmentGate::new(config.segment_filter()?))
        } else {
            None
        };

        Ok(Self {
            config,
            filter,
            conditioner,
            engine,
            gate,
            segments,
            abort: AbortHandle::default(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Discover recordings in the configured input directory and run them all.
    pub fn run(&self) -> Result<BatchReport> {
        let inputs = discover(&self.config.input_dir)?;
        log::info!("Found {} recordings in {}", inputs.len(), self.config.input_dir.display());
        Ok(self.run_inputs(inputs))
    }

    pub fn run_inputs(&self, inputs: Vec<RecordingInput>) -> BatchReport {
        let start = Instant::now();
        let speakers = group_by_speaker(inputs, self.config.batch.speaker_prefix_len);

        let pool = if self.config.batch.parallel {
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.batch.workers)
                .build()
                .map_err(|e| log::warn!("Cannot build worker pool, running serially: {}", e))
                .ok()
        } else {
            None
        };

        let mut outcomes = Vec::new();
        for (speaker, recordings) in &speakers {
            log::info!("Speaker {}: {} recordings", speaker, recordings.len());
            outcomes.extend(self.run_speaker(speaker, recordings, pool.as_ref()));
        }

        BatchReport { outcomes, elapsed_secs: start.elapsed().as_secs_f64() }
    }

    /// Ingest every recording of the speaker, condition them together, then
    /// derive and export each one. Statistics never cross speakers.
    fn run_speaker(&self, speaker: &str, recordings: &[RecordingInput], pool: Option<&rayon::ThreadPool>) -> Vec<RecordingOutcome> {
        let ingested = map_recordings(pool, recordings, |input| {
            self.unless_aborted(&input.recording_id, || self.ingest(speaker, input))
        });

        let mut outcomes = Vec::new();
        let mut ready = Vec::new();
        for (input, result) in recordings.iter().zip(ingested) {
            match result {
                Ok(recording) => ready.push(recording),
                Err(e) => outcomes.push(self.outcome(speaker, &input.recording_id, Err(e))),
            }
        }

        let conditioned = self.condition_speaker(ready);
        let exported = map_recordings(pool, &conditioned, |recording| {
            self.unless_aborted(&recording.meta.recording_id, || {
                let derived = self.derive_recording(recording)?;
                self.export(&derived)
            })
        });
        for (recording, result) in conditioned.iter().zip(exported) {
            outcomes.push(self.outcome(speaker, &recording.meta.recording_id, result));
        }

        outcomes.sort_by(|a, b| a.recording_id.cmp(&b.recording_id));
        outcomes
    }

    fn unless_aborted<T, F: FnOnce() -> Result<T>>(&self, recording_id: &str, f: F) -> Result<T> {
        if self.abort.is_aborted() {
            return Err(NasalanceError::Aborted { recording: recording_id.to_string() });
        }
        f()
    }

    fn outcome(&self, speaker: &str, recording_id: &str, result: Result<Vec<PathBuf>>) -> RecordingOutcome {
        match &result {
            Ok(paths) => log::info!("Recording {}: wrote {} files", recording_id, paths.len()),
            Err(e) => log::error!("Skipping recording {}: {}", recording_id, e),
        }
        RecordingOutcome {
            speaker_id: speaker.to_string(),
            recording_id: recording_id.to_string(),
            result,
        }
    }

    /// Run one recording on its own, as a single-recording speaker.
    pub fn process_recording(&self, speaker: &str, input: &RecordingInput) -> Result<Vec<PathBuf>> {
        let derived = self.derive(speaker, input)?;
        self.export(&derived)
    }

    /// Derive one recording without writing anything. Statistics come from
    /// this recording alone.
    pub fn derive(&self, speaker: &str, input: &RecordingInput) -> Result<DerivedRecording> {
        let ingested = self.ingest(speaker, input)?;
        let conditioned = self.condition_speaker(vec![ingested]);
        let recording = conditioned
            .first()
            .ok_or_else(|| NasalanceError::processing(format!("Recording {} vanished during conditioning", input.recording_id)))?;
        self.derive_recording(recording)
    }

    /// Read the WAV and both intensity tracks, filter the waveforms and lay
    /// everything out as sample points.
    pub fn ingest(&self, speaker: &str, input: &RecordingInput) -> Result<IngestedRecording> {
        let nasal_index = self.config.nasal_channel_index();
        let oral_index = Channel::Oral.index(nasal_index);

        let audio = AirflowAudio::from_file(&input.wav)?;
        let (oral_raw, nasal_raw) = audio.split(nasal_index)?;
        let (oral_raw, nasal_raw) = (oral_raw.to_vec(), nasal_raw.to_vec());

        let oral_track = IntensityCodec::read(input.intensity_path(oral_index))?;
        let nasal_track = IntensityCodec::read(input.intensity_path(nasal_index))?;
        if Grid::of(&oral_track) != Grid::of(&nasal_track) {
            log::warn!("Recording {}: oral and nasal intensity grids differ", input.recording_id);
        }
        if oral_track.xmax != nasal_track.xmax {
            log::warn!(
                "Recording {}: intensity end times differ ({} vs {}), using the nasal one",
                input.recording_id,
                oral_track.xmax,
                nasal_track.xmax
            );
        }

        let meta = Arc::new(RecordingMeta {
            speaker_id: Arc::from(speaker),
            item_id: input.recording_id.strip_prefix(speaker).unwrap_or(&input.recording_id).to_string(),
            recording_id: input.recording_id.clone(),
            sampling_rate: audio.sample_rate(),
            bit_depth: audio.bit_depth(),
            file_end_time: nasal_track.xmax,
        });

        let (oral_filtered, nasal_filtered) = self.filter.apply_pair(&oral_raw, &nasal_raw, meta.sampling_rate)?;

        let mut points: Vec<SamplePoint> = Vec::with_capacity(4 * oral_raw.len() + 2 * nasal_track.nx());
        points.extend(samples::from_wave(&oral_raw, Channel::Oral, SignalType::RawWave, &meta));
        points.extend(samples::from_wave(&nasal_raw, Channel::Nasal, SignalType::RawWave, &meta));
        points.extend(samples::from_wave(&oral_filtered, Channel::Oral, SignalType::FilteredWave, &meta));
        points.extend(samples::from_wave(&nasal_filtered, Channel::Nasal, SignalType::FilteredWave, &meta));
        points.extend(samples::from_track(&oral_track, Channel::Oral, &meta));
        points.extend(samples::from_track(&nasal_track, Channel::Nasal, &meta));

        log::debug!("Recording {}: ingested {} sample points", input.recording_id, points.len());

        Ok(IngestedRecording {
            oral: ChannelSource { index: oral_index, grid: Grid::of(&oral_track), xmax: oral_track.xmax },
            nasal: ChannelSource { index: nasal_index, grid: Grid::of(&nasal_track), xmax: nasal_track.xmax },
            wave_grid: Grid::of_wave(meta.sampling_rate, oral_filtered.len()),
            meta,
            points,
        })
    }

    /// Trim and normalize all recordings of one speaker as a single pool,
    /// then hand each recording its own conditioned points back.
    ///
    /// Every point of the speaker is held at once: four points per waveform
    /// frame plus the intensity frames, each a `SamplePoint` with an `Arc`
    /// to its metadata, so memory grows with the speaker's total recorded
    /// duration and sample rate.
    pub fn condition_speaker(&self, mut recordings: Vec<IngestedRecording>) -> Vec<IngestedRecording> {
        let mut pooled = Vec::with_capacity(recordings.iter().map(|r| r.points.len()).sum());
        for recording in recordings.iter_mut() {
            pooled.append(&mut recording.points);
        }

        let mut by_recording: HashMap<String, Vec<SamplePoint>> = HashMap::new();
        for point in self.conditioner.condition(pooled) {
            by_recording.entry(point.meta.recording_id.clone()).or_default().push(point);
        }
        for recording in recordings.iter_mut() {
            recording.points = by_recording.remove(&recording.meta.recording_id).unwrap_or_default();
        }
        recordings
    }

    /// Nasalance variants, gating and normalized channel tracks of one
    /// conditioned recording.
    pub fn derive_recording(&self, recording: &IngestedRecording) -> Result<DerivedRecording> {
        let meta = &recording.meta;
        let pick = |channel, signal_type| samples::select(&recording.points, channel, signal_type);

        let oral_intensity = pick(Channel::Oral, SignalType::IntensityTrack);
        let nasal_intensity = pick(Channel::Nasal, SignalType::IntensityTrack);

        let variants = vec![
            self.engine.intensity_based(&oral_intensity, &nasal_intensity, meta),
            self.engine.lpf_based(
                &pick(Channel::Oral, SignalType::FilteredWave),
                &pick(Channel::Nasal, SignalType::FilteredWave),
                meta,
            ),
            self.engine.raw_difference(
                &pick(Channel::Oral, SignalType::RawWave),
                &pick(Channel::Nasal, SignalType::RawWave),
                meta,
            ),
        ];
        let variants = self.gate_variants(&meta.recording_id, variants)?;

        let mut normalized = BTreeMap::new();
        for (source, points) in [(&recording.oral, &oral_intensity), (&recording.nasal, &nasal_intensity)] {
            let grid = source.grid;
            let track = IntensityTrack::on_grid(points.iter().map(SamplePoint::track_point), grid.x1, grid.dx, grid.nx, source.xmax);
            normalized.insert(source.index, track);
        }

        Ok(DerivedRecording {
            meta: Arc::clone(meta),
            normalized,
            variants,
            intensity_grid: recording.nasal.grid,
            wave_grid: recording.wave_grid,
        })
    }

    fn gate_variants(&self, recording_id: &str, variants: Vec<NasalanceTrack>) -> Result<Vec<NasalanceTrack>> {
        let Some(gate) = &self.gate else {
            return Ok(variants);
        };
        let Some(intervals) = self.segments.segments(recording_id)? else {
            log::debug!("Recording {}: no segment annotation, tracks left ungated", recording_id);
            return Ok(variants);
        };

        Ok(variants
            .into_iter()
            .map(|track| {
                if self.config.gate.variants.contains(&track.variant) {
                    gate.apply(&track, &intervals)
                } else {
                    track
                }
            })
            .collect())
    }

    /// Write the configured artifacts; returns the written paths.
    pub fn export(&self, derived: &DerivedRecording) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for kind in &self.config.batch.export {
            for artifact in kind.artifacts() {
                let track = derived.artifact_track(artifact).ok_or_else(|| {
                    NasalanceError::processing(format!("No track for {:?} in {}", artifact, derived.meta.recording_id))
                })?;
                let path = self.config.output_dir.join(artifact.file_name(&derived.meta.recording_id));
                IntensityCodec::write(&track, &path, self.config.batch.overwrite)?;
                written.push(path);
            }
        }
        Ok(written)
    }
}

/// Map over recordings on the worker pool when there is one, serially otherwise.
fn map_recordings<T, R, F>(pool: Option<&rayon::ThreadPool>, items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    match pool {
        Some(pool) => pool.install(|| items.par_iter().map(f).collect()),
        None => items.iter().map(f).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFormat;
    use std::f64::consts::PI;
    use tempfile::TempDir;

    const RATE: u32 = 1000;

    fn write_recording(dir: &Path, base: &str, nasal_amp: f64) {
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
            (0..95).map(|i| Some(amp * (40.0 + 10.0 * (i as f64 * 0.2).sin()))).collect()
        };
        let oral = IntensityTrack::new(0.025, 0.01, 1.0, level(1.0));
        let nasal = IntensityTrack::new(0.025, 0.01, 1.0, level(nasal_amp));
        IntensityCodec::write(&oral, dir.join(format!("{}_ch1.Intensity", base)), true).unwrap();
        IntensityCodec::write(&nasal, dir.join(format!("{}_ch2.Intensity", base)), true).unwrap();
    }

    fn config(input: &Path, output: &Path) -> Config {
        let mut config = Config::default();
        config.input_dir = input.to_path_buf();
        config.output_dir = output.to_path_buf();
        config
    }

    #[test]
    fn test_artifact_names() {
        assert_eq!(Artifact::NormalizedChannel(2).file_name("ab1x"), "ab1x_ch2_normalized.Intensity");
        assert_eq!(Artifact::Nasalance(NasalanceVariant::Intensity).file_name("ab1x"), "ab1x_nasalance.Intensity");
        assert_eq!(
            Artifact::Nasalance(NasalanceVariant::Lpf).file_name("ab1x"),
            "ab1x_LPF_nasalance_normalized.Intensity"
        );
        let all: Vec<Artifact> = ExportKind::ALL.iter().flat_map(|k| k.artifacts()).collect();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn test_speaker_grouping() {
        assert_eq!(speaker_code("s01_pat", 3), "s01");
        assert_eq!(speaker_code("ab", 3), "ab");

        let inputs = ["s01_a.wav", "s02_a.wav", "s01_b.wav"]
            .iter()
            .map(|n| RecordingInput::from_wav(n).unwrap())
            .collect();
        let groups = group_by_speaker(inputs, 3);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["s01"].len(), 2);
        assert_eq!(groups["s01"][1].intensity_path(2), Path::new("s01_b_ch2.Intensity"));
    }

    #[test]
    fn test_discover_sorted_wavs() {
        let dir = TempDir::new().unwrap();
        for name in ["b02.wav", "a01.WAV", "notes.txt", "a01_ch1.Intensity"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let found = discover(dir.path()).unwrap();
        let ids: Vec<&str> = found.iter().map(|r| r.recording_id.as_str()).collect();
        assert_eq!(ids, vec!["a01", "b02"]);

        assert!(matches!(discover(dir.path().join("missing")), Err(NasalanceError::FileNotFound { .. })));
    }

    #[test]
    fn test_segment_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("s01_a.segments.toml"),
            "[[interval]]\nstart = 0.1\nend = 0.2\nlabel = \"m\"\n\n[[interval]]\nstart = 0.2\nend = 0.4\nlabel = \"a\"\ntier = 2\n",
        )
        .unwrap();

        let source = SegmentFiles::new(dir.path());
        let intervals = source.segments("s01_a").unwrap().unwrap();
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].tier, 1);
        assert_eq!(intervals[1], SegmentInterval::new(0.2, 0.4, "a", 2));
        assert!(source.segments("s01_b").unwrap().is_none());
    }

    #[test]
    fn test_derive_produces_all_variants() {
        let input_dir = TempDir::new().unwrap();
        let output_dir = TempDir::new().unwrap();
        write_recording(input_dir.path(), "s01_pa", 0.4);

        let orchestrator = BatchOrchestrator::new(config(input_dir.path(), output_dir.path()), Box::new(NoSegments)).unwrap();
        let input = RecordingInput::from_wav(input_dir.path().join("s01_pa.wav")).unwrap();
        let derived = orchestrator.derive("s01", &input).unwrap();

        assert_eq!(derived.meta.item_id, "_pa");
        assert_eq!(derived.meta.file_end_time, 1.0);
        assert_eq!(derived.variants.len(), 3);
        for variant in NasalanceVariant::ALL {
            let track = derived.variant(variant).unwrap();
            assert!(track.defined_count() > 0, "{} has no defined values", variant);
            if variant != NasalanceVariant::RawDifference {
                assert!(track.values().flatten().all(|v| v > 0.0 && v <= 1.0));
            }
        }
        for n in [1, 2] {
            let track = &derived.normalized[&n];
            assert_eq!(track.nx(), 95);
            assert!(track.values.iter().flatten().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_statistics_pool_across_a_speakers_recordings() {
        let input_dir = TempDir::new().unwrap();
        let output_dir = TempDir::new().unwrap();
        write_recording(input_dir.path(), "s01_loud", 0.4);
        write_recording(input_dir.path(), "s01_soft", 0.2);
        write_recording(input_dir.path(), "s02_soft", 0.2);

        let orchestrator = BatchOrchestrator::new(config(input_dir.path(), output_dir.path()), Box::new(NoSegments)).unwrap();
        let report = orchestrator.run().unwrap();
        assert_eq!(report.succeeded(), 3);

        let peak = |base: &str| -> f64 {
            let track = IntensityCodec::read(output_dir.path().join(format!("{}_ch2_normalized.Intensity", base))).unwrap();
            track.values.iter().flatten().fold(f64::MIN, |a, &b| a.max(b))
        };
        // the soft recording shares its scale with the loud one of the same speaker
        assert!(peak("s01_soft") < 0.5);
        assert_eq!(peak("s01_loud"), 1.0);
        // but not with another speaker
        assert_eq!(peak("s02_soft"), 1.0);
    }

    #[test]
    fn test_silent_nasal_channel_is_undefined_everywhere() {
        let input_dir = TempDir::new().unwrap();
        let output_dir = TempDir::new().unwrap();
        write_recording(input_dir.path(), "s01_mm", 0.0);

        let orchestrator = BatchOrchestrator::new(config(input_dir.path(), output_dir.path()), Box::new(NoSegments)).unwrap();
        let input = RecordingInput::from_wav(input_dir.path().join("s01_mm.wav")).unwrap();
        let derived = orchestrator.derive("s01", &input).unwrap();

        for track in &derived.variants {
            assert!(!track.is_empty());
            assert_eq!(track.defined_count(), 0, "{} should be undefined", track.variant);
        }
    }

    #[test]
    fn test_quiet_nasal_channel_pooled_with_loud_recording_is_undefined() {
        let input_dir = TempDir::new().unwrap();
        let output_dir = TempDir::new().unwrap();
        write_recording(input_dir.path(), "s01_loud", 0.8);
        write_recording(input_dir.path(), "s01_quiet", 0.002);

        let orchestrator = BatchOrchestrator::new(config(input_dir.path(), output_dir.path()), Box::new(NoSegments)).unwrap();
        let ingested = ["s01_loud", "s01_quiet"]
            .iter()
            .map(|base| {
                let input = RecordingInput::from_wav(input_dir.path().join(format!("{}.wav", base))).unwrap();
                orchestrator.ingest("s01", &input).unwrap()
            })
            .collect();
        let conditioned = orchestrator.condition_speaker(ingested);

        let quiet = orchestrator.derive_recording(&conditioned[1]).unwrap();
        assert_eq!(quiet.meta.recording_id, "s01_quiet");
        for track in &quiet.variants {
            assert!(!track.is_empty());
            assert_eq!(track.defined_count(), 0, "{} should be undefined", track.variant);
        }

        let loud = orchestrator.derive_recording(&conditioned[0]).unwrap();
        assert!(loud.variants.iter().all(|t| t.defined_count() > 0));
    }

    #[test]
    fn test_gating_uses_segment_source() {
        let input_dir = TempDir::new().unwrap();
        let output_dir = TempDir::new().unwrap();
        write_recording(input_dir.path(), "s01_na", 0.4);

        let mut map = HashMap::new();
        map.insert("s01_na".to_string(), vec![SegmentInterval::new(0.3, 0.5, "n", 1)]);
        let mut cfg = config(input_dir.path(), output_dir.path());
        cfg.gate.variants = vec![NasalanceVariant::Intensity];

        let orchestrator = BatchOrchestrator::new(cfg, Box::new(SegmentMap(map))).unwrap();
        let input = RecordingInput::from_wav(input_dir.path().join("s01_na.wav")).unwrap();
        let derived = orchestrator.derive("s01", &input).unwrap();

        let gated = derived.variant(NasalanceVariant::Intensity).unwrap();
        assert!(gated.defined_count() > 0);
        assert!(gated.points.iter().filter(|p| p.value.is_some()).all(|p| p.time >= 0.3 && p.time <= 0.5));

        let ungated = derived.variant(NasalanceVariant::RawDifference).unwrap();
        assert!(ungated.points.iter().any(|p| p.value.is_some() && p.time > 0.6));
    }

    #[test]
    fn test_failed_recording_does_not_stop_batch() {
        let input_dir = TempDir::new().unwrap();
        let output_dir = TempDir::new().unwrap();
        write_recording(input_dir.path(), "s01_ok", 0.4);
        write_recording(input_dir.path(), "s01_bad", 0.4);
        std::fs::remove_file(input_dir.path().join("s01_bad_ch2.Intensity")).unwrap();

        let orchestrator = BatchOrchestrator::new(config(input_dir.path(), output_dir.path()), Box::new(NoSegments)).unwrap();
        let report = orchestrator.run().unwrap();

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.outcome("s01_bad").unwrap().result,
            Err(NasalanceError::FileNotFound { .. })
        ));
        assert_eq!(report.files_written(), 5);
        assert!(output_dir.path().join("s01_ok_nasalance.Intensity").exists());
        assert!(!output_dir.path().join("s01_bad_nasalance.Intensity").exists());
    }

    #[test]
    fn test_abort_skips_remaining_recordings() {
        let input_dir = TempDir::new().unwrap();
        let output_dir = TempDir::new().unwrap();
        write_recording(input_dir.path(), "s01_a", 0.4);
        write_recording(input_dir.path(), "s02_a", 0.4);

        let orchestrator = BatchOrchestrator::new(config(input_dir.path(), output_dir.path()), Box::new(NoSegments)).unwrap();
        orchestrator.abort_handle().abort();
        let report = orchestrator.run().unwrap();

        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcomes.iter().all(|o| matches!(o.result, Err(NasalanceError::Aborted { .. }))));
        assert_eq!(std::fs::read_dir(output_dir.path()).unwrap().count(), 0);
    }
}
