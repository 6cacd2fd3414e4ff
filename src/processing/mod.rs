//! Nasalance Processing Pipeline

pub mod samples;
pub mod normalize;
pub mod nasalance;
pub mod gate;
pub mod batch;

pub use samples::{Channel, GroupKey, RecordingMeta, SamplePoint, SignalType};
pub use normalize::{Conditioner, GroupStats, Normalizer, OutlierTrimmer, db_to_pressure};
pub use nasalance::{NasalanceEngine, NasalanceTrack, NasalanceVariant, moving_average};
pub use gate::{SegmentFilter, SegmentGate, SegmentInterval};
pub use batch::{
    AbortHandle, Artifact, BatchOrchestrator, BatchReport, DerivedRecording, ExportKind, IngestedRecording, NoSegments,
    RecordingInput, RecordingOutcome, SegmentFiles, SegmentMap, SegmentSource, discover,
};
