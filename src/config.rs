//! Configuration management for nasalance batches

use crate::error::{NasalanceError, Result};
use crate::processing::{ExportKind, NasalanceVariant, SegmentFilter};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub verbose: bool,
    pub filter: FilterConfig,
    pub normalization: NormalizationConfig,
    pub nasalance: NasalanceConfig,
    pub batch: BatchConfig,
    pub gate: GateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub cutoff_hz: f64,
    /// Width of the Hann roll-off above the cutoff; 0 gives a brick-wall cut.
    pub smoothing_hz: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    pub trim_threshold_stddev: f64,
    pub convert_db_to_pressure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NasalanceConfig {
    pub amplitude_floor: f64,
    pub smoothing_window_ms: f64,
    pub nasal_channel_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Length of the filename prefix that identifies the speaker.
    pub speaker_prefix_len: usize,
    pub parallel: bool,
    pub workers: usize,
    pub overwrite: bool,
    pub export: Vec<ExportKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub enabled: bool,
    pub tier: Option<usize>,
    /// Names from `classes` whose symbols are accepted.
    pub select: Vec<String>,
    pub variants: Vec<NasalanceVariant>,
    pub classes: BTreeMap<String, Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            verbose: false,
            filter: FilterConfig::default(),
            normalization: NormalizationConfig::default(),
            nasalance: NasalanceConfig::default(),
            batch: BatchConfig::default(),
            gate: GateConfig::default(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            cutoff_hz: 40.0,
            smoothing_hz: 10.0,
        }
    }
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            trim_threshold_stddev: 6.0,
            convert_db_to_pressure: false,
        }
    }
}

impl Default for NasalanceConfig {
    fn default() -> Self {
        Self {
            amplitude_floor: 0.01,
            smoothing_window_ms: 10.0,
            nasal_channel_index: 2,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            speaker_prefix_len: 3,
            parallel: false,
            workers: num_cpus::get(),
            overwrite: true,
            export: ExportKind::ALL.to_vec(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        let class = |symbols: &[&str]| symbols.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let mut classes = BTreeMap::new();
        classes.insert("nasal_consonants".to_string(), class(&["m", "n", "ɲ", "ŋ", "ɳ"]));
        classes.insert("prenasalized".to_string(), class(&["mb", "nd", "ŋg", "ɲɟ", "mp", "nt", "ŋk"]));
        classes.insert("nasal_vowels".to_string(), class(&["ã", "ẽ", "ĩ", "õ", "ũ", "ɛ̃", "ɔ̃"]));
        classes.insert("oral_vowels".to_string(), class(&["a", "e", "i", "o", "u", "ɛ", "ɔ", "ə"]));
        classes.insert("glottal_glides".to_string(), class(&["h", "ʔ", "w", "j"]));

        Self {
            enabled: true,
            tier: None,
            select: classes.keys().cloned().collect(),
            variants: NasalanceVariant::ALL.to_vec(),
            classes,
        }
    }
}

impl Config {
    /// Get filter cutoff (convenience method)
    pub fn filter_cutoff_hz(&self) -> f64 {
        self.filter.cutoff_hz
    }

    /// Get outlier threshold in standard deviations (convenience method)
    pub fn trim_threshold_stddev(&self) -> f64 {
        self.normalization.trim_threshold_stddev
    }

    /// Get nasal amplitude floor (convenience method)
    pub fn nasal_amplitude_floor(&self) -> f64 {
        self.nasalance.amplitude_floor
    }

    /// Get moving-average window in milliseconds (convenience method)
    pub fn smoothing_window_ms(&self) -> f64 {
        self.nasalance.smoothing_window_ms
    }

    /// Get the 1-based channel carrying nasal flow (convenience method)
    pub fn nasal_channel_index(&self) -> usize {
        self.nasalance.nasal_channel_index
    }

    /// Get dB to pressure conversion flag (convenience method)
    pub fn convert_db_to_pressure(&self) -> bool {
        self.normalization.convert_db_to_pressure
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Segment filter built from the selected classes
    pub fn segment_filter(&self) -> Result<SegmentFilter> {
        Ok(SegmentFilter::from_classes(&self.gate.classes, &self.gate.select)?.with_tier(self.gate.tier))
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "nasalance", about = "Nasalance tracks from dual-channel airflow recordings", version, author)]
pub struct Args {
    #[arg(short = 'i', long = "input", help = "Directory with <base>.wav and <base>_ch<N>.Intensity files")]
    pub input: Option<PathBuf>,

    #[arg(short = 'o', long = "output", help = "Directory for derived .Intensity files")]
    pub output: Option<PathBuf>,

    #[arg(short = 'c', long = "config", help = "Config file path (TOML format)")]
    pub config_file: Option<PathBuf>,

    #[arg(long = "cutoff", help = "Low-pass cutoff frequency (Hz)")]
    pub cutoff_hz: Option<f64>,

    #[arg(long = "trim-threshold", help = "Outlier threshold in standard deviations")]
    pub trim_threshold: Option<f64>,

    #[arg(long = "floor", help = "Nasal amplitude floor below which nasalance is undefined")]
    pub floor: Option<f64>,

    #[arg(long = "window-ms", help = "Moving-average window for LPF nasalance (ms)")]
    pub window_ms: Option<f64>,

    #[arg(long = "nasal-channel", help = "Recording channel carrying nasal flow (1 or 2)")]
    pub nasal_channel: Option<usize>,

    #[arg(long = "db-to-pressure", help = "Convert intensity dB values to pressure before normalizing")]
    pub db_to_pressure: bool,

    #[arg(long = "parallel", help = "Process recordings of a speaker in parallel")]
    pub parallel: bool,

    #[arg(long = "workers", help = "Worker threads for parallel mode")]
    pub workers: Option<usize>,

    #[arg(long = "no-overwrite", help = "Fail instead of replacing existing output files")]
    pub no_overwrite: bool,

    #[arg(long = "no-gate", help = "Disable segment gating")]
    pub no_gate: bool,

    #[arg(short = 'v', long = "verbose", help = "Enable verbose output mode")]
    pub verbose: bool,

    #[arg(long = "write-default-config", help = "Write a default TOML config to this path and exit")]
    pub write_default_config: Option<PathBuf>,
}

impl Config {
    /// Create config from command line arguments and config file
    pub fn from_args_and_config(args: Args) -> Result<Self> {
        let mut config = if let Some(config_path) = &args.config_file {
            Self::from_file(config_path)?
        } else {
            Self::default()
        };

        // Command line arguments override config file settings
        if let Some(input) = args.input {
            config.input_dir = input;
        }
        if let Some(output) = args.output {
            config.output_dir = output;
        }
        if let Some(cutoff) = args.cutoff_hz {
            config.filter.cutoff_hz = cutoff;
        }
        if let Some(threshold) = args.trim_threshold {
            config.normalization.trim_threshold_stddev = threshold;
        }
        if let Some(floor) = args.floor {
            config.nasalance.amplitude_floor = floor;
        }
        if let Some(window) = args.window_ms {
            config.nasalance.smoothing_window_ms = window;
        }
        if let Some(channel) = args.nasal_channel {
            config.nasalance.nasal_channel_index = channel;
        }
        if let Some(workers) = args.workers {
            config.batch.workers = workers;
        }
        config.normalization.convert_db_to_pressure |= args.db_to_pressure;
        config.batch.parallel |= args.parallel;
        config.batch.overwrite &= !args.no_overwrite;
        config.gate.enabled &= !args.no_gate;
        config.verbose |= args.verbose;

        config.validate()?;
        Ok(config)
    }

    /// Load config from TOML config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NasalanceError::config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| NasalanceError::config(format!("Failed to parse config file: {}", e)))
    }

    /// Validate configuration parameter validity
    pub fn validate(&self) -> Result<()> {
        if !(self.filter.cutoff_hz > 0.0) {
            return Err(NasalanceError::config("Filter cutoff must be greater than 0 Hz"));
        }
        if !(self.filter.smoothing_hz >= 0.0) {
            return Err(NasalanceError::config("Filter smoothing width cannot be negative"));
        }

        if !(self.normalization.trim_threshold_stddev > 0.0) {
            return Err(NasalanceError::config("Trim threshold must be greater than 0"));
        }

        if !(self.nasalance.amplitude_floor >= 0.0) {
            return Err(NasalanceError::config("Nasal amplitude floor cannot be negative"));
        }
        if !(self.nasalance.smoothing_window_ms > 0.0) {
            return Err(NasalanceError::config("Smoothing window must be greater than 0 ms"));
        }
        if !(1..=2).contains(&self.nasalance.nasal_channel_index) {
            return Err(NasalanceError::config("Nasal channel index must be 1 or 2"));
        }

        if self.batch.speaker_prefix_len == 0 {
            return Err(NasalanceError::config("Speaker prefix length must be greater than 0"));
        }
        if self.batch.workers == 0 {
            return Err(NasalanceError::config("Worker count must be greater than 0"));
        }
        if self.batch.workers > num_cpus::get() * 2 {
            return Err(NasalanceError::config("Worker count cannot exceed 2x logical CPU cores"));
        }

        if self.gate.enabled {
            self.segment_filter()?;
        }

        Ok(())
    }

    /// Save config to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| NasalanceError::config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| NasalanceError::config(format!("Failed to write config file: {}", e)))
    }

    /// Create default config file
    pub fn create_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
        Self::default().save_to_file(path)
    }
}
