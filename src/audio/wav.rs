//! Dual-channel airflow WAV reading and writing

use std::path::Path;
use std::fs::File;
use hound::{WavReader, WavWriter, SampleFormat};
use ndarray::{Array1, Array2};
use crate::error::{NasalanceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Int16,
    Int24,
    Int32,
    Float32,
}

impl AudioFormat {
    pub fn name(&self) -> &'static str {
        match self {
            AudioFormat::Int16 => "int16",
            AudioFormat::Int24 => "int24",
            AudioFormat::Int32 => "int32",
            AudioFormat::Float32 => "float32",
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        match self {
            AudioFormat::Int16 => 16,
            AudioFormat::Int24 => 24,
            AudioFormat::Int32 | AudioFormat::Float32 => 32,
        }
    }

    pub fn to_sample_format(self) -> SampleFormat {
        match self {
            AudioFormat::Float32 => SampleFormat::Float,
            _ => SampleFormat::Int,
        }
    }

    fn from_spec(spec: &hound::WavSpec) -> Result<Self> {
        match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 16) => Ok(AudioFormat::Int16),
            (SampleFormat::Int, 24) => Ok(AudioFormat::Int24),
            (SampleFormat::Int, 32) => Ok(AudioFormat::Int32),
            (SampleFormat::Float, 32) => Ok(AudioFormat::Float32),
            (format, bits) => Err(NasalanceError::audio(
                format!("Unsupported sample format: {:?} {} bit", format, bits)
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AudioHeader {
    pub sample_rate: u32,
    pub format: AudioFormat,
    pub frames: usize,
    pub duration: f64,
}

impl AudioHeader {
    pub fn new(sample_rate: u32, format: AudioFormat, frames: usize) -> Self {
        let duration = if sample_rate == 0 { 0.0 } else { frames as f64 / sample_rate as f64 };
        Self { sample_rate, format, frames, duration }
    }

    pub fn bit_depth(&self) -> u16 {
        self.format.bits_per_sample()
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(NasalanceError::audio("Sample rate cannot be 0"));
        }
        if self.frames == 0 {
            return Err(NasalanceError::audio("Recording contains no samples"));
        }
        Ok(())
    }

    pub fn to_wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: 2,
            sample_rate: self.sample_rate,
            bits_per_sample: self.format.bits_per_sample(),
            sample_format: self.format.to_sample_format(),
        }
    }
}

/// Two airflow channels, one column per channel, amplitudes in [-1, 1].
#[derive(Debug, Clone)]
pub struct AirflowAudio {
    pub header: AudioHeader,
    pub data: Array2<f64>,
}

impl AirflowAudio {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(NasalanceError::file_not_found(path));
        }

        let file = File::open(path)
            .map_err(|e| NasalanceError::audio(format!("Cannot open audio file {}: {}", path.display(), e)))?;
        let mut reader = WavReader::new(file)
            .map_err(|e| NasalanceError::audio(format!("Cannot create WAV reader for {}: {}", path.display(), e)))?;

        let spec = reader.spec();
        if spec.channels != 2 {
            return Err(NasalanceError::audio(format!(
                "Expected 2 airflow channels in {}, found {}", path.display(), spec.channels
            )));
        }
        let format = AudioFormat::from_spec(&spec)?;

        let samples: Vec<f64> = match format {
            AudioFormat::Float32 => reader
                .samples::<f32>()
                .map(|s| s.map(f64::from))
                .collect::<std::result::Result<_, _>>()?,
            _ => {
                let scale = (1u64 << (spec.bits_per_sample - 1)) as f64;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f64 / scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        let frames = samples.len() / 2;
        let data = Array2::from_shape_vec((frames, 2), samples[..frames * 2].to_vec())
            .map_err(|e| NasalanceError::audio(format!("Cannot shape channel data: {}", e)))?;

        let header = AudioHeader::new(spec.sample_rate, format, frames);
        header.validate()?;
        Ok(Self { header, data })
    }

    pub fn from_channels(sample_rate: u32, format: AudioFormat, ch1: &[f64], ch2: &[f64]) -> Result<Self> {
        if ch1.len() != ch2.len() {
            return Err(NasalanceError::audio(format!(
                "Channel lengths differ: {} vs {}", ch1.len(), ch2.len()
            )));
        }
        let mut data = Array2::zeros((ch1.len(), 2));
        data.column_mut(0).assign(&Array1::from(ch1.to_vec()));
        data.column_mut(1).assign(&Array1::from(ch2.to_vec()));
        Ok(Self { header: AudioHeader::new(sample_rate, format, ch1.len()), data })
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let spec = self.header.to_wav_spec();
        let mut writer = WavWriter::create(path, spec)
            .map_err(|e| NasalanceError::audio(format!("Cannot create output file {}: {}", path.display(), e)))?;

        let scale = ((1u64 << (spec.bits_per_sample - 1)) - 1) as f64;
        for &sample in self.data.iter() {
            let clamped = sample.clamp(-1.0, 1.0);
            match self.header.format {
                AudioFormat::Float32 => writer.write_sample(clamped as f32)?,
                AudioFormat::Int16 => writer.write_sample((clamped * scale).round() as i16)?,
                _ => writer.write_sample((clamped * scale).round() as i32)?,
            }
        }
        writer.finalize()?;
        Ok(())
    }

    /// 1-based channel access.
    pub fn channel(&self, index: usize) -> Result<Array1<f64>> {
        if !(1..=2).contains(&index) {
            return Err(NasalanceError::audio(format!("Channel index must be 1 or 2, got {}", index)));
        }
        Ok(self.data.column(index - 1).to_owned())
    }

    /// Split into `(oral, nasal)` given which channel carries nasal flow.
    pub fn split(&self, nasal_channel_index: usize) -> Result<(Array1<f64>, Array1<f64>)> {
        let nasal = self.channel(nasal_channel_index)?;
        let oral = self.channel(3 - nasal_channel_index)?;
        Ok((oral, nasal))
    }

    pub fn sample_rate(&self) -> u32 {
        self.header.sample_rate
    }

    pub fn bit_depth(&self) -> u16 {
        self.header.bit_depth()
    }

    pub fn frames(&self) -> usize {
        self.header.frames
    }

    pub fn duration(&self) -> f64 {
        self.header.duration
    }
}
