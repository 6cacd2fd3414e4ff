//! Frequency-domain low-pass filter

use realfft::RealFftPlanner;
use crate::error::{NasalanceError, Result};

/// Keeps spectral content from 0 Hz up to `cutoff_hz`, with an optional Hann
/// roll-off of `smoothing_hz` above the cutoff.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    cutoff_hz: f64,
    smoothing_hz: f64,
}

impl LowPassFilter {
    pub fn new(cutoff_hz: f64, smoothing_hz: f64) -> Result<Self> {
        if !(cutoff_hz > 0.0) {
            return Err(NasalanceError::config(format!("Cutoff must be positive, got {}", cutoff_hz)));
        }
        if !(smoothing_hz >= 0.0) {
            return Err(NasalanceError::config(format!("Smoothing width cannot be negative, got {}", smoothing_hz)));
        }
        Ok(Self { cutoff_hz, smoothing_hz })
    }

    pub fn cutoff_hz(&self) -> f64 {
        self.cutoff_hz
    }

    fn gain(&self, freq: f64) -> f64 {
        if freq <= self.cutoff_hz {
            1.0
        } else if freq < self.cutoff_hz + self.smoothing_hz {
            let progress = (freq - self.cutoff_hz) / self.smoothing_hz;
            0.5 * (1.0 + (std::f64::consts::PI * progress).cos())
        } else {
            0.0
        }
    }

    /// Filter one channel. The output has exactly as many samples as the input.
    pub fn apply(&self, samples: &[f64], sample_rate: u32) -> Result<Vec<f64>> {
        if sample_rate == 0 {
            return Err(NasalanceError::processing("Sample rate cannot be 0"));
        }
        let n = samples.len();
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut planner = RealFftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(n);
        let inverse = planner.plan_fft_inverse(n);

        let mut input = samples.to_vec();
        let mut spectrum = forward.make_output_vec();
        forward
            .process(&mut input, &mut spectrum)
            .map_err(|e| NasalanceError::processing(format!("Forward FFT failed: {}", e)))?;

        let bin_hz = sample_rate as f64 / n as f64;
        for (k, bin) in spectrum.iter_mut().enumerate() {
            *bin *= self.gain(k as f64 * bin_hz);
        }
        // The inverse transform requires purely real DC and Nyquist bins.
        spectrum[0].im = 0.0;
        if n % 2 == 0 {
            if let Some(last) = spectrum.last_mut() {
                last.im = 0.0;
            }
        }

        let mut output = inverse.make_output_vec();
        inverse
            .process(&mut spectrum, &mut output)
            .map_err(|e| NasalanceError::processing(format!("Inverse FFT failed: {}", e)))?;

        let scale = 1.0 / n as f64;
        output.iter_mut().for_each(|s| *s *= scale);
        output.truncate(n);
        Ok(output)
    }

    /// Filter both channels. Diverging lengths are reported and both outputs
    /// are cut to the shorter one.
    pub fn apply_pair(&self, oral: &[f64], nasal: &[f64], sample_rate: u32) -> Result<(Vec<f64>, Vec<f64>)> {
        let mut oral = self.apply(oral, sample_rate)?;
        let mut nasal = self.apply(nasal, sample_rate)?;

        if oral.len() != nasal.len() {
            let mismatch = NasalanceError::ChannelLengthMismatch { oral: oral.len(), nasal: nasal.len() };
            log::warn!("{}; continuing with the shorter channel", mismatch);
            let len = oral.len().min(nasal.len());
            oral.truncate(len);
            nasal.truncate(len);
        }
        Ok((oral, nasal))
    }
}
