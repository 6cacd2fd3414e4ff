//! Intensity Track Module
//!
//! A regularly sampled time series with explicit missing values, plus the
//! reader/writer for the Praat `Intensity 2` text format.

pub mod codec;

pub use codec::{IntensityCodec, UNDEFINED_TOKEN};

use crate::error::{NasalanceError, Result};

/// One `(time, value)` row of a track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub time: f64,
    pub value: Option<f64>,
}

/// Intensity track: `time[i] = x1 + i * dx`, `value[i]` may be undefined.
///
/// `xmax` is the end time of the file the track belongs to. It is carried
/// through every transformation and is never recomputed from sample times.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityTrack {
    pub x1: f64,
    pub dx: f64,
    pub xmax: f64,
    pub values: Vec<Option<f64>>,
}

impl IntensityTrack {
    pub fn new(x1: f64, dx: f64, xmax: f64, values: Vec<Option<f64>>) -> Self {
        Self { x1, dx, xmax, values }
    }

    /// Build a track from ordered rows: `x1` is the first row's time and `dx`
    /// the delta between the first two rows.
    pub fn from_points(points: &[TrackPoint], xmax: f64) -> Result<Self> {
        let first = points
            .first()
            .ok_or_else(|| NasalanceError::processing("Cannot build a track from zero rows"))?;
        let dx = points.get(1).map(|p| p.time - first.time).unwrap_or(0.0);
        Ok(Self {
            x1: first.time,
            dx,
            xmax,
            values: points.iter().map(|p| p.value).collect(),
        })
    }

    /// Place rows onto the grid `x1 + i * dx`. Grid slots without a row stay
    /// undefined; rows that fall between slots or outside the grid are dropped.
    pub fn on_grid<I>(points: I, x1: f64, dx: f64, nx: usize, xmax: f64) -> Self
    where
        I: IntoIterator<Item = TrackPoint>,
    {
        let mut values = vec![None; nx];
        if dx > 0.0 {
            for p in points {
                let pos = (p.time - x1) / dx;
                let slot = pos.round();
                if slot < 0.0 || (pos - slot).abs() > 1e-3 {
                    continue;
                }
                if let Some(v) = values.get_mut(slot as usize) {
                    *v = p.value;
                }
            }
        }
        Self::new(x1, dx, xmax, values)
    }

    /// Sample count (`nx`)
    pub fn nx(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn time(&self, index: usize) -> f64 {
        self.x1 + index as f64 * self.dx
    }

    pub fn points(&self) -> impl Iterator<Item = TrackPoint> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(i, &value)| TrackPoint { time: self.time(i), value })
    }

    pub fn defined_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Apply `f` to every defined value, keeping the grid and `xmax`.
    pub fn map_defined<F: Fn(f64) -> f64>(&self, f: F) -> Self {
        Self {
            values: self.values.iter().map(|v| v.map(&f)).collect(),
            ..self.clone()
        }
    }
}
