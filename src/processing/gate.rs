//! Segment Gate
//!
//! Keeps nasalance values only inside annotated intervals whose label belongs
//! to the selected phonetic classes; every other value becomes undefined.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::nasalance::NasalanceTrack;
use crate::error::{NasalanceError, Result};

/// A labeled span from an externally parsed annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentInterval {
    pub start: f64,
    pub end: f64,
    pub label: String,
    #[serde(default = "default_tier")]
    pub tier: usize,
}

fn default_tier() -> usize {
    1
}

impl SegmentInterval {
    pub fn new<S: Into<String>>(start: f64, end: f64, label: S, tier: usize) -> Self {
        Self { start, end, label: label.into(), tier }
    }

    /// Closed interval `[start, end]`.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }
}

/// Disjunctive label match, optionally restricted to one tier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentFilter {
    labels: BTreeSet<String>,
    tier: Option<usize>,
}

impl SegmentFilter {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            tier: None,
        }
    }

    /// Union of the named classes' symbol lists.
    pub fn from_classes(classes: &BTreeMap<String, Vec<String>>, select: &[String]) -> Result<Self> {
        let mut labels = BTreeSet::new();
        for name in select {
            let symbols = classes
                .get(name)
                .ok_or_else(|| NasalanceError::config(format!("Unknown segment class: {}", name)))?;
            labels.extend(symbols.iter().cloned());
        }
        Ok(Self { labels, tier: None })
    }

    pub fn with_tier(mut self, tier: Option<usize>) -> Self {
        self.tier = tier;
        self
    }

    pub fn matches(&self, interval: &SegmentInterval) -> bool {
        self.tier.is_none_or(|t| t == interval.tier) && self.labels.contains(interval.label.trim())
    }

    pub fn accepted<'a>(&self, intervals: &'a [SegmentInterval]) -> Vec<&'a SegmentInterval> {
        intervals.iter().filter(|i| self.matches(i)).collect()
    }
}

#[derive(Debug, Clone)]
pub struct SegmentGate {
    filter: SegmentFilter,
}

impl SegmentGate {
    pub fn new(filter: SegmentFilter) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> &SegmentFilter {
        &self.filter
    }

    /// Same times and sample count; values outside accepted spans are nulled.
    pub fn apply(&self, track: &NasalanceTrack, intervals: &[SegmentInterval]) -> NasalanceTrack {
        let spans = merge_spans(self.filter.accepted(intervals));

        let points = track
            .points
            .iter()
            .map(|p| {
                let mut p = *p;
                if !inside(&spans, p.time) {
                    p.value = None;
                }
                p
            })
            .collect();

        NasalanceTrack { points, ..track.clone() }
    }
}

/// Sorted, non-overlapping `(start, end)` spans.
fn merge_spans(intervals: Vec<&SegmentInterval>) -> Vec<(f64, f64)> {
    let mut spans: Vec<(f64, f64)> = intervals
        .into_iter()
        .filter(|i| i.start <= i.end)
        .map(|i| (i.start, i.end))
        .collect();
    spans.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut merged: Vec<(f64, f64)> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

fn inside(spans: &[(f64, f64)], time: f64) -> bool {
    let idx = spans.partition_point(|&(start, _)| start <= time);
    idx > 0 && time <= spans[idx - 1].1
}
