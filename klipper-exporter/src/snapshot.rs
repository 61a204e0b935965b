//! Per-scrape sample accumulator.

use std::collections::HashSet;

use klipper_common::Sample;
use tracing::warn;

type SeriesKey = (String, Vec<(String, String)>);

/// Samples gathered during one collection, in emission order.
///
/// A series (name plus label set) is accepted once; later samples for the
/// same series are dropped with a warning.
#[derive(Debug, Default)]
pub struct Snapshot {
    samples: Vec<Sample>,
    seen: HashSet<SeriesKey>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample, returning `false` if its series was already present.
    pub fn push(&mut self, sample: Sample) -> bool {
        let key = (sample.name.clone(), sample.labels.clone());
        if !self.seen.insert(key) {
            warn!(
                metric = %sample.name,
                labels = ?sample.labels,
                "Duplicate series in snapshot, keeping first value"
            );
            return false;
        }
        self.samples.push(sample);
        true
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}
