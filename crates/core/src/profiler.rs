//! Timeline reconstruction and tag-pair interval statistics.
//!
//! Records arrive in capture order and are appended to a timeline. The
//! timeline is partitioned into segments of strictly successive sequence
//! numbers; a gap means the RTT buffer dropped frames, and intervals are
//! never measured across one. Within each segment, configured tag pairs
//! are matched greedily (latest unmatched start before each end) and the
//! cycle deltas converted to milliseconds.

use crate::error::{Error, Result};
use crate::record::Record;
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use tracing::{debug, warn};

/// Counter frequency of the reference configuration, in Hz.
pub const DEFAULT_RECORD_FREQUENCY_HZ: u32 = 64_000;

/// A tag pair defining an interval measurement.
///
/// Equal endpoints form a self-pair: consecutive occurrences of the tag are
/// measured as a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelativeMeasure {
    pub start_tag: u16,
    pub end_tag: u16,
}

impl RelativeMeasure {
    pub fn new(start_tag: u16, end_tag: u16) -> Self {
        Self { start_tag, end_tag }
    }
}

impl fmt::Display for RelativeMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.start_tag, self.end_tag)
    }
}

/// Summary statistics for one measure, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasureStats {
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub samples: usize,
}

/// Sequence discontinuity report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapReport {
    /// Number of discontinuities observed.
    pub count: usize,
    /// Expected seq_number at the first discontinuity.
    pub first_expected: u16,
    /// Observed seq_number at the first discontinuity.
    pub first_actual: u16,
}

impl fmt::Display for GapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, actual {}", self.first_expected, self.first_actual)
    }
}

/// Profiler construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct ProfilerConfig {
    /// Cycle counter rate used for millisecond conversion.
    pub record_frequency_hz: u32,
    /// Tag whose first record (at seq 0) marks device boot, if any.
    pub boot_tag: Option<u16>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            record_frequency_hz: DEFAULT_RECORD_FREQUENCY_HZ,
            boot_tag: None,
        }
    }
}

/// Append-only record timeline with interval statistics.
pub struct Profiler {
    config: ProfilerConfig,
    measures: Vec<RelativeMeasure>,
    timeline: Vec<Record>,
    // Populated by process(); cycle deltas per measure.
    deltas: HashMap<RelativeMeasure, Vec<u32>>,
    gaps: Option<GapReport>,
    startup_ms: Option<f64>,
}

impl Profiler {
    /// Create a profiler. A zero counter frequency is rejected before any
    /// record is accepted.
    pub fn new(config: ProfilerConfig) -> Result<Self> {
        if config.record_frequency_hz == 0 {
            return Err(Error::OutOfRange {
                field: "record_frequency_hz",
                value: 0,
                min: 1,
                max: u32::MAX as u64,
            });
        }
        Ok(Self {
            config,
            measures: Vec::new(),
            timeline: Vec::new(),
            deltas: HashMap::new(),
            gaps: None,
            startup_ms: None,
        })
    }

    /// Register a measure. Duplicates are collapsed.
    pub fn add_measure(&mut self, measure: RelativeMeasure) {
        if !self.measures.contains(&measure) {
            self.measures.push(measure);
        }
    }

    /// Append records to the timeline, preserving order.
    pub fn add(&mut self, records: &[Record]) {
        self.timeline.extend_from_slice(records);
    }

    /// Number of records on the timeline.
    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    /// Segment the timeline and (re)compute all interval samples.
    ///
    /// Safe to call repeatedly; the result reflects the full timeline each
    /// time. An empty timeline or a measure with no matchable pair is not an
    /// error; it surfaces as `None` from [`stats`](Profiler::stats).
    pub fn process(&mut self) {
        self.deltas.clear();
        self.gaps = None;
        self.startup_ms = None;

        let segments = self.segment();
        if segments.len() > 1 {
            warn!(gaps = segments.len() - 1, "sequence gaps in capture");
        }

        for measure in self.measures.clone() {
            let mut deltas = Vec::new();
            for segment in &segments {
                self.match_pairs(&measure, segment.clone(), &mut deltas);
            }
            debug!(measure = %measure, samples = deltas.len(), "measure processed");
            self.deltas.insert(measure, deltas);
        }

        if let (Some(boot_tag), Some(first)) = (self.config.boot_tag, self.timeline.first()) {
            if first.seq_number == 0 && first.tag == boot_tag {
                self.startup_ms = Some(self.cycles_to_ms(first.cycles));
            }
        }
    }

    /// Statistics for a measure, or `None` when it produced no samples.
    pub fn stats(&self, measure: RelativeMeasure) -> Option<MeasureStats> {
        let deltas = self.deltas.get(&measure)?;
        if deltas.is_empty() {
            return None;
        }
        let ms: Vec<f64> = deltas.iter().map(|&d| self.cycles_to_ms(d)).collect();
        let min_ms = ms.iter().copied().fold(f64::INFINITY, f64::min);
        let max_ms = ms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean_ms = ms.iter().sum::<f64>() / ms.len() as f64;
        Some(MeasureStats {
            min_ms,
            max_ms,
            mean_ms,
            samples: ms.len(),
        })
    }

    /// Registered measures, in registration order.
    pub fn measures(&self) -> &[RelativeMeasure] {
        &self.measures
    }

    /// Sequence gap report from the last [`process`](Profiler::process),
    /// `None` when the capture was contiguous.
    pub fn gap_report(&self) -> Option<GapReport> {
        self.gaps
    }

    /// Boot-to-first-event time, when the first record carried seq 0 and the
    /// configured boot tag.
    pub fn startup_ms(&self) -> Option<f64> {
        self.startup_ms
    }

    fn cycles_to_ms(&self, cycles: u32) -> f64 {
        cycles as f64 * 1000.0 / self.config.record_frequency_hz as f64
    }

    /// Split the timeline into contiguous-sequence index ranges, recording
    /// the first discontinuity.
    fn segment(&mut self) -> Vec<Range<usize>> {
        let mut segments = Vec::new();
        if self.timeline.is_empty() {
            return segments;
        }

        let mut start = 0;
        let mut gap_count = 0;
        let mut first_gap = None;
        for i in 1..self.timeline.len() {
            let expected = self.timeline[i - 1].next_seq();
            let actual = self.timeline[i].seq_number;
            if actual != expected {
                gap_count += 1;
                first_gap.get_or_insert((expected, actual));
                segments.push(start..i);
                start = i;
            }
        }
        segments.push(start..self.timeline.len());

        if let Some((first_expected, first_actual)) = first_gap {
            self.gaps = Some(GapReport {
                count: gap_count,
                first_expected,
                first_actual,
            });
        }
        segments
    }

    /// Greedy pairing within one segment: each end consumes the latest
    /// unmatched start before it. For a self-pair, every occurrence closes
    /// the previous one and opens the next, so adjacent occurrences form
    /// periods. Unmatched starts and orphan ends are discarded.
    fn match_pairs(&self, measure: &RelativeMeasure, segment: Range<usize>, out: &mut Vec<u32>) {
        let mut open: Vec<usize> = Vec::new();
        for j in segment {
            let tag = self.timeline[j].tag;
            if tag == measure.end_tag {
                if let Some(i) = open.pop() {
                    out.push(self.timeline[j].cycles.wrapping_sub(self.timeline[i].cycles));
                }
            }
            if tag == measure.start_tag {
                open.push(j);
            }
        }
    }
}
