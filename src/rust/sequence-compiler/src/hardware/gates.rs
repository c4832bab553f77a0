// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use crate::link_list::LLEntry;
use crate::timing::{ceil_to_grid, floor_to_grid};
use crate::waveform_library::{WaveformKey, WaveformLibrary};
use crate::{Error, Result, Samples};

/// Half-open sample interval `[start, end)`.
pub(crate) type Interval = (i64, i64);

/// Shape parameters of a gate, in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GateShape {
    pub buffer: i64,
    pub min_width: i64,
    /// Edge resolution of the marker output driving the gate.
    pub grid: i64,
}

/// Append `interval`, merging it into the last one if they touch.
fn push_merged(intervals: &mut Vec<Interval>, interval: Interval) {
    if let Some(last) = intervals.last_mut()
        && interval.0 <= last.1
    {
        last.1 = last.1.max(interval.1);
        return;
    }
    intervals.push(interval);
}

/// Intervals during which the envelope played by `entries` is nonzero.
///
/// For non-hold waveforms the whole span from the first to the last nonzero
/// sample counts as high, so the gate does not chatter inside a pulse.
pub(crate) fn envelope_intervals(
    entries: &[LLEntry],
    library: &WaveformLibrary,
) -> Result<Vec<Interval>> {
    let mut intervals = vec![];
    let mut position: i64 = 0;
    for entry in entries {
        let samples = library.get(&entry.key).ok_or_else(|| {
            Error::invariant(format!("Waveform {} missing from library.", entry.key))
        })?;
        let length = entry.length as i64;
        if entry.is_hold {
            if samples.abs_at_index(0).is_some_and(|x| x != 0.0) {
                push_merged(
                    &mut intervals,
                    (position, position + entry.total_length() as i64),
                );
            }
        } else if let Some((first, last)) = samples.nonzero_span() {
            for repetition in 0..i64::from(entry.repeat) {
                let start = position + repetition * length;
                push_merged(
                    &mut intervals,
                    (start + first as i64, start + last as i64 + 1),
                );
            }
        }
        position += entry.total_length() as i64;
    }
    Ok(intervals)
}

/// Turn envelope intervals into gate high intervals within `[0, total)`.
///
/// Each high is widened by the buffer on both sides, snapped outward onto the
/// marker grid and lengthened at its tail to the minimum width. Lows between
/// highs shorter than the minimum width are closed. Leading and trailing lows
/// are kept.
pub(crate) fn shape_gate(envelope: &[Interval], shape: GateShape, total: i64) -> Vec<Interval> {
    let mut widened = vec![];
    for &(start, end) in envelope {
        let start = floor_to_grid(start - shape.buffer, shape.grid).clamp(0, total);
        let mut end = ceil_to_grid(end + shape.buffer, shape.grid).clamp(0, total);
        if end - start < shape.min_width {
            end = ceil_to_grid(start + shape.min_width, shape.grid).min(total);
        }
        if end > start {
            push_merged(&mut widened, (start, end));
        }
    }
    close_gaps(&widened, shape.min_width)
}

/// Fill every low between two highs that is shorter than `min_width`.
pub(crate) fn close_gaps(intervals: &[Interval], min_width: i64) -> Vec<Interval> {
    let mut closed: Vec<Interval> = vec![];
    for &interval in intervals {
        if let Some(last) = closed.last_mut()
            && interval.0 - last.1 < min_width
        {
            last.1 = last.1.max(interval.1);
            continue;
        }
        closed.push(interval);
    }
    closed
}

/// Logical OR of two sets of gate intervals.
pub(crate) fn union(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let mut all: Vec<Interval> = a.iter().chain(b.iter()).copied().collect();
    all.sort_unstable();
    let mut merged = vec![];
    for interval in all {
        push_merged(&mut merged, interval);
    }
    merged
}

/// Link-list entries of a marker channel that is high during `intervals`.
pub(crate) fn gate_entries(intervals: &[Interval], total: Samples, high: WaveformKey) -> Vec<LLEntry> {
    let mut entries = vec![];
    let mut position: Samples = 0;
    for &(start, end) in intervals {
        let (start, end) = (start as Samples, end as Samples);
        if start > position {
            entries.push(LLEntry::taz(start - position));
        }
        entries.push(LLEntry::new(high, end - start, true));
        position = end;
    }
    if total > position {
        entries.push(LLEntry::taz(total - position));
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link_list::total_length;
    use numeric_array::NumericArray;
    use proptest::prelude::*;
    use std::sync::Arc;

    const SHAPE: GateShape = GateShape {
        buffer: 4,
        min_width: 20,
        grid: 1,
    };

    #[test]
    fn test_envelope_of_entries() {
        let mut library = WaveformLibrary::new();
        let pulse = library.insert(Arc::new(NumericArray::Float64(vec![
            0.0, 0.0, 0.5, 0.0, 0.7, 0.0, 0.0, 0.0,
        ])));
        let hold = library.insert(Arc::new(NumericArray::Float64(vec![0.3])));
        let mut repeated = LLEntry::new(pulse, 8, false);
        repeated.repeat = 2;
        let entries = vec![
            LLEntry::taz(10),
            repeated,
            LLEntry::new(hold, 6, true),
            LLEntry::taz(4),
        ];
        let intervals = envelope_intervals(&entries, &library).unwrap();
        assert_eq!(intervals, vec![(12, 15), (20, 23), (26, 32)]);

        // a nonzero tail runs into the following hold
        let tail = library.insert(Arc::new(NumericArray::Float64(vec![0.0, 0.2, 0.2, 0.9])));
        let entries = vec![LLEntry::new(tail, 4, false), LLEntry::new(hold, 4, true)];
        assert_eq!(envelope_intervals(&entries, &library).unwrap(), vec![(1, 8)]);
    }

    #[test]
    fn test_missing_waveform() {
        let library = WaveformLibrary::new();
        let entries = vec![LLEntry::new(WaveformKey::of(&NumericArray::Float64(vec![1.0])), 4, true)];
        assert!(matches!(
            envelope_intervals(&entries, &library),
            Err(Error::Invariant(_))
        ));
    }

    #[test]
    fn test_shape_gate() {
        // buffer extends, short high is lengthened
        assert_eq!(shape_gate(&[(10, 14)], SHAPE, 100), vec![(6, 26)]);
        // clamped at the shot boundaries
        assert_eq!(shape_gate(&[(2, 40)], SHAPE, 42), vec![(0, 42)]);
        // short low is closed, long low kept
        assert_eq!(
            shape_gate(&[(10, 40), (50, 80), (200, 240)], SHAPE, 300),
            vec![(6, 84), (196, 244)]
        );
    }

    #[test]
    fn test_shape_gate_snaps_outward() {
        let shape = GateShape {
            buffer: 7,
            min_width: 0,
            grid: 4,
        };
        // [93, 131) widens to the enclosing grid points
        assert_eq!(shape_gate(&[(100, 124)], shape, 300), vec![(92, 132)]);
        // minimum width rounds up to the grid as well
        let shape = GateShape {
            buffer: 0,
            min_width: 10,
            grid: 4,
        };
        assert_eq!(shape_gate(&[(8, 10)], shape, 300), vec![(8, 20)]);
    }

    #[test]
    fn test_close_gaps() {
        let gaps = [(0, 50), (60, 110), (200, 210)];
        assert_eq!(close_gaps(&gaps, 40), vec![(0, 110), (200, 210)]);
        assert_eq!(close_gaps(&gaps, 0), gaps.to_vec());
    }

    #[test]
    fn test_union() {
        assert_eq!(
            union(&[(0, 10), (40, 50)], &[(5, 20), (60, 70)]),
            vec![(0, 20), (40, 50), (60, 70)]
        );
    }

    #[test]
    fn test_gate_entries() {
        let high = WaveformKey::of(&NumericArray::Float64(vec![1.0]));
        let entries = gate_entries(&[(0, 8), (20, 28)], 40, high);
        assert_eq!(entries.len(), 4);
        assert_eq!(total_length(&entries), 40);
        assert_eq!(entries[0].key, high);
        assert!(entries[1].is_zero());
        assert_eq!(entries[1].length, 12);
    }

    fn envelopes() -> impl Strategy<Value = Vec<Interval>> {
        prop::collection::vec((1i64..60, 1i64..30), 0..12).prop_map(|gaps| {
            let mut position = 0;
            gaps.into_iter()
                .map(|(gap, width)| {
                    let start = position + gap;
                    position = start + width;
                    (start, position)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn gate_covers_buffered_envelope(
            envelope in envelopes(),
            buffer in 0i64..10,
            min_width in 0i64..40,
            extra in 0i64..50,
            grid in prop::sample::select(vec![1i64, 2, 4]),
        ) {
            let shape = GateShape { buffer, min_width, grid };
            let total = ceil_to_grid(envelope.last().map_or(0, |iv| iv.1) + extra, grid);
            let gate = shape_gate(&envelope, shape, total);

            for window in gate.windows(2) {
                // sorted, disjoint, interior lows at least min_width
                prop_assert!(window[1].0 - window[0].1 >= min_width.max(1));
            }
            for &(start, end) in &gate {
                prop_assert!(0 <= start && start < end && end <= total);
                prop_assert!(start % grid == 0 && end % grid == 0);
                prop_assert!(end - start >= min_width || end == total);
            }
            for &(start, end) in &envelope {
                let wanted = ((start - buffer).max(0), (end + buffer).min(total));
                prop_assert!(gate.iter().any(|g| g.0 <= wanted.0 && wanted.1 <= g.1));
            }
        }
    }
}
