// src/route/segment.rs
//! Splitting a recorded fix list into trip segments at return-to-station events

use crate::track::sample::PositionSample;

/// A contiguous slice of an assignment's fixes between two return events.
/// Derived data: never persisted, always rebuilt from the fixes and markers.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub fixes: Vec<PositionSample>,
    /// Cyclic palette slot for map drawing; presentation hint only.
    /// Numbered over emitted segments, so a marker interval containing no
    /// fixes does not consume a palette slot.
    pub color_index: usize,
}

/// Partition `fixes` into segments at the return markers.
///
/// Markers split time into `(-inf, t0], (t0, t1], ..., (tn, +inf)`; a fix
/// whose timestamp equals a marker's closes the earlier interval. With no
/// markers the whole fix list is one segment. Intervals without any fix
/// produce no segment. Concatenating the returned segments reproduces the
/// input order exactly.
pub fn split_segments(
    fixes: &[PositionSample],
    return_markers: &[PositionSample],
    palette_size: usize,
) -> Vec<Segment> {
    let palette_size = palette_size.max(1);
    let mut segments = Vec::new();
    let mut current: Vec<PositionSample> = Vec::new();
    let mut marker_idx = 0;

    for fix in fixes {
        // Advance past every marker interval this fix has left behind.
        // Strict "<" keeps a fix at exactly the marker timestamp in the
        // closing interval.
        while marker_idx < return_markers.len()
            && return_markers[marker_idx].timestamp_utc < fix.timestamp_utc
        {
            marker_idx += 1;
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
        }
        current.push(fix.clone());
    }
    if !current.is_empty() {
        segments.push(current);
    }

    segments
        .into_iter()
        .enumerate()
        .map(|(i, fixes)| Segment {
            fixes,
            color_index: i % palette_size,
        })
        .collect()
}

/// Index of the segment containing the fix at `fix_index` of the original
/// list, assuming the segments came from that list in order
pub fn segment_index_of(segments: &[Segment], fix_index: usize) -> Option<usize> {
    let mut offset = 0;
    for (i, segment) in segments.iter().enumerate() {
        offset += segment.fixes.len();
        if fix_index < offset {
            return Some(i);
        }
    }
    None
}
