//! Bounded storage for the accepted path.
//!
//! Every point is kept until the buffer fills. From then on only every Nth
//! point of the stream is kept, N doubling each time the buffer fills again.
//! Point 0 is always a multiple of N, so the start survives every thinning;
//! the most recent point is held separately until the stride reaches it, so
//! the end is always present too.

use geo::{BoundingRect, Coord, LineString, Rect};
use serde::{Serialize, Serializer};
use std::sync::Arc;

use crate::types::TrackPoint;

/// Ordered, bounded, decimating point store
#[derive(Clone, Debug)]
pub struct TrackBuffer {
    capacity: usize,
    /// Keep stream index `i` iff `i % stride == 0`
    stride: u64,
    /// Points appended, kept or not
    appended: u64,
    /// `kept[k]` is stream index `k * stride`
    kept: Arc<Vec<TrackPoint>>,
    /// Latest point when the stride skipped it
    tail: Option<TrackPoint>,
}

impl TrackBuffer {
    /// `capacity` is clamped to at least 2 (start plus end).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            capacity,
            stride: 1,
            appended: 0,
            kept: Arc::new(Vec::with_capacity(capacity.min(1024))),
            tail: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current decimation factor (1 = nothing dropped yet)
    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Points appended, including those thinned away
    pub fn total_appended(&self) -> u64 {
        self.appended
    }

    /// Points currently retained
    pub fn len(&self) -> usize {
        self.kept.len() + usize::from(self.tail.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append(&mut self, point: TrackPoint) {
        let index = self.appended;
        self.appended += 1;

        if index % self.stride != 0 {
            self.tail = Some(point);
            return;
        }

        // Copy-on-write: only clones when a snapshot still holds the old path
        let kept = Arc::make_mut(&mut self.kept);
        kept.push(point);
        self.tail = None;

        // One slot stays reserved for the tail
        if kept.len() > self.capacity - 1 {
            let thinned: Vec<TrackPoint> = kept.iter().step_by(2).copied().collect();
            *kept = thinned;
            self.stride = self.stride.saturating_mul(2);

            let last_kept_index = (kept.len() as u64 - 1) * self.stride;
            if last_kept_index != index {
                self.tail = Some(point);
            }
            log::debug!(
                "Track buffer thinned to {} of {} points, stride now {}",
                self.len(),
                self.appended,
                self.stride
            );
        }
    }

    /// Immutable view of the retained path. Cheap: shares storage until the
    /// next append.
    pub fn snapshot(&self) -> TrackPath {
        TrackPath {
            kept: Arc::clone(&self.kept),
            tail: self.tail,
        }
    }
}

/// Read-only ordered path. Iterating does not consume it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackPath {
    kept: Arc<Vec<TrackPoint>>,
    tail: Option<TrackPoint>,
}

impl TrackPath {
    pub fn iter(&self) -> impl Iterator<Item = &TrackPoint> + '_ {
        self.kept.iter().chain(self.tail.iter())
    }

    pub fn len(&self) -> usize {
        self.kept.len() + usize::from(self.tail.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn first(&self) -> Option<&TrackPoint> {
        self.kept.first().or(self.tail.as_ref())
    }

    pub fn last(&self) -> Option<&TrackPoint> {
        self.tail.as_ref().or_else(|| self.kept.last())
    }

    pub fn to_vec(&self) -> Vec<TrackPoint> {
        self.iter().copied().collect()
    }

    /// Path as a `geo` line string, x = longitude, y = latitude
    pub fn to_line_string(&self) -> LineString<f64> {
        self.iter()
            .map(|p| Coord {
                x: p.longitude(),
                y: p.latitude(),
            })
            .collect()
    }

    /// Bounding box in degrees (x = longitude, y = latitude)
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.to_line_string().bounding_rect()
    }
}

impl<'a> IntoIterator for &'a TrackPath {
    type Item = &'a TrackPoint;
    type IntoIter = std::iter::Chain<
        std::slice::Iter<'a, TrackPoint>,
        std::option::Iter<'a, TrackPoint>,
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.kept.iter().chain(self.tail.iter())
    }
}

impl Serialize for TrackPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoFix;

    fn point(i: u64) -> TrackPoint {
        TrackPoint::from_fix(&GeoFix::new(0.0, i as f64 * 0.0001, i as f64))
    }

    fn fill(buffer: &mut TrackBuffer, n: u64) {
        for i in 0..n {
            buffer.append(point(i));
        }
    }

    #[test]
    fn test_keeps_everything_under_capacity() {
        let mut buffer = TrackBuffer::new(10);
        fill(&mut buffer, 9);
        assert_eq!(buffer.len(), 9);
        assert_eq!(buffer.stride(), 1);
        let path = buffer.snapshot();
        let times: Vec<f64> = path.iter().map(|p| p.timestamp()).collect();
        assert_eq!(times, (0..9).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_bounded_with_first_and_last() {
        for capacity in [2usize, 3, 7, 10, 64] {
            let mut buffer = TrackBuffer::new(capacity);
            for i in 0..5_000u64 {
                buffer.append(point(i));
                let path = buffer.snapshot();
                assert!(path.len() <= capacity, "cap {} at {}", capacity, i);
                assert_eq!(path.first().unwrap().timestamp(), 0.0);
                assert_eq!(path.last().unwrap().timestamp(), i as f64);
            }
        }
    }

    #[test]
    fn test_order_preserved_after_thinning() {
        let mut buffer = TrackBuffer::new(100);
        fill(&mut buffer, 12_345);
        let path = buffer.snapshot();
        let times: Vec<f64> = path.iter().map(|p| p.timestamp()).collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert!(buffer.stride() > 1);
        assert_eq!(buffer.total_appended(), 12_345);
    }

    #[test]
    fn test_kept_points_are_evenly_strided() {
        let mut buffer = TrackBuffer::new(10);
        fill(&mut buffer, 40);
        let stride = buffer.stride() as f64;
        let path = buffer.snapshot().to_vec();
        // Everything but a possible tail sits on the stride grid
        for p in &path[..path.len() - 1] {
            assert_eq!(p.timestamp() % stride, 0.0);
        }
    }

    #[test]
    fn test_snapshot_is_restartable_and_isolated() {
        let mut buffer = TrackBuffer::new(50);
        fill(&mut buffer, 5);
        let path = buffer.snapshot();

        let first_pass: Vec<TrackPoint> = path.iter().copied().collect();
        let second_pass: Vec<TrackPoint> = (&path).into_iter().copied().collect();
        assert_eq!(first_pass, second_pass);

        buffer.append(point(5));
        assert_eq!(path.len(), 5);
        assert_eq!(buffer.snapshot().len(), 6);
    }

    #[test]
    fn test_line_string_and_bounds() {
        let mut buffer = TrackBuffer::new(10);
        buffer.append(TrackPoint::from_fix(&GeoFix::new(40.0, -120.0, 0.0)));
        buffer.append(TrackPoint::from_fix(&GeoFix::new(40.5, -119.5, 1.0)));
        let path = buffer.snapshot();

        let line = path.to_line_string();
        assert_eq!(line.0.len(), 2);
        assert_eq!(line.0[0], Coord { x: -120.0, y: 40.0 });

        let bounds = path.bounds().unwrap();
        assert_eq!(bounds.min(), Coord { x: -120.0, y: 40.0 });
        assert_eq!(bounds.max(), Coord { x: -119.5, y: 40.5 });
        assert!(TrackPath::default().bounds().is_none());
    }

    #[test]
    fn test_serializes_as_sequence() {
        let mut buffer = TrackBuffer::new(10);
        fill(&mut buffer, 2);
        let json = serde_json::to_value(buffer.snapshot()).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[1]["timestamp"], 1.0);
    }
}
