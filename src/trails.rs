// Copyright 2025 the skytrail authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Flight trail storage and reconciliation.
//!
//! A trail is a bounded, time-ordered sequence of position samples from two
//! sources: frequent low-quality live updates, and sparse high-quality
//! waypoints from the authoritative history batch. Reconciliation merges a
//! refreshed batch into the stored trail so no time range is represented by
//! both a live sample and an authoritative one with the same timestamp,
//! while live samples without an authoritative replacement are kept.
//!
//! When a live and a historical sample carry the same timestamp, the
//! historical one wins.

use crate::coords::{geo_to_pixel, GeoPoint};
use crate::viewport::ViewportFrame;

/// Where a trail sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleSource {
    Live,
    History,
}

/// One position sample. Timestamps are unique within a trail.
#[derive(Debug, Clone, Copy)]
pub struct TrailPoint {
    pub ts: i64,
    pub lat: f64,
    pub lng: f64,
    pub altitude: Option<f64>,
    source: SampleSource,
}

impl TrailPoint {
    /// A live low-quality sample.
    #[must_use]
    pub fn live(ts: i64, lat: f64, lng: f64, altitude: Option<f64>) -> Self {
        Self { ts, lat, lng, altitude, source: SampleSource::Live }
    }

    /// An authoritative sample from a history batch.
    #[must_use]
    pub fn historical(ts: i64, lat: f64, lng: f64, altitude: Option<f64>) -> Self {
        Self { ts, lat, lng, altitude, source: SampleSource::History }
    }

    /// Whether this sample came from an authoritative history batch.
    #[must_use]
    pub fn is_high_quality(&self) -> bool {
        self.source == SampleSource::History
    }
}

/// Bounded, time-ordered trail for one tracked object.
///
/// Invariants: points are sorted ascending by unique timestamp, the
/// high-quality count covers exactly the leading run of history-sourced
/// points, and the length never exceeds the configured maximum (oldest
/// evicted first).
#[derive(Debug)]
pub struct Trail {
    points: Vec<TrailPoint>,
    hq_len: usize,
    max_len: usize,
    last_reconcile: i64,
}

impl Trail {
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        Self {
            points: Vec::new(),
            hq_len: 0,
            max_len,
            last_reconcile: -1,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub fn points(&self) -> &[TrailPoint] {
        &self.points
    }

    /// Length of the high-quality prefix.
    #[must_use]
    pub fn high_quality_len(&self) -> usize {
        self.hq_len
    }

    /// Append a live sample, keeping the trail sorted and bounded.
    /// A sample whose timestamp is already present is dropped.
    pub fn push_live(&mut self, ts: i64, lat: f64, lng: f64, altitude: Option<f64>) {
        match self.points.binary_search_by_key(&ts, |p| p.ts) {
            Ok(_) => return,
            Err(idx) => {
                self.points.insert(idx, TrailPoint::live(ts, lat, lng, altitude));
                // A live sample landing inside the prefix truncates it there.
                self.hq_len = self.hq_len.min(idx);
            }
        }
        self.evict_oldest();
    }

    /// Merge a refreshed authoritative history batch into the trail.
    ///
    /// No-op when called again before `min_interval_secs` has elapsed, or
    /// when every batch point is at or before the high-quality boundary.
    /// Batch points newer than the boundary are inserted in timestamp
    /// order; a point whose timestamp collides with a stored live sample
    /// replaces it. The high-quality prefix then extends over the leading
    /// run of history-sourced points.
    pub fn reconcile(&mut self, now: i64, history: &[TrailPoint], min_interval_secs: i64) {
        if self.last_reconcile >= 0 && now < self.last_reconcile + min_interval_secs {
            return;
        }
        self.last_reconcile = now;

        let boundary = match self.hq_len {
            0 => i64::MIN,
            n => self.points[n - 1].ts,
        };

        let mut inserted = false;
        for point in history.iter().filter(|p| p.ts > boundary) {
            let point = TrailPoint::historical(point.ts, point.lat, point.lng, point.altitude);
            match self.points.binary_search_by_key(&point.ts, |p| p.ts) {
                Ok(idx) => self.points[idx] = point,
                Err(idx) => self.points.insert(idx, point),
            }
            inserted = true;
        }

        if inserted {
            self.hq_len = self.points.iter().take_while(|p| p.is_high_quality()).count();
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) {
        while self.points.len() > self.max_len {
            self.points.remove(0);
            self.hq_len = self.hq_len.saturating_sub(1);
        }
    }

    /// Project the visible tail of the trail into viewport screen space.
    ///
    /// Walks newest to oldest and stops at the first point whose tile lies
    /// beyond the loaded grid; anything older is off-screen for this frame.
    /// Returns screen coordinates newest first, ready for a polyline.
    #[must_use]
    pub fn project_for_render(&self, frame: &ViewportFrame) -> Vec<(i64, i64)> {
        let mut out = Vec::new();
        let (cols, rows) = (i64::from(frame.grid.0), i64::from(frame.grid.1));

        for point in self.points.iter().rev() {
            let px = geo_to_pixel(GeoPoint::new(point.lat, point.lng), frame.zoom);
            let (tile_x, tile_y) = px.tile();
            if (frame.center.0 - tile_x).abs() > cols || (frame.center.1 - tile_y).abs() > rows {
                break;
            }
            let (off_x, off_y) = px.tile_offset();
            let mut sx = frame.tile_size * (tile_x - frame.center.0 + cols / 2) + off_x;
            let mut sy = frame.tile_size * (tile_y - frame.center.1 + rows / 2) + off_y;
            if frame.centerview {
                sx -= frame.offset.0;
                sy -= frame.offset.1;
            }
            out.push((sx, sy));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{pixel_to_geo, PixelPoint};

    fn frame(center: (i64, i64), offset: (i64, i64), zoom: u8, centerview: bool) -> ViewportFrame {
        ViewportFrame {
            center,
            offset,
            zoom,
            grid: (4, 4),
            tile_size: 256,
            centerview,
            reloaded: false,
        }
    }

    #[test]
    fn test_eviction_keeps_newest_sorted() {
        let mut trail = Trail::new(3);
        for ts in [100, 101, 102, 103] {
            trail.push_live(ts, 50.0, 8.0, None);
        }
        assert_eq!(trail.len(), 3);
        let stamps: Vec<i64> = trail.points().iter().map(|p| p.ts).collect();
        assert_eq!(stamps, vec![101, 102, 103]);
    }

    #[test]
    fn test_duplicate_timestamps_dropped() {
        let mut trail = Trail::new(10);
        trail.push_live(100, 50.0, 8.0, None);
        trail.push_live(100, 51.0, 9.0, None);
        assert_eq!(trail.len(), 1);
        assert_eq!(trail.points()[0].lat, 50.0);
    }

    #[test]
    fn test_out_of_order_live_samples_stay_sorted() {
        let mut trail = Trail::new(10);
        trail.push_live(102, 50.0, 8.0, None);
        trail.push_live(100, 50.0, 8.0, None);
        trail.push_live(101, 50.0, 8.0, None);
        let stamps: Vec<i64> = trail.points().iter().map(|p| p.ts).collect();
        assert_eq!(stamps, vec![100, 101, 102]);
    }

    #[test]
    fn test_initial_reconcile_seeds_history() {
        let mut trail = Trail::new(50);
        let batch = vec![
            TrailPoint::historical(10, 50.0, 8.0, Some(10000.0)),
            TrailPoint::historical(20, 50.1, 8.1, Some(11000.0)),
        ];
        trail.reconcile(1000, &batch, 60);
        assert_eq!(trail.len(), 2);
        assert_eq!(trail.high_quality_len(), 2);
    }

    #[test]
    fn test_reconcile_merges_and_keeps_unreplaced_live() {
        // Live samples at 100..102, then history arrives for 100, 101, 103.
        let mut trail = Trail::new(50);
        for ts in [100, 101, 102] {
            trail.push_live(ts, 50.0, 8.0, None);
        }
        let batch = vec![
            TrailPoint::historical(100, 50.01, 8.01, Some(9000.0)),
            TrailPoint::historical(101, 50.02, 8.02, Some(9100.0)),
            TrailPoint::historical(103, 50.04, 8.04, Some(9300.0)),
        ];
        trail.reconcile(1000, &batch, 60);

        let stamps: Vec<i64> = trail.points().iter().map(|p| p.ts).collect();
        assert_eq!(stamps, vec![100, 101, 102, 103]);
        // Live 102 has no authoritative replacement and survives; the
        // high-quality prefix therefore ends at 101.
        assert_eq!(trail.high_quality_len(), 2);
        let quality: Vec<bool> = trail.points().iter().map(TrailPoint::is_high_quality).collect();
        assert_eq!(quality, vec![true, true, false, true]);
    }

    #[test]
    fn test_reconcile_prefers_history_on_timestamp_tie() {
        let mut trail = Trail::new(50);
        trail.push_live(100, 50.0, 8.0, None);
        let batch = vec![TrailPoint::historical(100, 51.5, 9.5, Some(8000.0))];
        trail.reconcile(1000, &batch, 60);
        assert_eq!(trail.len(), 1);
        assert!(trail.points()[0].is_high_quality());
        assert_eq!(trail.points()[0].lat, 51.5);
        assert_eq!(trail.points()[0].altitude, Some(8000.0));
    }

    #[test]
    fn test_reconcile_interval_gate() {
        let mut trail = Trail::new(50);
        trail.push_live(100, 50.0, 8.0, None);
        let batch = vec![TrailPoint::historical(101, 50.1, 8.1, None)];
        trail.reconcile(1000, &batch, 60);
        assert_eq!(trail.len(), 2);

        // Within the interval a new batch is ignored entirely.
        let late = vec![TrailPoint::historical(102, 50.2, 8.2, None)];
        trail.reconcile(1030, &late, 60);
        assert_eq!(trail.len(), 2);

        // After the interval it applies.
        trail.reconcile(1060, &late, 60);
        assert_eq!(trail.len(), 3);
    }

    #[test]
    fn test_reconcile_stale_batch_is_noop() {
        let mut trail = Trail::new(50);
        let batch = vec![
            TrailPoint::historical(100, 50.0, 8.0, None),
            TrailPoint::historical(101, 50.1, 8.1, None),
        ];
        trail.reconcile(1000, &batch, 0);
        trail.push_live(102, 50.2, 8.2, None);

        // Everything at or before the boundary (101) is not fresh.
        trail.reconcile(2000, &batch, 0);
        let stamps: Vec<i64> = trail.points().iter().map(|p| p.ts).collect();
        assert_eq!(stamps, vec![100, 101, 102]);
        assert_eq!(trail.high_quality_len(), 2);
    }

    #[test]
    fn test_eviction_shrinks_high_quality_prefix() {
        let mut trail = Trail::new(3);
        let batch = vec![
            TrailPoint::historical(100, 50.0, 8.0, None),
            TrailPoint::historical(101, 50.1, 8.1, None),
            TrailPoint::historical(102, 50.2, 8.2, None),
        ];
        trail.reconcile(1000, &batch, 0);
        assert_eq!(trail.high_quality_len(), 3);

        trail.push_live(103, 50.3, 8.3, None);
        assert_eq!(trail.len(), 3);
        assert_eq!(trail.high_quality_len(), 2);
        assert_eq!(trail.points()[0].ts, 101);
    }

    #[test]
    fn test_project_stops_at_grid_boundary() {
        let zoom = 3;
        // Oldest point far outside the loaded block, newest inside it.
        let near = pixel_to_geo(PixelPoint { x: 600, y: 600 }, zoom);
        let far = pixel_to_geo(PixelPoint { x: 100, y: 1800 }, zoom);

        let mut trail = Trail::new(10);
        trail.push_live(1, far.lat, far.lng, None);
        trail.push_live(2, near.lat, near.lng, None);

        let frame = frame((2, 2), (10, 20), zoom, true);
        let screen = trail.project_for_render(&frame);
        assert_eq!(screen.len(), 1);
        assert_eq!(screen[0], (590, 580));
    }

    #[test]
    fn test_project_static_mode_skips_offset() {
        let zoom = 3;
        let near = pixel_to_geo(PixelPoint { x: 600, y: 600 }, zoom);
        let mut trail = Trail::new(10);
        trail.push_live(1, near.lat, near.lng, None);

        let frame = frame((2, 2), (10, 20), zoom, false);
        assert_eq!(trail.project_for_render(&frame), vec![(600, 600)]);
    }
}
