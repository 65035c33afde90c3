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

//! Per-object follow cycle: locate, record, reconcile, reproject.
//!
//! Each tracked object runs its own cooperative, timer-driven step; sessions
//! share nothing but the on-disk tile cache, so one failing cycle cannot
//! affect another. A lost object is searched for with an expanding window —
//! an explicit, bounded sequence of radii ending in a whole-world query —
//! and declared offline after enough consecutive misses.

use std::collections::HashMap;
use std::time::Duration;

use log::{info, warn};

use crate::coords::{geo_to_pixel, GeoPoint};
use crate::flightdata::{FlightDataSource, FlightPosition, HistoryBatch, SearchBounds};
use crate::tiles::TileStore;
use crate::trails::{Trail, TrailPoint};
use crate::viewport::{ViewportFrame, ViewportMapper};

// Expanding-search parameters: radii grow geometrically from the last known
// location, then one whole-world attempt. The step cap bounds the loop even
// if the radius sequence is misconfigured.
const SEARCH_INITIAL_TAU: f64 = 0.01;
const SEARCH_GROWTH: f64 = 8.0;
const SEARCH_MAX_TAU: f64 = 10.0;
const MAX_SEARCH_STEPS: u32 = 8;

// A session is abandoned after this many consecutive lost cycles.
const MAX_LOST_CYCLES: u32 = 10;

const FEET_PER_KM: f64 = 3281.0;

/// Zoom level derived from flight altitude and ground speed: high and fast
/// zooms out, low and slow zooms in.
#[must_use]
pub fn auto_zoom(altitude_ft: f64, ground_speed_kts: f64) -> u8 {
    let alt_km = altitude_ft / FEET_PER_KM;
    let mut zoom = ((16.0 / (alt_km + 2.0) + 8.0).trunc() as i64).max(8);
    zoom += ((18.0 - ground_speed_kts).trunc() as i64).div_euclid(10).max(0);
    zoom.clamp(0, 20) as u8
}

/// Converts a history batch into trail points for reconciliation.
fn history_to_trail(batch: &HistoryBatch) -> Vec<TrailPoint> {
    batch
        .points
        .iter()
        .map(|p| TrailPoint::historical(p.ts, p.lat, p.lng, Some(p.altitude_ft)))
        .collect()
}

/// Wall-clock pacing for a timer-driven step loop.
///
/// The next delay is the step interval minus the time the step took,
/// floored at 10ms; when processing latency eats a whole interval the
/// anchor resynchronizes to the current time instead of accumulating debt.
#[derive(Debug)]
pub struct Pacer {
    anchor: f64,
}

impl Pacer {
    #[must_use]
    pub fn new(start: f64) -> Self {
        Self { anchor: start }
    }

    pub fn next_delay(&mut self, current: f64, interval: f64) -> Duration {
        let remaining = interval - (current - self.anchor);
        if remaining < 0.010 {
            self.anchor = current;
            Duration::from_millis(10)
        } else {
            self.anchor += interval;
            Duration::from_secs_f64(remaining)
        }
    }
}

/// Result of one follow step.
#[derive(Debug)]
pub struct StepOutcome {
    pub online: bool,
    pub position: Option<FlightPosition>,
    pub frame: Option<ViewportFrame>,
    /// Trail polyline in screen coordinates, newest first.
    pub trail_screen: Vec<(i64, i64)>,
    pub marker: (i64, i64),
}

/// Follows a single object: keeps its trail reconciled and its viewport
/// centered, degrading gracefully when the data source loses it.
#[derive(Debug)]
pub struct FollowSession<S: FlightDataSource> {
    id: String,
    source: S,
    store: TileStore,
    mapper: ViewportMapper,
    trail: Trail,
    last_loc: GeoPoint,
    last_position: Option<(f64, f64)>,
    lost_count: u32,
    online: bool,
    reconcile_interval_secs: i64,
}

impl<S: FlightDataSource> FollowSession<S> {
    pub fn new(
        id: &str,
        source: S,
        store: TileStore,
        mapper: ViewportMapper,
        max_trail: usize,
        reconcile_interval_secs: i64,
        home: GeoPoint,
    ) -> Self {
        Self {
            id: id.to_string(),
            source,
            store,
            mapper,
            trail: Trail::new(max_trail),
            last_loc: home,
            last_position: None,
            lost_count: 0,
            online: false,
            reconcile_interval_secs,
        }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Whether the object has been lost for so long the session should end.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.lost_count >= MAX_LOST_CYCLES
    }

    #[must_use]
    pub fn trail(&self) -> &Trail {
        &self.trail
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[must_use]
    pub fn store(&self) -> &TileStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TileStore {
        &mut self.store
    }

    /// Merged history of the trail, for export.
    #[must_use]
    pub fn history(&self) -> Vec<TrailPoint> {
        self.trail.points().to_vec()
    }

    /// Search for the object around its last known location, widening the
    /// window each miss up to one whole-world attempt.
    fn locate(&mut self) -> Option<FlightPosition> {
        let mut tau = SEARCH_INITIAL_TAU;
        for _ in 0..MAX_SEARCH_STEPS {
            let bounds = if tau < 0.0 {
                SearchBounds::world()
            } else {
                SearchBounds::around(self.last_loc, tau)
            };
            let positions = match self.source.fetch_current(&bounds) {
                Ok(positions) => positions,
                Err(e) => {
                    warn!("Position query failed for {}: {e}", self.id);
                    Vec::new()
                }
            };
            if let Some(position) = positions.into_iter().find(|p| p.id == self.id) {
                return Some(position);
            }
            if tau < 0.0 {
                return None;
            }
            tau = if tau < SEARCH_MAX_TAU { tau * SEARCH_GROWTH } else { -1.0 };
        }
        None
    }

    /// Run one update cycle at epoch second `now`.
    pub fn step(&mut self, now: i64) -> StepOutcome {
        let Some(position) = self.locate() else {
            self.online = false;
            self.lost_count += 1;
            if self.is_abandoned() {
                info!("Object {} turned offline, giving up", self.id);
            }
            return StepOutcome {
                online: false,
                position: None,
                frame: self.mapper.frame(),
                trail_screen: Vec::new(),
                marker: self.mapper.marker_screen_position(),
            };
        };

        self.online = true;
        self.lost_count = 0;
        self.last_loc = GeoPoint::new(position.lat, position.lng);

        // Identical consecutive reports carry no new information.
        if self.last_position != Some((position.lat, position.lng)) {
            self.trail
                .push_live(position.ts, position.lat, position.lng, Some(position.altitude_ft));
            self.last_position = Some((position.lat, position.lng));
        }

        // A failed history fetch skips reconciliation for this cycle; the
        // stored trail is left untouched.
        match self.source.fetch_history(&self.id) {
            Ok(batch) => {
                self.trail.reconcile(now, &history_to_trail(&batch), self.reconcile_interval_secs);
            }
            Err(e) => warn!("History fetch failed for {}, skipping reconcile: {e}", self.id),
        }

        let zoom = auto_zoom(position.altitude_ft, position.ground_speed_kts);
        let px = geo_to_pixel(self.last_loc, zoom);
        let frame = self.mapper.update(&mut self.store, px.x, px.y, zoom, false);
        let trail_screen = self.trail.project_for_render(&frame);

        StepOutcome {
            online: true,
            position: Some(position),
            frame: Some(frame),
            trail_screen,
            marker: self.mapper.marker_screen_position(),
        }
    }
}

/// Registry of trails for all objects visible in an area, with
/// timeout-based eviction of objects that stopped reporting.
#[derive(Debug)]
pub struct Fleet {
    objects: HashMap<String, TrackedObject>,
    max_age_secs: i64,
    max_trail: usize,
}

#[derive(Debug)]
struct TrackedObject {
    trail: Trail,
    last_seen: i64,
}

impl Fleet {
    #[must_use]
    pub fn new(max_age_secs: i64, max_trail: usize) -> Self {
        Self { objects: HashMap::new(), max_age_secs, max_trail }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn record(&mut self, now: i64, position: &FlightPosition) {
        let object = self
            .objects
            .entry(position.id.clone())
            .or_insert_with(|| TrackedObject { trail: Trail::new(self.max_trail), last_seen: now });
        object.last_seen = now;
        object.trail.push_live(position.ts, position.lat, position.lng, Some(position.altitude_ft));
    }

    #[must_use]
    pub fn trail(&self, id: &str) -> Option<&Trail> {
        self.objects.get(id).map(|o| &o.trail)
    }

    /// Drop objects not seen within the age limit; returns how many went.
    pub fn evict_stale(&mut self, now: i64) -> usize {
        let before = self.objects.len();
        self.objects.retain(|_, o| now - o.last_seen < self.max_age_secs);
        before - self.objects.len()
    }
}
