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

//! Flight data source boundary.
//!
//! The live polling API is an external collaborator; this module defines the
//! interface the rest of the crate consumes, the search-bounds type used for
//! relocation queries, and a CSV-backed [`ReplaySource`] that plays a
//! recorded flight back through the same interface for demos and tests.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::coords::GeoPoint;

pub type SourceError = Box<dyn std::error::Error>;

/// Current state of one tracked object as reported by the data source.
#[derive(Debug, Clone)]
pub struct FlightPosition {
    pub id: String,
    /// Epoch seconds of the sample.
    pub ts: i64,
    pub lat: f64,
    pub lng: f64,
    pub altitude_ft: f64,
    pub ground_speed_kts: f64,
    pub heading: f64,
}

/// One waypoint of an authoritative history batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub ts: i64,
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "alt")]
    pub altitude_ft: f64,
    #[serde(rename = "spd")]
    pub ground_speed_kts: f64,
    #[serde(rename = "hd")]
    pub heading: f64,
}

/// Historical waypoints for one object, ordered ascending by timestamp.
#[derive(Debug, Clone, Default)]
pub struct HistoryBatch {
    pub points: Vec<HistoryPoint>,
}

/// Geographic search window for relocation queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchBounds {
    pub north: f64,
    pub south: f64,
    pub west: f64,
    pub east: f64,
}

impl SearchBounds {
    /// A window of `tau` degrees around a location.
    #[must_use]
    pub fn around(center: GeoPoint, tau: f64) -> Self {
        Self {
            north: center.lat + tau,
            south: center.lat - tau,
            west: center.lng - tau,
            east: center.lng + tau,
        }
    }

    /// The whole-world window used as the last resort of a search.
    #[must_use]
    pub fn world() -> Self {
        Self { north: 77.879, south: -77.88, west: -180.0, east: 180.0 }
    }

    #[must_use]
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat <= self.north && lat >= self.south && lng >= self.west && lng <= self.east
    }

    /// Provider query encoding: `north,south,west,east` with 3 decimals.
    #[must_use]
    pub fn query(&self) -> String {
        format!("{:.3},{:.3},{:.3},{:.3}", self.north, self.south, self.west, self.east)
    }
}

/// The polling flight-data API, seen from this crate.
///
/// Implementations are expected to be blocking with their own timeout
/// policy; errors are treated as "nothing found this cycle" upstream.
pub trait FlightDataSource {
    /// Positions currently known inside `bounds`.
    fn fetch_current(&mut self, bounds: &SearchBounds) -> Result<Vec<FlightPosition>, SourceError>;

    /// The authoritative waypoint history for one object.
    fn fetch_history(&mut self, id: &str) -> Result<HistoryBatch, SourceError>;
}

/// Write a history batch as `ts,lat,lng,alt,spd,hd` CSV.
pub fn export_history_csv(path: &Path, batch: &HistoryBatch) -> Result<(), SourceError> {
    let mut writer = csv::Writer::from_path(path)?;
    for point in &batch.points {
        writer.serialize(point)?;
    }
    writer.flush()?;
    Ok(())
}

/// Replays a recorded `ts,lat,lng,alt,spd,hd` CSV flight through the
/// [`FlightDataSource`] interface, one waypoint per poll.
#[derive(Debug)]
pub struct ReplaySource {
    id: String,
    points: Vec<HistoryPoint>,
    cursor: usize,
}

impl ReplaySource {
    pub fn from_path(id: &str, path: &Path) -> Result<Self, SourceError> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut points = Vec::new();
        for record in reader.deserialize() {
            let point: HistoryPoint = record?;
            points.push(point);
        }
        points.sort_by_key(|p| p.ts);
        Ok(Self { id: id.to_string(), points, cursor: 0 })
    }

    /// Whether the recording has been fully replayed.
    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.cursor >= self.points.len()
    }
}

impl FlightDataSource for ReplaySource {
    fn fetch_current(&mut self, bounds: &SearchBounds) -> Result<Vec<FlightPosition>, SourceError> {
        let Some(point) = self.points.get(self.cursor) else {
            return Ok(Vec::new());
        };
        if !bounds.contains(point.lat, point.lng) {
            return Ok(Vec::new());
        }
        self.cursor += 1;
        Ok(vec![FlightPosition {
            id: self.id.clone(),
            ts: point.ts,
            lat: point.lat,
            lng: point.lng,
            altitude_ft: point.altitude_ft,
            ground_speed_kts: point.ground_speed_kts,
            heading: point.heading,
        }])
    }

    fn fetch_history(&mut self, _id: &str) -> Result<HistoryBatch, SourceError> {
        // Everything replayed so far counts as authoritative history.
        Ok(HistoryBatch { points: self.points[..self.cursor].to_vec() })
    }
}
