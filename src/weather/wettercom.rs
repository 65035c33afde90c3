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

//! wetter.com precipitation radar and cloud cover client.
//!
//! Both products need a discovery call before tile fetches: the radar status
//! endpoint lists time-bucketed tileset identifiers, and the cloud index
//! lists per-run tile URL templates. Radar rasters come double-resolution
//! (512x512 covering a 2x2 tile block), so requests address the parent tile
//! at `(x/2, y/2, z-1)` and the caller crops the quadrant it needs.
//!
//! Every fetched raster is cached on disk keyed by its time bucket; fetch or
//! decode failures return `None` so the overlay is simply omitted.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use image::RgbaImage;
use log::warn;
use serde::Deserialize;

const RADAR_BASE_URL: &str = "https://d3q1in6xcpf6ou.cloudfront.net";
const RADAR_STATUS_URL: &str =
    "https://d3q1in6xcpf6ou.cloudfront.net/status/radar/composite_snow/status.json";
const CLOUD_INDEX_URL: &str = "https://www.wetter.com/agt/wetterkarten/tiles/icon_clouds/minimal";
const CLOUD_ASSET_BASE_URL: &str = "https://ct3.wettercomassets.com/";
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/112.0";

/// Radar frames are published on a 5-minute grid.
pub const RADAR_BUCKET_SECONDS: i64 = 300;

/// Cloud runs are published hourly.
const CLOUD_BUCKET_SECONDS: i64 = 3600;

/// Snap an epoch timestamp to the radar provider's 5-minute granularity.
#[must_use]
pub fn radar_bucket(ts: i64) -> i64 {
    ts - ts.rem_euclid(RADAR_BUCKET_SECONDS)
}

/// Parent tile address for the double-resolution radar raster covering
/// `(x, y)` at `zoom`.
#[must_use]
pub fn radar_parent_tile(x: i64, y: i64, zoom: u8) -> (i64, i64, u8) {
    (x.div_euclid(2), y.div_euclid(2), zoom.saturating_sub(1))
}

#[derive(Debug, Deserialize)]
struct RadarStatus {
    timesteps: Vec<RadarTimestep>,
}

#[derive(Debug, Deserialize)]
struct RadarTimestep {
    tiles: String,
}

#[derive(Debug, Deserialize)]
struct CloudIndex {
    runs: Vec<CloudRun>,
}

#[derive(Debug, Deserialize)]
struct CloudRun {
    timesteps: Vec<CloudTimestep>,
}

#[derive(Debug, Deserialize)]
struct CloudTimestep {
    date: String,
    tile_url: String,
}

/// Pick the newest real-radar tileset from a status payload.
///
/// Tileset ids end in a 12-digit datetime stamp; entries that are not
/// `radar*` products (forecast layers) are skipped.
fn select_radar_tileset(timesteps: &[RadarTimestep]) -> Option<(String, String)> {
    let mut newest: Option<(i64, &RadarTimestep)> = None;
    for step in timesteps {
        if !step.tiles.starts_with("radar") || step.tiles.len() < 12 {
            continue;
        }
        let stamp = &step.tiles[step.tiles.len() - 12..];
        let Ok(dt) = stamp.parse::<i64>() else {
            continue;
        };
        if newest.is_none_or(|(best, _)| dt > best) {
            newest = Some((dt, step));
        }
    }
    newest.map(|(dt, step)| (step.tiles.clone(), format!("{dt:012}")))
}

/// Substitute tile coordinates into a provider URL template.
fn fill_tile_template(template: &str, x: i64, y: i64, zoom: u8) -> String {
    template
        .replace("{z}", &zoom.to_string())
        .replace("{x}", &x.to_string())
        .replace("{y}", &y.to_string())
}

/// Client for the wetter.com radar and cloud tile services.
#[derive(Debug)]
pub struct WetterComClient {
    http: reqwest::blocking::Client,
    cache_dir: PathBuf,
    locale_lang: String,
    locale_country: String,
    // Last radar bucket a tileset was resolved for; -1 forces discovery.
    radar_ts: i64,
    radar_tileset: Option<String>,
    radar_datetime: String,
    cloud_url: Option<String>,
    cloud_ts: i64,
    // Hour bucket of the last discovery attempt, successful or not.
    cloud_attempt_ts: i64,
}

impl WetterComClient {
    pub fn new(cache_dir: PathBuf, timeout: Duration) -> Result<Self, Box<dyn std::error::Error>> {
        fs::create_dir_all(&cache_dir)?;
        let http = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            cache_dir,
            locale_lang: "en".to_string(),
            locale_country: "GB".to_string(),
            radar_ts: -1,
            radar_tileset: None,
            radar_datetime: Utc::now().format("%Y%m%d%H00").to_string(),
            cloud_url: None,
            cloud_ts: 0,
            cloud_attempt_ts: -1,
        })
    }

    pub fn set_locale(&mut self, lang: &str, country: &str) {
        self.locale_lang = lang.to_string();
        self.locale_country = country.to_string();
    }

    fn accept_language(&self) -> String {
        format!("{}-{};q=0.7,en;q=0.3", self.locale_lang, self.locale_country)
    }

    fn fetch(&self, url: &str, accept: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let response = self
            .http
            .get(url)
            .header("accept", accept)
            .header("accept-language", self.accept_language())
            .header("user-agent", USER_AGENT)
            .send()?;
        if !response.status().is_success() {
            return Err(format!("HTTP {} for {url}", response.status()).into());
        }
        Ok(response.bytes()?.to_vec())
    }

    /// Load a cached raster, or fetch it and write it through the cache.
    /// Returns `None` when the provider or decoder fails.
    fn cached_image(&self, filename: &str, url: &str) -> Option<RgbaImage> {
        let path = self.cache_dir.join(filename);
        let bytes = if path.exists() {
            fs::read(&path).ok()?
        } else {
            let bytes = match self.fetch(url, "*/*") {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Weather raster fetch failed: {e}");
                    return None;
                }
            };
            // Concurrent writers on the same bucket are harmless; last one wins.
            if let Err(e) = fs::write(&path, &bytes) {
                warn!("Failed to cache weather raster {}: {e}", path.display());
            }
            bytes
        };
        match image::load_from_memory(&bytes) {
            Ok(img) => Some(img.to_rgba8()),
            Err(e) => {
                warn!("Failed to decode weather raster {filename}: {e}");
                None
            }
        }
    }

    /// Resolve the radar tileset for the given 5-minute bucket.
    ///
    /// Discovery runs only when the bucket differs from the last resolved
    /// one. Returns whether a real-radar tileset is currently known.
    pub fn refresh_radar_tileset(&mut self, bucket: i64) -> bool {
        if self.radar_ts == bucket {
            return self.radar_tileset.is_some();
        }
        let status: RadarStatus = match self
            .fetch(RADAR_STATUS_URL, "*/*")
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(Into::into))
        {
            Ok(status) => status,
            Err(e) => {
                warn!("Radar status discovery failed: {e}");
                return self.radar_tileset.is_some();
            }
        };
        if let Some((tileset, datetime)) = select_radar_tileset(&status.timesteps) {
            self.radar_tileset = Some(tileset);
            self.radar_datetime = datetime;
            self.radar_ts = bucket;
            true
        } else {
            self.radar_tileset.is_some()
        }
    }

    /// Fetch the double-resolution (512x512) radar raster covering the tile
    /// pair that contains `(x, y)` at `zoom`.
    pub fn radar_image(&self, x: i64, y: i64, zoom: u8, bucket: i64) -> Option<RgbaImage> {
        let (px, py, pz) = radar_parent_tile(x, y, zoom);
        let url = match &self.radar_tileset {
            Some(tileset) => format!("{RADAR_BASE_URL}/{tileset}/{pz}/{px}/{py}"),
            None => {
                let now = Utc.timestamp_opt(bucket, 0).single()?.format("%Y%m%d%H%M");
                format!(
                    "{RADAR_BASE_URL}/nearcast/composite_ng_snow/{}/{now}/{pz}/{px}/{py}",
                    self.radar_datetime
                )
            }
        };
        self.cached_image(&format!("radar_{bucket},{pz},{px},{py}.dat"), &url)
    }

    /// Refresh the cloud tile URL template for the current hour bucket.
    pub fn update_cloud_url(&mut self, now: i64) {
        let bucket = now - now.rem_euclid(CLOUD_BUCKET_SECONDS);
        let index: CloudIndex = match self
            .fetch(CLOUD_INDEX_URL, "application/json, text/plain, */*")
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(Into::into))
        {
            Ok(index) => index,
            Err(e) => {
                warn!("Cloud index discovery failed: {e}");
                self.cloud_url = None;
                return;
            }
        };
        let Some(stamp) = Utc.timestamp_opt(bucket, 0).single() else {
            self.cloud_url = None;
            return;
        };
        let wanted = format!("{}+00:00", stamp.format("%Y-%m-%dT%H:%M:%S"));
        self.cloud_url = index
            .runs
            .first()
            .and_then(|run| run.timesteps.iter().find(|step| step.date == wanted))
            .map(|step| format!("{CLOUD_ASSET_BASE_URL}{}", step.tile_url));
        if self.cloud_url.is_some() {
            self.cloud_ts = bucket;
        }
    }

    /// Refresh the cloud URL template at most once per hour bucket.
    pub fn ensure_cloud_url(&mut self, now: i64) {
        let bucket = now - now.rem_euclid(CLOUD_BUCKET_SECONDS);
        if self.cloud_attempt_ts == bucket {
            return;
        }
        self.cloud_attempt_ts = bucket;
        self.update_cloud_url(now);
    }

    /// Fetch the cloud cover raster for a tile. Requires a prior successful
    /// [`update_cloud_url`](Self::update_cloud_url).
    pub fn cloud_image(&self, x: i64, y: i64, zoom: u8) -> Option<RgbaImage> {
        let Some(template) = &self.cloud_url else {
            warn!("Cloud tile requested before the cloud URL was resolved");
            return None;
        };
        let url = fill_tile_template(template, x, y, zoom);
        self.cached_image(&format!("clouds_{},{zoom},{x},{y}.dat", self.cloud_ts), &url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radar_bucket_snaps_to_five_minutes() {
        assert_eq!(radar_bucket(1700000299), 1700000100);
        assert_eq!(radar_bucket(1700000100), 1700000100);
        assert_eq!(radar_bucket(0), 0);
    }

    #[test]
    fn test_radar_parent_tile() {
        assert_eq!(radar_parent_tile(10, 7, 12), (5, 3, 11));
        assert_eq!(radar_parent_tile(11, 6, 12), (5, 3, 11));
        assert_eq!(radar_parent_tile(0, 0, 0), (0, 0, 0));
    }

    #[test]
    fn test_select_radar_tileset_picks_newest() {
        let status: RadarStatus = serde_json::from_str(
            r#"{"timesteps": [
                {"tiles": "nearcast/composite_ng_snow/202608051000/202608051030"},
                {"tiles": "radar/composite_snow/202608050955"},
                {"tiles": "radar/composite_snow/202608051010"},
                {"tiles": "radar/composite_snow/202608051005"}
            ]}"#,
        )
        .unwrap();
        let (tileset, datetime) = select_radar_tileset(&status.timesteps).unwrap();
        assert_eq!(tileset, "radar/composite_snow/202608051010");
        assert_eq!(datetime, "202608051010");
    }

    #[test]
    fn test_select_radar_tileset_ignores_non_radar() {
        let steps = vec![RadarTimestep {
            tiles: "nearcast/composite_ng_snow/202608051000".to_string(),
        }];
        assert!(select_radar_tileset(&steps).is_none());
    }

    #[test]
    fn test_fill_tile_template() {
        let url = fill_tile_template("https://example.com/a/{z}/{x}/{y}.png", 34, 21, 7);
        assert_eq!(url, "https://example.com/a/7/34/21.png");
    }
}
