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

//! Application configuration management.
//!
//! Persistent TOML configuration via confy: home location, map grid and
//! style, overlay toggles, trail bounds, and update pacing. Every field has
//! a serde default so partial files load cleanly.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::coords::GeoPoint;
use crate::tiles::{MapStyle, TileStyle};

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    /// Home latitude in degrees
    #[serde(default = "default_home_latitude")]
    pub home_latitude: f64,

    /// Home longitude in degrees
    #[serde(default = "default_home_longitude")]
    pub home_longitude: f64,

    /// Initial map zoom level
    #[serde(default = "default_zoom")]
    pub zoom: u8,

    /// Tile grid width in tiles
    #[serde(default = "default_grid")]
    pub grid_cols: u32,

    /// Tile grid height in tiles
    #[serde(default = "default_grid")]
    pub grid_rows: u32,

    /// Base map style: "terrain", "satellite", or "roadmap"
    #[serde(default = "default_basemap")]
    pub basemap: String,

    /// Composite the roadmap layer over the base map
    #[serde(default)]
    pub roadmap_overlay: bool,

    /// Base map brightness factor (0.0 - 1.0)
    #[serde(default = "default_brightness")]
    pub brightness: f32,

    /// Pin the tracked object to the screen center and scroll the map
    #[serde(default = "default_true")]
    pub centerview: bool,

    /// Maximum number of trail points kept per object
    #[serde(default = "default_max_trail")]
    pub max_trail: usize,

    /// Locale language for provider localization (e.g. "en")
    #[serde(default = "default_locale_lang")]
    pub locale_lang: String,

    /// Locale country for provider localization (e.g. "GB")
    #[serde(default = "default_locale_country")]
    pub locale_country: String,

    /// Show the precipitation radar overlay
    #[serde(default)]
    pub enable_rain_radar: bool,

    /// Show the cloud cover overlay
    #[serde(default)]
    pub enable_cloud_radar: bool,

    /// Seconds between update cycles while the object is online
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: f64,

    /// Seconds between update cycles while the object is lost
    #[serde(default = "default_lost_interval")]
    pub lost_interval_secs: f64,

    /// Minimum seconds between trail reconciliations
    #[serde(default)]
    pub reconcile_interval_secs: i64,

    /// Seconds after which an unseen tracked object is evicted
    #[serde(default = "default_max_object_age")]
    pub max_object_age_secs: i64,

    /// Timeout for each provider request in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

// Default value functions for serde
fn default_home_latitude() -> f64 {
    52.5162767
}

fn default_home_longitude() -> f64 {
    13.3777761
}

fn default_zoom() -> u8 {
    10
}

fn default_grid() -> u32 {
    4
}

fn default_basemap() -> String {
    "terrain".to_string()
}

fn default_brightness() -> f32 {
    0.4
}

fn default_true() -> bool {
    true
}

fn default_max_trail() -> usize {
    100
}

fn default_locale_lang() -> String {
    "en".to_string()
}

fn default_locale_country() -> String {
    "GB".to_string()
}

fn default_update_interval() -> f64 {
    3.2
}

fn default_lost_interval() -> f64 {
    15.0
}

fn default_max_object_age() -> i64 {
    900
}

fn default_http_timeout() -> u64 {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            home_latitude: default_home_latitude(),
            home_longitude: default_home_longitude(),
            zoom: default_zoom(),
            grid_cols: default_grid(),
            grid_rows: default_grid(),
            basemap: default_basemap(),
            roadmap_overlay: false,
            brightness: default_brightness(),
            centerview: true,
            max_trail: default_max_trail(),
            locale_lang: default_locale_lang(),
            locale_country: default_locale_country(),
            enable_rain_radar: false,
            enable_cloud_radar: false,
            update_interval_secs: default_update_interval(),
            lost_interval_secs: default_lost_interval(),
            reconcile_interval_secs: 0,
            max_object_age_secs: default_max_object_age(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, creating defaults on first run
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load("skytrail", "config")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store("skytrail", "config", self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<std::path::PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path("skytrail", "config")
    }

    #[must_use]
    pub fn home(&self) -> GeoPoint {
        GeoPoint::new(self.home_latitude, self.home_longitude)
    }

    #[must_use]
    pub fn grid(&self) -> (u32, u32) {
        (self.grid_cols, self.grid_rows)
    }

    /// Tile styling; an unknown basemap name falls back to terrain.
    #[must_use]
    pub fn tile_style(&self) -> TileStyle {
        let basemap = MapStyle::from_name(&self.basemap).unwrap_or_else(|| {
            warn!("Unknown basemap '{}', using terrain", self.basemap);
            MapStyle::Terrain
        });
        TileStyle {
            basemap,
            roadmap_overlay: self.roadmap_overlay,
            brightness: self.brightness.clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let config = AppConfig::default();
        assert_eq!(config.grid(), (4, 4));
        assert_eq!(config.zoom, 10);
        assert!(config.centerview);
        assert_eq!(config.tile_style().basemap, MapStyle::Terrain);
        assert!((config.home().lat - 52.5162767).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_basemap_falls_back_to_terrain() {
        let config = AppConfig { basemap: "hologram".to_string(), ..Default::default() };
        assert_eq!(config.tile_style().basemap, MapStyle::Terrain);
    }

    #[test]
    fn test_brightness_clamped_into_range() {
        let config = AppConfig { brightness: 1.8, ..Default::default() };
        assert!((config.tile_style().brightness - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_partial_config_uses_field_defaults() {
        let config: AppConfig =
            serde_json::from_value(serde_json::json!({ "zoom": 12, "basemap": "satellite" }))
                .unwrap();
        assert_eq!(config.zoom, 12);
        assert_eq!(config.tile_style().basemap, MapStyle::Satellite);
        assert_eq!(config.max_trail, 100);
    }
}
