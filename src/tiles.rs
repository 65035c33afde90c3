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

//! Map tile cache and overlay compositor.
//!
//! Tiles are cached on disk as raw provider bytes under
//! `<cacheRoot>/tiles/<style>/<z>/<x>,<y>.dat` and composited fresh on every
//! retrieval: brightness normalization, optional roadmap overlay, optional
//! cloud cover, optional precipitation radar. A fetch that fails returns a
//! fixed-color placeholder so rendering never stalls on the network.
//!
//! The precipitation pass also feeds the radar index probe: when the tile
//! being composited contains the home location, the overlay's blue-channel
//! value at the home pixel is captured before the tint is applied.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use image::{imageops, Rgba, RgbaImage};
use log::{debug, warn};

use crate::coords::{geo_to_pixel, GeoPoint, TILE_SIZE};
use crate::viewport::TileSource;
use crate::weather::{radar_bucket, WetterComClient};

// Google serves satellite imagery from a versioned endpoint; the version is
// occasionally incremented upstream.
const SATELLITE_API_VERSION: u32 = 946;

// Cloud overlays are composited at 60% of their original opacity.
const CLOUDS_ALPHA: f32 = 0.6;

// Weather overlays only exist up to this zoom level.
const MAX_OVERLAY_ZOOM: u8 = 13;

const TILE_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.1) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/87.0.4280.88 Safari/537.36";

/// Base map rendering style, each with its own provider endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapStyle {
    Terrain,
    Satellite,
    Roadmap,
}

impl MapStyle {
    /// Name used for the on-disk cache directory and config values.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MapStyle::Terrain => "terrain",
            MapStyle::Satellite => "satellite",
            MapStyle::Roadmap => "roadmap",
        }
    }

    /// Parse a config value; unknown names fall back to `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "terrain" => Some(MapStyle::Terrain),
            "satellite" => Some(MapStyle::Satellite),
            "roadmap" => Some(MapStyle::Roadmap),
            _ => None,
        }
    }
}

/// Identifies one cached raster tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub style: MapStyle,
    pub z: u8,
    pub x: i64,
    pub y: i64,
}

impl TileKey {
    fn cache_path(&self, root: &std::path::Path) -> PathBuf {
        root.join(self.style.as_str())
            .join(self.z.to_string())
            .join(format!("{},{}.dat", self.x, self.y))
    }
}

/// Base layer selection and per-retrieval transforms.
#[derive(Debug, Clone)]
pub struct TileStyle {
    pub basemap: MapStyle,
    /// Alpha-composite the roadmap layer over the base.
    pub roadmap_overlay: bool,
    /// RGB multiplier in [0, 1], applied on every retrieval.
    pub brightness: f32,
}

impl Default for TileStyle {
    fn default() -> Self {
        Self {
            basemap: MapStyle::Terrain,
            roadmap_overlay: false,
            brightness: 0.4,
        }
    }
}

/// On-disk tile cache, provider fetcher, and overlay compositor.
#[derive(Debug)]
pub struct TileStore {
    http: reqwest::blocking::Client,
    cache_root: PathBuf,
    style: TileStyle,
    locale_lang: String,
    locale_country: String,
    enable_clouds: bool,
    enable_radar: bool,
    weather: WetterComClient,
    home: GeoPoint,
    home_radar_index: u8,
}

impl TileStore {
    /// `cache_root` receives a `tiles/` subtree for map tiles and a
    /// `wetter.com/` subtree for weather rasters.
    pub fn new(
        cache_root: PathBuf,
        style: TileStyle,
        home: GeoPoint,
        timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let tile_root = cache_root.join("tiles");
        fs::create_dir_all(&tile_root)?;
        let weather = WetterComClient::new(cache_root.join("wetter.com"), timeout)?;
        let http = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            cache_root: tile_root,
            style,
            locale_lang: "en".to_string(),
            locale_country: "GB".to_string(),
            enable_clouds: false,
            enable_radar: false,
            weather,
            home,
            home_radar_index: 0,
        })
    }

    pub fn set_locale(&mut self, lang: &str, country: &str) {
        self.locale_lang = lang.to_string();
        self.locale_country = country.to_string();
        self.weather.set_locale(lang, country);
    }

    pub fn set_clouds(&mut self, enabled: bool) {
        self.enable_clouds = enabled;
    }

    pub fn set_radar(&mut self, enabled: bool) {
        self.enable_radar = enabled;
    }

    pub fn toggle_clouds(&mut self) {
        self.enable_clouds = !self.enable_clouds;
    }

    pub fn toggle_radar(&mut self) {
        self.enable_radar = !self.enable_radar;
    }

    /// Precipitation intensity (overlay blue channel) last sampled at the
    /// home location, for status display.
    #[must_use]
    pub fn home_radar_index(&self) -> u8 {
        self.home_radar_index
    }

    /// Retrieve the composited tile at `(x, y, z)`.
    ///
    /// `ts` pins weather overlays to a timestamp (snapped to the provider's
    /// 5-minute buckets); `None` uses the current time. Never fails: fetch
    /// and decode errors degrade to a placeholder or a skipped overlay.
    pub fn get_tile(&mut self, x: i64, y: i64, z: u8, ts: Option<i64>) -> RgbaImage {
        let mut img = self.fetch_tile_image(TileKey { style: self.style.basemap, z, x, y });

        if self.style.roadmap_overlay {
            let overlay = self.fetch_tile_image(TileKey { style: MapStyle::Roadmap, z, x, y });
            imageops::overlay(&mut img, &overlay, 0, 0);
        }

        apply_brightness(&mut img, self.style.brightness);

        let now = ts.unwrap_or_else(|| Utc::now().timestamp());

        if self.enable_clouds && z <= MAX_OVERLAY_ZOOM {
            self.weather.ensure_cloud_url(now);
            if let Some(mut overlay) = self.weather.cloud_image(x, y, z) {
                scale_alpha(&mut overlay, CLOUDS_ALPHA);
                imageops::overlay(&mut img, &overlay, 0, 0);
            }
        }

        if self.enable_radar && z <= MAX_OVERLAY_ZOOM {
            let bucket = radar_bucket(now);
            self.weather.refresh_radar_tileset(bucket);
            if let Some(overlay) = self.weather.radar_image(x, y, z, bucket) {
                // The provider raster covers a 2x2 tile block at double
                // resolution; cut out the quadrant for this tile.
                let (qx, qy) = radar_quadrant(x, y);
                let quad = imageops::crop_imm(&overlay, qx, qy, TILE_SIZE as u32, TILE_SIZE as u32)
                    .to_image();

                let home_px = geo_to_pixel(self.home, z);
                if (x, y) == home_px.tile() {
                    let (ox, oy) = home_px.tile_offset();
                    if (ox as u32) < quad.width() && (oy as u32) < quad.height() {
                        self.home_radar_index = quad.get_pixel(ox as u32, oy as u32)[2];
                    }
                }

                apply_precipitation_tint(&mut img, &quad);
            }
        }

        img
    }

    /// Load one raw tile from cache or the provider, as RGBA.
    fn fetch_tile_image(&self, key: TileKey) -> RgbaImage {
        let path = key.cache_path(&self.cache_root);

        if path.exists() {
            match fs::read(&path).map_err(|e| e.to_string()).and_then(|bytes| {
                image::load_from_memory(&bytes).map(|img| img.to_rgba8()).map_err(|e| e.to_string())
            }) {
                Ok(img) => return img,
                Err(e) => warn!("Corrupt cached tile {}, refetching: {e}", path.display()),
            }
        }

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Failed to create tile cache dir {}: {e}", parent.display());
            }
        }

        match self.download_tile(key) {
            Ok(bytes) => {
                // Two sessions racing on the same key both just write; the
                // bytes are identical for a given key and bucket.
                if let Err(e) = fs::write(&path, &bytes) {
                    warn!("Failed to cache tile {}: {e}", path.display());
                }
                match image::load_from_memory(&bytes) {
                    Ok(img) => img.to_rgba8(),
                    Err(e) => {
                        warn!("Failed to decode {:?} tile ({},{},{}): {e}", key.style, key.x, key.y, key.z);
                        placeholder_tile()
                    }
                }
            }
            Err(e) => {
                warn!("Failed to download {:?} tile ({},{},{}): {e}", key.style, key.x, key.y, key.z);
                placeholder_tile()
            }
        }
    }

    fn download_tile(&self, key: TileKey) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let url = self.tile_url(key);
        debug!("Downloading tile: {url}");

        let response = self
            .http
            .get(&url)
            .header("accept", "image/avif,image/webp,*/*")
            .header(
                "accept-language",
                format!("{}-{};q=0.7,en;q=0.3", self.locale_lang, self.locale_country),
            )
            .header("user-agent", TILE_USER_AGENT)
            .send()?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()).into());
        }
        Ok(response.bytes()?.to_vec())
    }

    /// Provider URL for a tile; each style has its own endpoint and scheme.
    fn tile_url(&self, key: TileKey) -> String {
        let TileKey { style, z, x, y } = key;
        let lang = &self.locale_lang;
        let country = &self.locale_country;
        match style {
            MapStyle::Satellite => format!(
                "https://khms0.googleapis.com/kh?v={SATELLITE_API_VERSION}&hl={lang}&x={x}&y={y}&z={z}"
            ),
            MapStyle::Terrain => format!(
                "https://maps.google.com/maps/vt?pb=!1m5!1m4!1i{z}!2i{x}!3i{y}!4i{TILE_SIZE}\
                 !2m3!1e4!2st!3i639!2m3!1e0!2sr!3i639377937!3m17!2s{lang}!3s{country}!5e18\
                 !12m4!1e8!2m2!1sset!2sTerrain!12m3!1e37!2m1!1ssmartmaps!12m4!1e26!2m2\
                 !1sstyles!2zcy50OjMzfHMuZTpsfHAudjpvZmY!4e0!23i1379903"
            ),
            MapStyle::Roadmap => format!(
                "https://maps.google.com/maps/vt?pb=!1m5!1m4!1i{z}!2i{x}!3i{y}!4i{TILE_SIZE}\
                 !2m3!1e0!2sm!3i643381729!3m17!2s{lang}!3s{country}!5e18!12m4!1e68!2m2\
                 !1sset!2sRoadmapSatellite!12m3!1e37!2m1!1ssmartmaps!12m4!1e26!2m2\
                 !1sstyles!2zcy50OjMzfHMuZTpsfHAudjpvZmY!4e0!23i1379903"
            ),
        }
    }
}

impl TileSource for TileStore {
    fn tile(&mut self, x: i64, y: i64, z: u8, ts: Option<i64>) -> RgbaImage {
        self.get_tile(x, y, z, ts)
    }
}

/// Fixed-color stand-in for a tile that could not be fetched or decoded.
fn placeholder_tile() -> RgbaImage {
    RgbaImage::from_pixel(TILE_SIZE as u32, TILE_SIZE as u32, Rgba([255, 192, 203, 255]))
}

/// Pixel offset of the 256x256 quadrant for tile `(x, y)` within its
/// double-resolution parent raster.
fn radar_quadrant(x: i64, y: i64) -> (u32, u32) {
    (
        (TILE_SIZE * x.rem_euclid(2)) as u32,
        (TILE_SIZE * y.rem_euclid(2)) as u32,
    )
}

/// Multiply the RGB channels by `factor`, leaving alpha untouched.
/// Channels floor toward zero, matching `floor(original * b)`.
fn apply_brightness(img: &mut RgbaImage, factor: f32) {
    let factor = factor.clamp(0.0, 1.0);
    for pixel in img.pixels_mut() {
        for channel in &mut pixel.0[..3] {
            *channel = (f32::from(*channel) * factor) as u8;
        }
    }
}

/// Scale the alpha channel to `factor` of its original value.
fn scale_alpha(img: &mut RgbaImage, factor: f32) {
    let factor = factor.clamp(0.0, 1.0);
    for pixel in img.pixels_mut() {
        pixel.0[3] = (f32::from(pixel.0[3]) * factor) as u8;
    }
}

/// Blend a precipitation raster into the base tile.
///
/// The overlay's blue channel is the intensity signal: red and green are
/// decreased by it and blue is increased by four times it, each clamped to
/// the 8-bit range, shifting wet areas toward blue.
fn apply_precipitation_tint(base: &mut RgbaImage, overlay: &RgbaImage) {
    let width = base.width().min(overlay.width());
    let height = base.height().min(overlay.height());
    for y in 0..height {
        for x in 0..width {
            let intensity = i32::from(overlay.get_pixel(x, y)[2]);
            let pixel = base.get_pixel_mut(x, y);
            pixel.0[0] = (i32::from(pixel.0[0]) - intensity).clamp(0, 255) as u8;
            pixel.0[1] = (i32::from(pixel.0[1]) - intensity).clamp(0, 255) as u8;
            pixel.0[2] = (i32::from(pixel.0[2]) + intensity * 4).clamp(0, 255) as u8;
        }
    }
}
