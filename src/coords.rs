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

//! Spherical Mercator projection between geographic, world, and pixel space.
//!
//! World coordinates are zoom-independent with a circumference of 256 units
//! at zoom 0; pixel coordinates scale the world by 2^zoom and round to the
//! nearest integer. The rounding (not truncation) at [`world_to_pixel`] is
//! deliberate and load-bearing for tile-boundary consistency: a geo round
//! trip is exact only up to one pixel's angular resolution at the zoom.

/// Tile edge length in pixels. Fixed across every provider we talk to.
pub const TILE_SIZE: i64 = 256;

const CIRCUMFERENCE: f64 = 256.0;
const RADIUS: f64 = CIRCUMFERENCE / (2.0 * std::f64::consts::PI);
const FALSE_EASTING: f64 = -CIRCUMFERENCE / 2.0;
const FALSE_NORTHING: f64 = CIRCUMFERENCE / 2.0;

// The Mercator log blows up at the poles; inputs are clamped just short of
// them. Latitudes beyond ~85.051 degrees still project outside tile space.
const LAT_LIMIT: f64 = 89.9;

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    #[must_use]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A zoom-independent projected coordinate (256-unit circumference).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldPoint {
    pub x: f64,
    pub y: f64,
}

/// An integer pixel coordinate at a specific zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelPoint {
    pub x: i64,
    pub y: i64,
}

impl PixelPoint {
    /// Index of the tile containing this pixel.
    #[must_use]
    pub fn tile(&self) -> (i64, i64) {
        (self.x.div_euclid(TILE_SIZE), self.y.div_euclid(TILE_SIZE))
    }

    /// Offset of this pixel within its tile.
    #[must_use]
    pub fn tile_offset(&self) -> (i64, i64) {
        (self.x.rem_euclid(TILE_SIZE), self.y.rem_euclid(TILE_SIZE))
    }
}

/// Convert a longitude in degrees to the world x coordinate.
#[must_use]
pub fn lng_to_world_x(lng: f64) -> f64 {
    RADIUS * lng.to_radians() - FALSE_EASTING
}

/// Convert a latitude in degrees to the world y coordinate.
///
/// Latitude is clamped short of the poles where the projection is undefined.
#[must_use]
pub fn lat_to_world_y(lat: f64) -> f64 {
    let sin_lat = lat.clamp(-LAT_LIMIT, LAT_LIMIT).to_radians().sin();
    -((RADIUS / 2.0) * ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() - FALSE_NORTHING)
}

/// Scale world coordinates by 2^zoom and round to the nearest pixel.
#[must_use]
pub fn world_to_pixel(world_x: f64, world_y: f64, zoom: u8) -> PixelPoint {
    let scale = f64::from(1u32 << zoom);
    PixelPoint {
        x: (world_x * scale).round() as i64,
        y: (world_y * scale).round() as i64,
    }
}

/// Project a geographic coordinate straight to pixel space.
#[must_use]
pub fn geo_to_pixel(geo: GeoPoint, zoom: u8) -> PixelPoint {
    world_to_pixel(lng_to_world_x(geo.lng), lat_to_world_y(geo.lat), zoom)
}

/// Convert a pixel coordinate back to world coordinates.
#[must_use]
pub fn pixel_to_world(pixel: PixelPoint, zoom: u8) -> WorldPoint {
    let scale = f64::from(1u32 << zoom);
    WorldPoint {
        x: pixel.x as f64 / scale,
        y: pixel.y as f64 / scale,
    }
}

/// Convert a world x coordinate back to a longitude in degrees.
#[must_use]
pub fn world_x_to_lng(world_x: f64) -> f64 {
    ((world_x + FALSE_EASTING) / RADIUS).to_degrees()
}

/// Convert a world y coordinate back to a latitude in degrees.
#[must_use]
pub fn world_y_to_lat(world_y: f64) -> f64 {
    let t = ((-world_y + FALSE_NORTHING) * 2.0 / RADIUS).exp();
    (-(1.0 - t) / (1.0 + t)).asin().to_degrees()
}

/// Unproject a pixel coordinate back to a geographic coordinate.
#[must_use]
pub fn pixel_to_geo(pixel: PixelPoint, zoom: u8) -> GeoPoint {
    let world = pixel_to_world(pixel, zoom);
    GeoPoint {
        lat: world_y_to_lat(world.y),
        lng: world_x_to_lng(world.x),
    }
}

/// Great-circle distance between two locations in kilometers.
#[must_use]
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let r = 6372.8; // Earth radius in kilometers

    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * r * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_world_origin_maps_to_center() {
        assert_relative_eq!(lng_to_world_x(0.0), 128.0, epsilon = 1e-9);
        assert_relative_eq!(lat_to_world_y(0.0), 128.0, epsilon = 1e-9);
        assert_relative_eq!(lng_to_world_x(180.0), 256.0, epsilon = 1e-9);
        assert_relative_eq!(lng_to_world_x(-180.0), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_world_y_decreases_northward() {
        assert!(lat_to_world_y(50.0) < lat_to_world_y(0.0));
        assert!(lat_to_world_y(0.0) < lat_to_world_y(-50.0));
    }

    #[test]
    fn test_world_round_trip() {
        for &(lat, lng) in &[(52.5163, 13.3778), (-33.8688, 151.2093), (0.0, 0.0), (84.9, -179.5)] {
            assert_relative_eq!(world_x_to_lng(lng_to_world_x(lng)), lng, epsilon = 1e-9);
            assert_relative_eq!(world_y_to_lat(lat_to_world_y(lat)), lat, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_pixel_round_trip_within_one_pixel() {
        // Quantization at world_to_pixel loses sub-pixel precision; the geo
        // round trip must stay within one pixel's angular resolution.
        for zoom in [4u8, 8, 12, 16] {
            let resolution = 360.0 / (256.0 * f64::from(1u32 << zoom));
            for &(lat, lng) in &[(52.5163, 13.3778), (-85.0, 12.0), (85.0, -120.25), (33.9425, -118.4081)] {
                let geo = GeoPoint::new(lat, lng);
                let back = pixel_to_geo(geo_to_pixel(geo, zoom), zoom);
                assert!((back.lng - lng).abs() <= resolution, "lng drift at zoom {zoom}");
                assert!((back.lat - lat).abs() <= resolution, "lat drift at zoom {zoom}");
            }
        }
    }

    #[test]
    fn test_pixel_projection_is_stable() {
        let geo = GeoPoint::new(48.8566, 2.3522);
        let px = geo_to_pixel(geo, 11);
        let px2 = geo_to_pixel(pixel_to_geo(px, 11), 11);
        assert_eq!(px, px2);
    }

    #[test]
    fn test_tile_indexing() {
        let px = PixelPoint { x: 1000, y: 515 };
        assert_eq!(px.tile(), (3, 2));
        assert_eq!(px.tile_offset(), (232, 3));
    }

    #[test]
    fn test_haversine_distance() {
        // LAX to JFK is approximately 3,983 km
        let lax = GeoPoint::new(33.9425, -118.4081);
        let jfk = GeoPoint::new(40.6413, -73.7781);
        assert!((haversine_km(lax, jfk) - 3983.0).abs() < 20.0);
        assert_relative_eq!(haversine_km(lax, lax), 0.0, epsilon = 1e-9);
    }
}
