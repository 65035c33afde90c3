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

//! Maps a target pixel position onto a fixed grid of map tiles.
//!
//! Each [`update`](ViewportMapper::update) splits the target position into a
//! center tile index and an intra-tile offset, with a parity-dependent
//! half-tile shift so an even grid centers the target between two tiles and
//! an odd grid centers it on one. Only a center-tile change (or `force`)
//! triggers a full grid reload through the [`TileSource`]; otherwise placed
//! tiles are merely re-translated, with no cache or network access.
//!
//! In centerview mode the tracked object is pinned to the screen center and
//! the tile grid shifts under it, which needs one extra tile row and column;
//! otherwise the grid is static and the marker moves inside it.

use chrono::Utc;
use image::RgbaImage;

use crate::coords::TILE_SIZE;
use crate::weather::radar_bucket;

/// Source of composited tile images, a seam for tests and for [`TileStore`].
///
/// [`TileStore`]: crate::tiles::TileStore
pub trait TileSource {
    fn tile(&mut self, x: i64, y: i64, z: u8, ts: Option<i64>) -> RgbaImage;
}

/// Immutable snapshot of the viewport after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportFrame {
    /// Center tile index.
    pub center: (i64, i64),
    /// Intra-tile pixel offset of the target.
    pub offset: (i64, i64),
    pub zoom: u8,
    /// Grid dimensions in tiles (columns, rows).
    pub grid: (u32, u32),
    pub tile_size: i64,
    pub centerview: bool,
    /// Whether this update reloaded the tile grid.
    pub reloaded: bool,
}

/// One composited tile placed at a screen position (top-left corner).
#[derive(Debug)]
pub struct PlacedTile {
    pub col: u32,
    pub row: u32,
    pub screen_x: i64,
    pub screen_y: i64,
    pub image: RgbaImage,
}

/// Splits a pixel coordinate into (tile index, intra-tile offset) along one
/// axis. Even grids get a half-tile shift so the target sits between two
/// tiles; the shift direction depends on whether the grid scrolls under a
/// pinned target (centerview) or the target moves inside a static grid.
fn split_axis(pixel: i64, grid_len: u32, centerview: bool) -> (i64, i64) {
    let half = TILE_SIZE / 2;
    let even = grid_len % 2 == 0;
    let shifted = match (centerview, even) {
        (true, true) | (false, false) => pixel,
        (true, false) => pixel - half,
        (false, true) => pixel + half,
    };
    (shifted.div_euclid(TILE_SIZE), shifted.rem_euclid(TILE_SIZE))
}

/// State machine over "current center tile + offset".
#[derive(Debug)]
pub struct ViewportMapper {
    grid: (u32, u32),
    zoom: u8,
    centerview: bool,
    center: Option<(i64, i64)>,
    offset: (i64, i64),
    placed: Vec<PlacedTile>,
}

impl ViewportMapper {
    #[must_use]
    pub fn new(grid: (u32, u32), zoom: u8, centerview: bool) -> Self {
        Self {
            grid,
            zoom,
            centerview,
            center: None,
            offset: (0, 0),
            placed: Vec::new(),
        }
    }

    #[must_use]
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    #[must_use]
    pub fn grid(&self) -> (u32, u32) {
        self.grid
    }

    /// Tiles currently placed, with their screen positions.
    #[must_use]
    pub fn placed(&self) -> &[PlacedTile] {
        &self.placed
    }

    /// Snapshot of the current state, or `None` before the first update.
    #[must_use]
    pub fn frame(&self) -> Option<ViewportFrame> {
        self.center.map(|center| ViewportFrame {
            center,
            offset: self.offset,
            zoom: self.zoom,
            grid: self.grid,
            tile_size: TILE_SIZE,
            centerview: self.centerview,
            reloaded: false,
        })
    }

    /// Re-center the viewport on a target pixel position.
    ///
    /// Reloads the full tile block only when the center tile changed or
    /// `force` is set; otherwise placed tiles are re-translated without
    /// touching the store.
    pub fn update(
        &mut self,
        store: &mut dyn TileSource,
        x: i64,
        y: i64,
        zoom: u8,
        force: bool,
    ) -> ViewportFrame {
        self.zoom = zoom;
        let (center_x, off_x) = split_axis(x, self.grid.0, self.centerview);
        let (center_y, off_y) = split_axis(y, self.grid.1, self.centerview);
        self.offset = (off_x, off_y);

        let candidate = (center_x, center_y);
        let reloaded = force || self.center != Some(candidate);
        if reloaded {
            self.center = Some(candidate);
            self.reload_tiles(store, zoom);
        }

        if self.centerview {
            // The grid scrolls: shift every placed tile by the new offset.
            for tile in &mut self.placed {
                tile.screen_x = TILE_SIZE * i64::from(tile.col) - off_x;
                tile.screen_y = TILE_SIZE * i64::from(tile.row) - off_y;
            }
        }

        ViewportFrame {
            center: candidate,
            offset: self.offset,
            zoom,
            grid: self.grid,
            tile_size: TILE_SIZE,
            centerview: self.centerview,
            reloaded,
        }
    }

    /// Discard placed tiles and fetch the full block around the center.
    fn reload_tiles(&mut self, store: &mut dyn TileSource, zoom: u8) {
        self.placed.clear();

        let (center_x, center_y) = self.center.unwrap_or((0, 0));
        let shift_x = i64::from(self.grid.0 / 2);
        let shift_y = i64::from(self.grid.1 / 2);
        // One extra row and column when the grid scrolls under the target.
        let extra = u32::from(self.centerview);

        // All tiles of one reload share a single weather time bucket.
        let ts = radar_bucket(Utc::now().timestamp());

        for row in 0..self.grid.1 + extra {
            for col in 0..self.grid.0 + extra {
                let tile_x = center_x + i64::from(col) - shift_x;
                let tile_y = center_y + i64::from(row) - shift_y;
                let image = store.tile(tile_x, tile_y, zoom, Some(ts));
                self.placed.push(PlacedTile {
                    col,
                    row,
                    screen_x: TILE_SIZE * i64::from(col),
                    screen_y: TILE_SIZE * i64::from(row),
                    image,
                });
            }
        }
    }

    /// Screen position of the tracked object's marker.
    #[must_use]
    pub fn marker_screen_position(&self) -> (i64, i64) {
        let (cols, rows) = (i64::from(self.grid.0), i64::from(self.grid.1));
        if self.centerview {
            (TILE_SIZE * cols / 2, TILE_SIZE * rows / 2)
        } else {
            (
                TILE_SIZE * cols / 2 + self.offset.0 - TILE_SIZE / 2,
                TILE_SIZE * rows / 2 + self.offset.1 - TILE_SIZE / 2,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockStore {
        calls: usize,
    }

    impl MockStore {
        fn new() -> Self {
            Self { calls: 0 }
        }
    }

    impl TileSource for MockStore {
        fn tile(&mut self, _x: i64, _y: i64, _z: u8, _ts: Option<i64>) -> RgbaImage {
            self.calls += 1;
            RgbaImage::new(256, 256)
        }
    }

    #[test]
    fn test_split_axis_even_grid_centerview() {
        assert_eq!(split_axis(1000, 4, true), (3, 232));
        assert_eq!(split_axis(512, 4, true), (2, 0));
    }

    #[test]
    fn test_split_axis_odd_grid_centerview() {
        // Odd grids center the target on a tile: half-tile shift applies.
        assert_eq!(split_axis(1000, 3, true), (3, 104));
    }

    #[test]
    fn test_split_axis_static_grid() {
        assert_eq!(split_axis(1000, 4, false), (4, 104));
        assert_eq!(split_axis(1000, 3, false), (3, 232));
    }

    #[test]
    fn test_first_update_loads_full_grid_plus_margin() {
        let mut store = MockStore::new();
        let mut mapper = ViewportMapper::new((4, 4), 11, true);
        let frame = mapper.update(&mut store, 1000, 515, 11, false);
        assert!(frame.reloaded);
        assert_eq!(frame.center, (3, 2));
        assert_eq!(frame.offset, (232, 3));
        // Centerview loads (N+1) x (M+1)
        assert_eq!(store.calls, 25);
        assert_eq!(mapper.placed().len(), 25);
    }

    #[test]
    fn test_static_grid_loads_exact_grid() {
        let mut store = MockStore::new();
        let mut mapper = ViewportMapper::new((4, 4), 11, false);
        mapper.update(&mut store, 1000, 515, 11, false);
        assert_eq!(store.calls, 16);
    }

    #[test]
    fn test_same_center_does_not_touch_store() {
        let mut store = MockStore::new();
        let mut mapper = ViewportMapper::new((4, 4), 11, true);
        mapper.update(&mut store, 1000, 515, 11, false);
        let after_first = store.calls;

        // Moves within the same center tile: translation only
        let frame = mapper.update(&mut store, 1010, 520, 11, false);
        assert!(!frame.reloaded);
        assert_eq!(frame.offset, (242, 8));
        assert_eq!(store.calls, after_first);
    }

    #[test]
    fn test_force_reloads_despite_same_center() {
        let mut store = MockStore::new();
        let mut mapper = ViewportMapper::new((4, 4), 11, true);
        mapper.update(&mut store, 1000, 515, 11, false);
        let after_first = store.calls;
        let frame = mapper.update(&mut store, 1000, 515, 11, true);
        assert!(frame.reloaded);
        assert_eq!(store.calls, after_first * 2);
    }

    #[test]
    fn test_center_change_reloads() {
        let mut store = MockStore::new();
        let mut mapper = ViewportMapper::new((4, 4), 11, true);
        mapper.update(&mut store, 1000, 515, 11, false);
        let frame = mapper.update(&mut store, 1000 + 256, 515, 11, false);
        assert!(frame.reloaded);
        assert_eq!(frame.center, (4, 2));
        assert_eq!(store.calls, 50);
    }

    #[test]
    fn test_centerview_translation_follows_offset() {
        let mut store = MockStore::new();
        let mut mapper = ViewportMapper::new((2, 2), 11, true);
        mapper.update(&mut store, 1000, 515, 11, false);
        let first = mapper.placed().first().map(|t| (t.screen_x, t.screen_y)).unwrap();
        assert_eq!(first, (-232, -3));

        mapper.update(&mut store, 1010, 520, 11, false);
        let first = mapper.placed().first().map(|t| (t.screen_x, t.screen_y)).unwrap();
        assert_eq!(first, (-242, -8));
    }

    #[test]
    fn test_marker_position_centerview_is_fixed() {
        let mut store = MockStore::new();
        let mut mapper = ViewportMapper::new((4, 4), 11, true);
        mapper.update(&mut store, 1000, 515, 11, false);
        assert_eq!(mapper.marker_screen_position(), (512, 512));
        mapper.update(&mut store, 1055, 603, 11, false);
        assert_eq!(mapper.marker_screen_position(), (512, 512));
    }

    #[test]
    fn test_marker_position_static_moves_with_offset() {
        let mut store = MockStore::new();
        let mut mapper = ViewportMapper::new((4, 4), 11, false);
        mapper.update(&mut store, 1000, 515, 11, false);
        // offset = (104, 131); marker = 512 + offset - 128
        assert_eq!(mapper.marker_screen_position(), (488, 515));
    }

    #[test]
    fn test_frame_is_none_before_first_update() {
        let mapper = ViewportMapper::new((4, 4), 11, true);
        assert!(mapper.frame().is_none());
    }
}
