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

//! Track moving aircraft on a continuously updating map of cached raster
//! tiles, with weather overlays and reconciled flight trails.
//!
//! The crate is organized as independent layers that compose into a follow
//! pipeline:
//!
//! - [`coords`]: spherical Mercator projection between geographic, world,
//!   and pixel coordinates
//! - [`tiles`]: on-disk tile cache, provider fetching, and overlay
//!   compositing (brightness, roadmap, clouds, precipitation radar)
//! - [`viewport`]: maps a target pixel position onto a fixed tile grid and
//!   decides between full reloads and cheap re-translations
//! - [`trails`]: bounded, time-ordered trails merging live samples with
//!   authoritative history batches
//! - [`weather`]: wetter.com radar and cloud raster client
//! - [`flightdata`]: the flight-data source boundary, plus a CSV replay
//!   source
//! - [`follow`]: the per-object update cycle tying the layers together
//! - [`config`]: persistent TOML configuration
//!
//! The windowing and canvas layer is deliberately absent: [`follow`] hands
//! back placed tile images, marker positions, and screen-space polylines
//! for whatever renders them.

pub mod config;
pub mod coords;
pub mod flightdata;
pub mod follow;
pub mod tiles;
pub mod trails;
pub mod viewport;
pub mod weather;
