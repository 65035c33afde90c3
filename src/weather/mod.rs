//! Weather overlay image fetching.
//!
//! This module provides precipitation radar and cloud cover rasters from
//! the wetter.com tile services, with per-bucket disk caching.

pub mod wettercom;

pub use wettercom::{radar_bucket, WetterComClient};
