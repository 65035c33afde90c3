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

//! Replay a recorded flight through the full follow pipeline: tile cache,
//! viewport, trail reconciliation, and weather overlays.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use clap::Parser;
use log::{info, warn};

use skytrail::config::AppConfig;
use skytrail::flightdata::{export_history_csv, HistoryBatch, HistoryPoint, ReplaySource};
use skytrail::follow::{FollowSession, Pacer};
use skytrail::tiles::TileStore;
use skytrail::viewport::ViewportMapper;

#[derive(Parser, Debug)]
#[command(name = "skytrail", version, about = "Follow a flight on a cached tile map")]
struct Args {
    /// Identifier of the flight to follow
    flight_id: String,

    /// CSV recording (ts,lat,lng,alt,spd,hd) to replay as the data source
    #[arg(long)]
    replay: PathBuf,

    /// Write the merged trail to this CSV file when the replay ends
    #[arg(long)]
    save_history: Option<PathBuf>,

    /// Print the configuration file path and exit
    #[arg(long)]
    show_config_path: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if args.show_config_path {
        match AppConfig::get_config_path() {
            Ok(path) => println!("{}", path.display()),
            Err(e) => eprintln!("Could not determine config path: {e}"),
        }
        return;
    }

    if let Err(e) = run(&args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;

    let cache_root = dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("skytrail");

    let mut store = TileStore::new(
        cache_root,
        config.tile_style(),
        config.home(),
        Duration::from_secs(config.http_timeout_secs),
    )?;
    store.set_locale(&config.locale_lang, &config.locale_country);
    store.set_clouds(config.enable_cloud_radar);
    store.set_radar(config.enable_rain_radar);

    let mapper = ViewportMapper::new(config.grid(), config.zoom, config.centerview);
    let source = ReplaySource::from_path(&args.flight_id, &args.replay)?;
    let mut session = FollowSession::new(
        &args.flight_id,
        source,
        store,
        mapper,
        config.max_trail,
        config.reconcile_interval_secs,
        config.home(),
    );

    info!("Following {} from {}", args.flight_id, args.replay.display());

    let mut pacer = Pacer::new(now_secs());
    loop {
        let outcome = session.step(Utc::now().timestamp());

        if let Some(position) = &outcome.position {
            info!(
                "{} at ({:.4}, {:.4}) alt {:.0} ft, zoom {}, trail {} ({} hq), rain index {}",
                position.id,
                position.lat,
                position.lng,
                position.altitude_ft,
                outcome.frame.map_or(0, |f| f.zoom),
                session.trail().len(),
                session.trail().high_quality_len(),
                session.store().home_radar_index(),
            );
        } else {
            warn!("{} not found this cycle", args.flight_id);
        }

        if session.source().exhausted() {
            info!("Replay finished");
            break;
        }
        if session.is_abandoned() {
            warn!("{} went offline, stopping", args.flight_id);
            break;
        }

        let interval = if outcome.online {
            config.update_interval_secs
        } else {
            config.lost_interval_secs
        };
        std::thread::sleep(pacer.next_delay(now_secs(), interval));
    }

    if let Some(path) = &args.save_history {
        // Speed and heading are not retained in the trail; exported as zero.
        let batch = HistoryBatch {
            points: session
                .history()
                .iter()
                .map(|p| HistoryPoint {
                    ts: p.ts,
                    lat: p.lat,
                    lng: p.lng,
                    altitude_ft: p.altitude.unwrap_or(0.0),
                    ground_speed_kts: 0.0,
                    heading: 0.0,
                })
                .collect(),
        };
        export_history_csv(path, &batch)?;
        info!("Trail saved to {}", path.display());
    }

    Ok(())
}
