// Copyright 2025 Chris Custine
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

mod aircraft_types;
mod cli;
mod config;
mod server;
mod upstream;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{debug, error, info, warn};
use mimalloc::MiMalloc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use zone_tracker::{TrackerEvent, Watcher};

use aircraft_types::AircraftTypeMap;
use cli::Cli;
use config::ConfigStore;
use server::AppState;
use upstream::GeoFsFeed;
use webhook::AlertNotifier;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const AC_MAP_TIMEOUT: Duration = Duration::from_secs(8);

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for ctrl-c: {e}");
            }
            info!("Shutdown requested");
        }
        () = cancel.cancelled() => {}
    }
}

/// Log tracker lifecycle events until cancelled.
async fn log_tracker_events(mut events: broadcast::Receiver<TrackerEvent>, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            () = cancel.cancelled() => break,
        };
        match event {
            Ok(TrackerEvent::EntityAdded(id)) => debug!("Tracking {id}"),
            Ok(TrackerEvent::EntityRemoved(id)) => debug!("Stopped tracking {id}"),
            Ok(TrackerEvent::Transition(_)) => {}
            Err(RecvError::Lagged(n)) => warn!("Tracker event log skipped {n} events"),
            Err(RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let store = ConfigStore::load(cli.config.clone())?;
    if let Ok(Some(path)) = store.path() {
        info!("Using configuration at {}", path.display());
    }

    let mut config = store.config();
    cli.apply(&mut config);

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    config.validate()?;

    let zones = Arc::new(config.zone_registry()?);
    let filter = config.callsign_filter()?;
    info!(
        "Watching {} zones with {} callsign patterns ({} excluded)",
        zones.len(),
        filter.patterns().len(),
        filter.excluded().len()
    );

    let aircraft_types = match config.ac_map_url.as_deref() {
        Some(url) => AircraftTypeMap::fetch(url, AC_MAP_TIMEOUT).await,
        None => {
            info!("Using built-in aircraft type table");
            AircraftTypeMap::builtin()
        }
    };

    let feed = GeoFsFeed::new(config.upstream_url.clone(), config.fetch_timeout())?;
    let notifier = AlertNotifier::from_url(
        config.resolved_webhook_url().as_deref(),
        config.notify_timeout(),
    )?;

    info!("Polling {} every {}s", feed.url(), config.poll_interval_secs);
    let watcher = Watcher::spawn(
        config.watch_config(),
        Arc::clone(&zones),
        filter,
        feed.clone(),
        notifier,
    );

    let event_log = tokio::spawn(log_tracker_events(
        watcher.state().subscribe(),
        watcher.cancel_token(),
    ));

    let state = AppState {
        watch: Arc::clone(watcher.state()),
        display_window: config.display_window(),
        aircraft_types: Arc::new(aircraft_types),
        config: Arc::new(store),
        upstream: Some(feed),
    };

    let listener = tokio::net::TcpListener::bind(&config.listen_address).await?;
    info!("Query API listening on http://{}", listener.local_addr()?);

    let served = axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal(watcher.cancel_token()))
        .await;

    watcher.shutdown();
    watcher.join().await;
    if let Err(e) = event_log.await {
        warn!("Tracker event logger ended abnormally: {e}");
    }
    info!("Stopped");

    served?;
    Ok(())
}
