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

//! Zone transition tracking for live aircraft position feeds.
//!
//! This library polls a snapshot feed, filters the reported aircraft by
//! callsign, tracks each aircraft's membership in a set of static polygons
//! and reports every entry into or exit from a zone exactly once. It is split
//! into layers that can be used on their own:
//!
//! - **Geometry** ([`geo`]): ray-casting containment and bearings
//! - **Zones** ([`zones`]): validated, immutable polygon registry
//! - **Feed** ([`feed`]): snapshot schema and per-record normalization
//! - **Filter** ([`filter`]): callsign patterns and exclusions
//! - **Tracker** ([`tracker`]): the membership state machine and reaper
//! - **Notify** ([`notify`]): fire-and-forget delivery queue
//! - **Poll** ([`poll`]): the scheduling loop tying it together
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use zone_tracker::feed::{FeedError, Snapshot, SnapshotSource};
//! use zone_tracker::filter::CallsignFilter;
//! use zone_tracker::geo::GeoPoint;
//! use zone_tracker::notify::LogNotifier;
//! use zone_tracker::zones::{Zone, ZoneRegistry};
//! use zone_tracker::{WatchConfig, Watcher};
//!
//! struct Empty;
//!
//! impl SnapshotSource for Empty {
//!     async fn fetch(&self) -> Result<Snapshot, FeedError> {
//!         Ok(Snapshot::default())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let zones = ZoneRegistry::new(vec![Zone::new(
//!         "Mainland",
//!         vec![
//!             GeoPoint::new(0.0, 0.0),
//!             GeoPoint::new(0.0, 10.0),
//!             GeoPoint::new(10.0, 10.0),
//!             GeoPoint::new(10.0, 0.0),
//!         ],
//!     )])
//!     .unwrap();
//!
//!     let watcher = Watcher::spawn(
//!         WatchConfig::default(),
//!         Arc::new(zones),
//!         CallsignFilter::default(),
//!         Empty,
//!         LogNotifier,
//!     );
//!
//!     println!("{} entities", watcher.state().visible_entities(None).len());
//!     watcher.shutdown();
//!     watcher.join().await;
//! }
//! ```

pub mod feed;
pub mod filter;
pub mod geo;
pub mod notify;
pub mod poll;
pub mod tracker;
pub mod zones;

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use feed::{FeedError, Snapshot, SnapshotSource};
pub use filter::{CallsignFilter, FilterError};
pub use geo::GeoPoint;
pub use notify::{LogNotifier, NotificationQueue, Notifier, NotifyError};
pub use poll::{FeedStats, PollConfig};
pub use tracker::{Entity, EntityView, TrackerConfig, TrackerEvent, Transition, ZoneEvent, ZoneTracker};
pub use zones::{Zone, ZoneError, ZoneRegistry};

/// Shared state of a running watcher.
///
/// The poll cycle is the only writer of the tracker and the stats; the query
/// surface reads them and may edit the filter. Each lock is held only for the
/// duration of a synchronous operation.
#[derive(Debug)]
pub struct WatchState {
    pub tracker: RwLock<ZoneTracker>,
    pub filter: RwLock<CallsignFilter>,
    pub stats: RwLock<FeedStats>,
    zones: Arc<ZoneRegistry>,
}

impl WatchState {
    #[must_use]
    pub fn new(zones: Arc<ZoneRegistry>, filter: CallsignFilter, tracker: TrackerConfig) -> Self {
        Self {
            tracker: RwLock::new(ZoneTracker::new(Arc::clone(&zones), tracker)),
            filter: RwLock::new(filter),
            stats: RwLock::new(FeedStats::default()),
            zones,
        }
    }

    #[must_use]
    pub fn zones(&self) -> &Arc<ZoneRegistry> {
        &self.zones
    }

    /// Tracked entities seen within `max_age`, or all of them.
    #[must_use]
    pub fn visible_entities(&self, max_age: Option<Duration>) -> Vec<EntityView> {
        self.tracker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .views(Utc::now(), max_age)
    }

    #[must_use]
    pub fn stats(&self) -> FeedStats {
        self.stats.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Copy of the current filter.
    #[must_use]
    pub fn filter(&self) -> CallsignFilter {
        self.filter.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Add a filter pattern; takes effect on the next cycle.
    pub fn add_pattern(&self, pattern: &str) -> Result<bool, FilterError> {
        let added = self
            .filter
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_pattern(pattern)?;
        if added {
            info!("Added callsign pattern '{}'", pattern.trim());
        }
        Ok(added)
    }

    /// Remove a filter pattern; takes effect on the next cycle.
    pub fn remove_pattern(&self, pattern: &str) -> bool {
        let removed = self
            .filter
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_pattern(pattern);
        if removed {
            info!("Removed callsign pattern '{}'", pattern.trim());
        }
        removed
    }

    /// Subscribe to tracker events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.tracker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribe()
    }
}

/// Configuration for a [`Watcher`].
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub poll: PollConfig,
    pub tracker: TrackerConfig,
    /// Capacity of the notification queue.
    pub notify_capacity: usize,
    /// Upper bound for one notification delivery.
    pub notify_timeout: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            tracker: TrackerConfig::default(),
            notify_capacity: 64,
            notify_timeout: Duration::from_secs(5),
        }
    }
}

/// Running poll loop plus notification dispatcher.
pub struct Watcher {
    state: Arc<WatchState>,
    cancel: CancellationToken,
    poll_task: JoinHandle<()>,
    notify_task: JoinHandle<()>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    /// Spawn the background tasks. Must be called within a tokio runtime.
    #[must_use]
    pub fn spawn<S, N>(
        config: WatchConfig,
        zones: Arc<ZoneRegistry>,
        filter: CallsignFilter,
        source: S,
        notifier: N,
    ) -> Self
    where
        S: SnapshotSource + 'static,
        N: Notifier,
    {
        let state = Arc::new(WatchState::new(zones, filter, config.tracker));
        let cancel = CancellationToken::new();

        let (queue, notify_task) =
            NotificationQueue::spawn(notifier, config.notify_capacity, config.notify_timeout);
        let poll_task = tokio::spawn(poll::run_poll_loop(
            source,
            Arc::clone(&state),
            queue,
            config.poll,
            cancel.clone(),
        ));

        Self {
            state,
            cancel,
            poll_task,
            notify_task,
        }
    }

    #[must_use]
    pub fn state(&self) -> &Arc<WatchState> {
        &self.state
    }

    /// Stop scheduling new cycles.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Cancellation token observed by the poll loop.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the poll loop to stop and the notification queue to drain.
    pub async fn join(self) {
        if let Err(e) = self.poll_task.await {
            warn!("Poll task ended abnormally: {e}");
        }
        if let Err(e) = self.notify_task.await {
            warn!("Notification task ended abnormally: {e}");
        }
    }
}
