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

//! The poll cycle.
//!
//! fetch → normalize + filter → update membership → queue notifications →
//! reap → sleep. The sleep starts after the work finishes, so slow fetches
//! shift the schedule instead of piling up. A failed fetch skips the whole
//! cycle and lengthens the next sleep (doubling, capped at `max_backoff`).

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::feed::{FeedError, RawRecord, Snapshot, SnapshotSource};
use crate::notify::{format_event, NotificationQueue};
use crate::tracker::ZoneEvent;
use crate::WatchState;

/// Poll loop timing and message settings.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Sleep between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// Upper bound for a single fetch.
    pub fetch_timeout: Duration,
    /// Cap for the backoff delay after repeated fetch failures.
    pub max_backoff: Duration,
    /// Appended to entry alerts.
    pub mention: Option<String>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            fetch_timeout: Duration::from_secs(3),
            max_backoff: Duration::from_secs(30),
            mention: None,
        }
    }
}

/// Counters and status of the most recent cycles.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStats {
    /// Total reported by the upstream (or the list length if not reported).
    pub reported_total: u64,
    pub received: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub filtered_out: usize,
    pub tracked: usize,
    pub cycles: u64,
    pub last_fetch: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

/// Result of applying one snapshot.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub events: Vec<ZoneEvent>,
    pub reaped: Vec<String>,
    pub received: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub filtered_out: usize,
}

/// Delay before the next cycle after `failures` consecutive fetch failures.
///
/// The first failure keeps the normal interval; each further failure doubles
/// it, never exceeding `max_backoff` (or `interval` if that is larger).
#[must_use]
pub fn backoff_delay(interval: Duration, max_backoff: Duration, failures: u32) -> Duration {
    if failures <= 1 {
        return interval;
    }
    let factor = 1u32 << (failures - 1).min(16);
    interval.saturating_mul(factor).min(max_backoff.max(interval))
}

/// Normalize, filter and ingest one snapshot. Does not reap.
pub fn apply_snapshot(state: &WatchState, snapshot: Snapshot, now: DateTime<Utc>) -> CycleReport {
    let filter = state
        .filter
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    let mut report = CycleReport {
        received: snapshot.records.len(),
        ..Default::default()
    };

    let mut tracker = state.tracker.write().unwrap_or_else(PoisonError::into_inner);

    let mut accepted = Vec::with_capacity(snapshot.records.len());
    for value in &snapshot.records {
        let record = match RawRecord::parse(value) {
            Ok(record) => record,
            Err(reason) => {
                debug!("Discarding record: {reason}");
                report.rejected += 1;
                continue;
            }
        };
        if !filter.allows(&record.callsign) {
            report.filtered_out += 1;
            continue;
        }
        if !record.stable_id {
            debug!("{} has no id, tracking under generated id {}", record.callsign, record.id);
        }
        let prior = tracker.prior(&record.id);
        accepted.push(record.into_entity(prior, now));
    }
    report.accepted = accepted.len();
    report.events = tracker.ingest(accepted);
    report
}

/// Run one full cycle. Returns the fetch error if the cycle was skipped.
pub async fn poll_once<S: SnapshotSource>(
    source: &S,
    state: &WatchState,
    queue: &NotificationQueue,
    config: &PollConfig,
) -> Result<CycleReport, FeedError> {
    let fetched = match timeout(config.fetch_timeout, source.fetch()).await {
        Ok(result) => result,
        Err(_) => Err(FeedError::Timeout(config.fetch_timeout)),
    };
    let now = Utc::now();

    let snapshot = match fetched {
        Ok(snapshot) => snapshot,
        Err(e) => {
            let mut stats = state.stats.write().unwrap_or_else(PoisonError::into_inner);
            stats.cycles += 1;
            stats.consecutive_failures += 1;
            stats.last_error = Some(e.to_string());
            return Err(e);
        }
    };
    let reported_total = snapshot.total();

    let mut report = apply_snapshot(state, snapshot, now);

    for event in &report.events {
        queue.enqueue(format_event(event, config.mention.as_deref()));
    }

    let tracked = {
        let mut tracker = state.tracker.write().unwrap_or_else(PoisonError::into_inner);
        report.reaped = tracker.reap(now);
        tracker.len()
    };

    {
        let mut stats = state.stats.write().unwrap_or_else(PoisonError::into_inner);
        stats.reported_total = reported_total;
        stats.received = report.received;
        stats.accepted = report.accepted;
        stats.rejected = report.rejected;
        stats.filtered_out = report.filtered_out;
        stats.tracked = tracked;
        stats.cycles += 1;
        stats.last_fetch = Some(now);
        stats.last_error = None;
        stats.consecutive_failures = 0;
    }

    debug!(
        "Cycle: {} received, {} accepted, {} rejected, {} filtered, {} events, {} reaped, {} tracked",
        report.received,
        report.accepted,
        report.rejected,
        report.filtered_out,
        report.events.len(),
        report.reaped.len(),
        tracked
    );

    Ok(report)
}

/// Poll until cancelled.
///
/// Cancellation is observed between cycles and during the sleep; a fetch
/// already in flight finishes or times out first. The queue handle is dropped
/// on return so the dispatcher can drain and stop.
pub async fn run_poll_loop<S: SnapshotSource>(
    source: S,
    state: Arc<WatchState>,
    queue: NotificationQueue,
    config: PollConfig,
    cancel: CancellationToken,
) {
    info!("Poll loop started, interval {:?}", config.interval);
    let mut failures = 0u32;

    while !cancel.is_cancelled() {
        let delay = match poll_once(&source, &state, &queue, &config).await {
            Ok(_) => {
                if failures > 0 {
                    info!("Feed recovered after {failures} failed fetch(es)");
                }
                failures = 0;
                config.interval
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                let delay = backoff_delay(config.interval, config.max_backoff, failures);
                warn!("Fetch failed ({e}), skipping cycle; next attempt in {delay:?}");
                delay
            }
        };

        tokio::select! {
            () = sleep(delay) => {}
            () = cancel.cancelled() => break,
        }
    }

    info!("Poll loop stopped");
}
