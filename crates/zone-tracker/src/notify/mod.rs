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

//! Best-effort notification delivery.
//!
//! The poll loop never waits on a notifier. Messages go into a bounded queue
//! drained by a background task that bounds every delivery with a timeout.
//! A full queue drops the message; a failed delivery is logged and dropped.

use std::future::Future;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::tracker::{Transition, ZoneEvent};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("notifier returned status {0}")]
    Status(u16),
}

/// Delivers a plain text message somewhere.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, text: &str) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Notifier that only writes to the log. Used when no target is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        info!("[notify] {text}");
        Ok(())
    }
}

/// Render a zone event as a notification message.
///
/// `mention` is appended to entry alerts (for example a Discord role mention).
#[must_use]
pub fn format_event(event: &ZoneEvent, mention: Option<&str>) -> String {
    match event.transition {
        Transition::Entered => {
            let mut text = format!("ALERT: {} has ENTERED our {}", event.callsign, event.zone);
            if let Some(m) = mention.filter(|m| !m.is_empty()) {
                text.push(' ');
                text.push_str(m);
            }
            text
        }
        Transition::Left => format!("{} LEFT our {}", event.callsign, event.zone),
    }
}

/// Handle to the background delivery task.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<String>,
}

impl NotificationQueue {
    /// Spawn the delivery task. It exits once every queue handle is dropped
    /// and the remaining messages have been attempted.
    pub fn spawn<N: Notifier>(notifier: N, capacity: usize, timeout: Duration) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(dispatch_loop(notifier, rx, timeout));
        (Self { tx }, handle)
    }

    /// Queue a message without waiting. Returns false if it was dropped.
    pub fn enqueue(&self, text: String) -> bool {
        match self.tx.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(text)) => {
                warn!("Notification queue full, dropping: {text}");
                false
            }
            Err(TrySendError::Closed(text)) => {
                warn!("Notification queue closed, dropping: {text}");
                false
            }
        }
    }
}

async fn dispatch_loop<N: Notifier>(notifier: N, mut rx: mpsc::Receiver<String>, timeout: Duration) {
    while let Some(text) = rx.recv().await {
        match tokio::time::timeout(timeout, notifier.notify(&text)).await {
            Ok(Ok(())) => debug!("Notification delivered: {text}"),
            Ok(Err(e)) => warn!("Notification failed: {e}"),
            Err(_) => warn!("Notification timed out after {timeout:?}"),
        }
    }
    info!("Notification dispatcher stopped");
}
