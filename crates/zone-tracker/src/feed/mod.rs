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

//! Feed layer: snapshot schema and record normalization.
//!
//! The upstream payload is loosely typed JSON. Everything that crosses this
//! boundary is converted into checked values here: a snapshot either parses
//! into a list of raw records or fails with [`FeedError`], and each record
//! either normalizes into an [`Entity`](crate::tracker::Entity) or is
//! discarded with a [`Rejection`].

mod record;

pub use record::{RawRecord, Rejection, ALTITUDE_FEET_PER_METER, HEADING_MOVE_EPSILON_DEG};

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Errors that make a whole fetch cycle unusable.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("malformed snapshot: {0}")]
    Malformed(String),

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// One fetched batch of raw entity records.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Raw records, unvalidated.
    pub records: Vec<Value>,
    /// Total reported by the upstream, which may exceed `records.len()` when
    /// the list is pre-filtered. Informational only.
    pub reported_total: Option<u64>,
}

impl Snapshot {
    /// Parse a snapshot body.
    ///
    /// The body must be a JSON object. A missing or non-array `users` field
    /// yields an empty record list rather than an error.
    pub fn from_json(body: Value) -> Result<Self, FeedError> {
        let Value::Object(mut map) = body else {
            return Err(FeedError::Malformed("expected a JSON object".to_string()));
        };

        let reported_total = map.get("userCount").and_then(Value::as_u64);
        let records = match map.remove("users") {
            Some(Value::Array(users)) => users,
            _ => Vec::new(),
        };

        Ok(Self {
            records,
            reported_total,
        })
    }

    /// Parse a snapshot from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, FeedError> {
        let body: Value =
            serde_json::from_slice(bytes).map_err(|e| FeedError::Malformed(e.to_string()))?;
        Self::from_json(body)
    }

    /// Reported total, falling back to the number of records received.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.reported_total.unwrap_or(self.records.len() as u64)
    }
}

/// Source of snapshots for the poll loop.
///
/// Implementations must not hang indefinitely; the poll loop also wraps each
/// call in its own timeout.
pub trait SnapshotSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<Snapshot, FeedError>> + Send;
}
