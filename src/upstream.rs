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

//! HTTP client for the GeoFS multiplayer map feed.

use std::time::Duration;

use axum::body::Bytes;
use log::debug;
use reqwest::Client;
use zone_tracker::{FeedError, Snapshot, SnapshotSource};

/// Snapshot source backed by the upstream map endpoint.
///
/// The endpoint answers a POST with an empty form body.
#[derive(Debug, Clone)]
pub struct GeoFsFeed {
    client: Client,
    url: String,
    timeout: Duration,
}

fn transport_error(e: &reqwest::Error, timeout: Duration) -> FeedError {
    if e.is_timeout() {
        FeedError::Timeout(timeout)
    } else {
        FeedError::Transport(e.to_string())
    }
}

impl GeoFsFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("airspace-watch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the raw response body without interpreting it.
    pub async fn fetch_raw(&self) -> Result<Bytes, FeedError> {
        let empty: [(&str, &str); 0] = [];
        let response = self
            .client
            .post(&self.url)
            .form(&empty)
            .send()
            .await
            .map_err(|e| transport_error(&e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&e, self.timeout))?;
        debug!("Fetched {} bytes from {}", body.len(), self.url);
        Ok(body)
    }
}

impl SnapshotSource for GeoFsFeed {
    async fn fetch(&self) -> Result<Snapshot, FeedError> {
        let body = self.fetch_raw().await?;
        Snapshot::from_slice(&body)
    }
}
