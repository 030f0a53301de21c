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

//! JSON query API over the watcher state.
//!
//! Everything here is read-only except the filter endpoints, which edit the
//! live callsign patterns and write them back to the configuration file.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use zone_tracker::{CallsignFilter, EntityView, FeedError, FeedStats, FilterError, WatchState, Zone};

use crate::aircraft_types::AircraftTypeMap;
use crate::config::ConfigStore;
use crate::upstream::GeoFsFeed;

/// Shared handles for the request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub watch: Arc<WatchState>,
    /// Aircraft unseen for longer than this are left out of `/api/aircraft`.
    pub display_window: Duration,
    pub aircraft_types: Arc<AircraftTypeMap>,
    pub config: Arc<ConfigStore>,
    /// Upstream used by the raw passthrough endpoint.
    pub upstream: Option<GeoFsFeed>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Upstream(FeedError),
    Unavailable(&'static str),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Upstream(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.to_string()),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<FilterError> for ApiError {
    fn from(e: FilterError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AircraftItem {
    #[serde(flatten)]
    view: EntityView,
    aircraft_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AircraftResponse {
    aircraft: Vec<AircraftItem>,
    shown: usize,
    reported_total: u64,
    last_fetch: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PatternRequest {
    pattern: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/aircraft", get(aircraft))
        .route("/api/zones", get(zones))
        .route("/api/acmap", get(acmap))
        .route("/api/stats", get(stats))
        .route("/api/map", get(raw_map))
        .route("/api/filters", get(filters).post(add_filter))
        .route("/api/filters/{pattern}", delete(remove_filter))
        .with_state(state)
}

async fn aircraft(State(state): State<AppState>) -> Json<AircraftResponse> {
    let stats = state.watch.stats();
    let aircraft: Vec<AircraftItem> = state
        .watch
        .visible_entities(Some(state.display_window))
        .into_iter()
        .map(|view| {
            let aircraft_name = view
                .entity
                .aircraft_type
                .as_deref()
                .and_then(|id| state.aircraft_types.lookup(id))
                .map(str::to_string);
            AircraftItem { view, aircraft_name }
        })
        .collect();

    Json(AircraftResponse {
        shown: aircraft.len(),
        aircraft,
        reported_total: stats.reported_total,
        last_fetch: stats.last_fetch,
        last_error: stats.last_error,
    })
}

async fn zones(State(state): State<AppState>) -> Json<Vec<Zone>> {
    Json(state.watch.zones().list_zones())
}

async fn acmap(State(state): State<AppState>) -> Json<AircraftTypeMap> {
    Json(state.aircraft_types.as_ref().clone())
}

async fn stats(State(state): State<AppState>) -> Json<FeedStats> {
    Json(state.watch.stats())
}

async fn raw_map(State(state): State<AppState>) -> Result<Response, ApiError> {
    let upstream = state
        .upstream
        .as_ref()
        .ok_or(ApiError::Unavailable("no upstream configured"))?;
    let body = upstream.fetch_raw().await.map_err(ApiError::Upstream)?;
    Ok((
        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
        body,
    )
        .into_response())
}

async fn filters(State(state): State<AppState>) -> Json<CallsignFilter> {
    Json(state.watch.filter())
}

fn persist_patterns(state: &AppState) -> CallsignFilter {
    let filter = state.watch.filter();
    if let Err(e) = state.config.save_patterns(filter.patterns()) {
        warn!("Failed to save callsign patterns: {e}");
    }
    filter
}

async fn add_filter(
    State(state): State<AppState>,
    Json(request): Json<PatternRequest>,
) -> Result<(StatusCode, Json<CallsignFilter>), ApiError> {
    if state.watch.add_pattern(&request.pattern)? {
        Ok((StatusCode::CREATED, Json(persist_patterns(&state))))
    } else {
        Ok((StatusCode::OK, Json(state.watch.filter())))
    }
}

async fn remove_filter(
    State(state): State<AppState>,
    Path(pattern): Path<String>,
) -> Result<Json<CallsignFilter>, ApiError> {
    if !state.watch.remove_pattern(&pattern) {
        return Err(ApiError::NotFound(format!("no such pattern '{pattern}'")));
    }
    info!("Callsign pattern '{pattern}' removed through the API");
    Ok(Json(persist_patterns(&state)))
}
