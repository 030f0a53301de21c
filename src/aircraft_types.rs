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

use std::collections::BTreeMap;
use std::time::Duration;

use lazy_static::lazy_static;
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;

lazy_static! {
    static ref DEFAULT_TYPES: BTreeMap<String, String> = [
        ("1", "Piper Cub"),
        ("2", "Cessna Citation"),
        ("4", "F-16"),
        ("5", "Cessna 172"),
        ("10", "Airbus A320"),
        ("13", "Airbus A380"),
        ("18", "Boeing 737"),
        ("24", "Boeing 747/777 (large)"),
        ("29", "B737 Classic"),
        ("1013", "Aero L-1011 (community?)"),
    ]
    .into_iter()
    .map(|(id, name)| (id.to_string(), name.to_string()))
    .collect();
}

/// Aircraft type id to display name.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct AircraftTypeMap {
    names: BTreeMap<String, String>,
}

impl Default for AircraftTypeMap {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AircraftTypeMap {
    /// The small built-in table of common types.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            names: DEFAULT_TYPES.clone(),
        }
    }

    /// Build from a JSON object. Keys and values are stringified; any other
    /// shape yields `None`.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let names = object
            .iter()
            .map(|(id, name)| {
                let name = match name {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (id.clone(), name)
            })
            .collect();
        Some(Self { names })
    }

    /// Download a replacement table, falling back to the built-in one.
    pub async fn fetch(url: &str, timeout: Duration) -> Self {
        match Self::try_fetch(url, timeout).await {
            Ok(map) => {
                info!("Loaded {} aircraft types from {url}", map.len());
                map
            }
            Err(e) => {
                warn!("Failed to load aircraft types from {url}: {e}, using built-in table");
                Self::builtin()
            }
        }
    }

    async fn try_fetch(url: &str, timeout: Duration) -> Result<Self, Box<dyn std::error::Error>> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let value: Value = client.get(url).send().await?.error_for_status()?.json().await?;
        Self::from_json(&value).ok_or_else(|| "expected a JSON object".into())
    }

    /// Display name for a type id.
    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }
}
