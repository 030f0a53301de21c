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

//! Static zone definitions.
//!
//! Zones are validated once when the registry is built and never change
//! afterwards. Adding or editing a zone requires a restart.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::{self, GeoPoint};

/// Errors raised while building the zone registry.
#[derive(Debug, Error, PartialEq)]
pub enum ZoneError {
    #[error("zone name must not be empty")]
    EmptyName,

    #[error("duplicate zone name: {0}")]
    DuplicateName(String),

    #[error("zone '{name}' has {count} vertices, at least 3 are required")]
    TooFewVertices { name: String, count: usize },

    #[error("zone '{name}' vertex {index} is not a valid coordinate ({lat}, {lon})")]
    InvalidVertex {
        name: String,
        index: usize,
        lat: f64,
        lon: f64,
    },
}

/// A named polygon tested for containment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    #[serde(rename = "coords")]
    pub vertices: Vec<GeoPoint>,
}

impl Zone {
    #[must_use]
    pub fn new(name: impl Into<String>, vertices: Vec<GeoPoint>) -> Self {
        Self {
            name: name.into(),
            vertices,
        }
    }

    /// Whether the point lies inside this zone.
    #[must_use]
    pub fn contains(&self, point: GeoPoint) -> bool {
        geo::contains(point, &self.vertices)
    }

    fn validate(&self) -> Result<(), ZoneError> {
        if self.name.trim().is_empty() {
            return Err(ZoneError::EmptyName);
        }
        if self.vertices.len() < 3 {
            return Err(ZoneError::TooFewVertices {
                name: self.name.clone(),
                count: self.vertices.len(),
            });
        }
        if let Some((index, v)) = self.vertices.iter().enumerate().find(|(_, v)| !v.is_valid()) {
            return Err(ZoneError::InvalidVertex {
                name: self.name.clone(),
                index,
                lat: v.lat,
                lon: v.lon,
            });
        }
        Ok(())
    }
}

/// Immutable, ordered collection of zones.
///
/// Registry order is the evaluation order for containment and therefore the
/// emission order of transition events.
#[derive(Debug, Clone, Default)]
pub struct ZoneRegistry {
    zones: Vec<Zone>,
}

impl ZoneRegistry {
    /// Build a registry, rejecting malformed or duplicate zones.
    pub fn new(zones: Vec<Zone>) -> Result<Self, ZoneError> {
        let mut seen = HashSet::new();
        for zone in &zones {
            zone.validate()?;
            if !seen.insert(zone.name.as_str()) {
                return Err(ZoneError::DuplicateName(zone.name.clone()));
            }
        }
        Ok(Self { zones })
    }

    /// All zones in registry order.
    #[must_use]
    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Owned copy of the zone list for the query surface.
    #[must_use]
    pub fn list_zones(&self) -> Vec<Zone> {
        self.zones.clone()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Containment of `point` in every zone, in registry order.
    #[must_use]
    pub fn membership(&self, point: GeoPoint) -> Vec<bool> {
        self.zones.iter().map(|z| z.contains(point)).collect()
    }
}
