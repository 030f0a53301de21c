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

//! Callsign filtering.
//!
//! A callsign is tracked when it contains any configured pattern
//! (case-insensitive), or when no patterns are configured at all. A separate
//! exclusion list drops known bots by exact (case-insensitive) match before
//! patterns are consulted.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter pattern must not be empty")]
    EmptyPattern,
}

/// Case-insensitive substring match against a pattern set.
///
/// An empty pattern set tracks everything.
#[must_use]
pub fn should_track<S: AsRef<str>>(callsign: &str, patterns: &[S]) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let upper = callsign.to_uppercase();
    patterns
        .iter()
        .any(|p| upper.contains(&p.as_ref().to_uppercase()))
}

/// Pattern set plus hard exclusion list.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CallsignFilter {
    patterns: Vec<String>,
    excluded: Vec<String>,
}

impl CallsignFilter {
    /// Build a filter. Patterns are trimmed; blank patterns are rejected.
    pub fn new(patterns: Vec<String>, excluded: Vec<String>) -> Result<Self, FilterError> {
        let mut filter = Self {
            patterns: Vec::with_capacity(patterns.len()),
            excluded: excluded
                .into_iter()
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        };
        for pattern in patterns {
            filter.add_pattern(&pattern)?;
        }
        Ok(filter)
    }

    /// Whether an entity with this callsign should be tracked.
    #[must_use]
    pub fn allows(&self, callsign: &str) -> bool {
        let lowered = callsign.trim().to_lowercase();
        if self.excluded.iter().any(|e| *e == lowered) {
            return false;
        }
        should_track(callsign, &self.patterns)
    }

    /// Add a pattern. Returns `Ok(false)` if an equal pattern (ignoring case)
    /// is already present.
    pub fn add_pattern(&mut self, pattern: &str) -> Result<bool, FilterError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(FilterError::EmptyPattern);
        }
        if self.patterns.iter().any(|p| p.eq_ignore_ascii_case(pattern)) {
            return Ok(false);
        }
        self.patterns.push(pattern.to_string());
        Ok(true)
    }

    /// Remove a pattern (case-insensitive). Returns whether one was removed.
    pub fn remove_pattern(&mut self, pattern: &str) -> bool {
        let pattern = pattern.trim();
        let before = self.patterns.len();
        self.patterns.retain(|p| !p.eq_ignore_ascii_case(pattern));
        self.patterns.len() != before
    }

    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    #[must_use]
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }
}
