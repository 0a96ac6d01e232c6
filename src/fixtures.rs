//! Named JSON fixtures.
//!
//! `stories` and `empty` ship with the crate; a fixtures directory can add
//! more or replace them (`<dir>/<name>.json`).

use crate::error::{HarnessError, HarnessResult};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

const BUNDLED: &[(&str, &str)] = &[
    ("stories", include_str!("../fixtures/stories.json")),
    ("empty", include_str!("../fixtures/empty.json")),
];

/// Registry of fixture payloads by name.
#[derive(Debug, Clone, Default)]
pub struct Fixtures {
    entries: HashMap<String, serde_json::Value>,
}

impl Fixtures {
    /// Registry holding only the bundled fixtures.
    pub fn bundled() -> HarnessResult<Self> {
        let mut fixtures = Self::default();
        for (name, content) in BUNDLED {
            fixtures.insert(name, serde_json::from_str(content)?);
        }
        Ok(fixtures)
    }

    /// Bundled fixtures overlaid with every `*.json` file in `dir`.
    pub fn load(dir: Option<&Path>) -> HarnessResult<Self> {
        let mut fixtures = Self::bundled()?;
        let Some(dir) = dir else {
            return Ok(fixtures);
        };

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let content = std::fs::read_to_string(&path)?;
                debug!(fixture = name, path = %path.display(), "Loaded fixture");
                fixtures.insert(name, serde_json::from_str(&content)?);
            }
        }
        Ok(fixtures)
    }

    pub fn insert(&mut self, name: &str, value: serde_json::Value) {
        self.entries.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> HarnessResult<&serde_json::Value> {
        self.entries
            .get(name)
            .ok_or_else(|| HarnessError::UnknownFixture(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}
