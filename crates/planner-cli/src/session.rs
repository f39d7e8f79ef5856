//! Session files: one domain and one problem in a single JSON document.

use std::path::Path;

use anyhow::{Context, Result};
use planner_core::{Domain, Historical, Problem};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub domain: Domain,
    pub problem: Problem,
}

impl Session {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session from {}", path.display()))?;
        let session: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session from {}", path.display()))?;
        Ok(session)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize session")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write session to {}", path.display()))
    }
}

/// Cross-session action counts. A missing file is an empty history.
pub fn load_historical(path: &Path) -> Result<Historical> {
    if !path.exists() {
        return Ok(Historical::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read historical from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse historical from {}", path.display()))
}

pub fn save_historical(path: &Path, historical: &Historical) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content =
        serde_json::to_string_pretty(historical).context("Failed to serialize historical")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write historical to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: &str = r#"{
        "domain": {
            "actions": {
                "buildWall": {
                    "parameters": ["?s"],
                    "precondition": "foundationsSet(?s)",
                    "effect": { "effect": { "add": "wallsBuilt(?s)" } }
                }
            }
        },
        "problem": {
            "goal_stack": { "0": [ { "objective": "wallsBuilt(site1)" } ] },
            "world_state": { "facts": ["foundationsSet(site1)"] }
        }
    }"#;

    #[test]
    fn session_loads_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, SESSION).unwrap();

        let session = Session::load(&path).unwrap();
        assert!(session.domain.action("buildWall").is_some());
        assert_eq!(session.problem.goal_stack.len(), 1);

        let copy = dir.path().join("copy.json");
        session.save(&copy).unwrap();
        assert_eq!(Session::load(&copy).unwrap(), session);
    }

    #[test]
    fn historical_defaults_to_empty_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/history.json");
        assert!(load_historical(&path).unwrap().is_empty());

        let mut historical = Historical::new();
        historical.notify_action_done("buildWall");
        save_historical(&path, &historical).unwrap();
        assert_eq!(load_historical(&path).unwrap().count("buildWall"), 1);
    }

    #[test]
    fn unreadable_session_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let error = Session::load(&path).unwrap_err();
        assert!(error.to_string().contains("missing.json"));
    }
}
