//! Planner configuration, loaded from .planner/config.yaml

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Group the plan into steps of actions that can run together
    pub parallel: bool,

    /// Only group the first step of the plan
    pub only_first_step: bool,

    /// Global historical file (relative to project root)
    pub historical_path: Option<PathBuf>,

    /// Cap on ticks for `step --repeat`
    pub max_ticks: Option<usize>,
}

fn default_max_ticks() -> Option<usize> {
    Some(100)
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            only_first_step: false,
            historical_path: None,
            max_ticks: default_max_ticks(),
        }
    }
}

impl PlannerConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        Ok(config)
    }

    /// Load from project root (looks for .planner/config.yaml)
    pub fn load_from_project(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(".planner/config.yaml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn resolve_paths(&mut self, project_root: &Path) {
        if let Some(path) = &mut self.historical_path {
            *path = project_root.join(&*path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlannerConfig::load_from_project(dir.path()).unwrap();
        assert!(!config.parallel);
        assert_eq!(config.max_ticks, Some(100));
        assert!(config.historical_path.is_none());
    }

    #[test]
    fn yaml_overrides_and_paths_resolve() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".planner")).unwrap();
        std::fs::write(
            dir.path().join(".planner/config.yaml"),
            "parallel: true\nhistorical_path: history.json\n",
        )
        .unwrap();

        let mut config = PlannerConfig::load_from_project(dir.path()).unwrap();
        config.resolve_paths(dir.path());
        assert!(config.parallel);
        assert!(!config.only_first_step);
        assert_eq!(config.max_ticks, Some(100));
        assert_eq!(config.historical_path, Some(dir.path().join("history.json")));
    }

    #[test]
    fn malformed_yaml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "parallel: [not, a, bool]\n").unwrap();

        let error = PlannerConfig::load(&path).unwrap_err();
        assert!(error.to_string().contains("Failed to parse config"));
    }
}
