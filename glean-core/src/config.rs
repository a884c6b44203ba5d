//! Configuration system for Glean.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/glean/config.toml` and/or `.glean/config.toml`
//! in the workspace directory.

use crate::error::ConfigError;
use crate::research::Provenance;
use crate::research::selection::SelectionOptions;
use crate::research::stopping::StoppingConfig;
use crate::research::strategist::MAX_ROUNDS;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".glean";
const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GleanConfig {
    pub research: ResearchConfig,
    pub fetch: FetchConfig,
    pub stopping: StoppingConfig,
    pub selection: SelectionOptions,
}

/// Round budgets and safety-override floors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Sources requested across providers in round 1.
    pub initial_round_target: usize,
    /// Sources requested across providers in later, gap-filling rounds.
    pub followup_round_target: usize,
    /// Round 1 continues while cumulative sources are below this.
    pub coverage_floor: usize,
    /// Any round with new sources continues while cumulative sources are
    /// below this. Also drives the reflection fallback.
    pub absolute_floor: usize,
    /// Hard ceiling on rounds, at most 4.
    pub max_rounds_ceiling: u32,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            initial_round_target: 25,
            followup_round_target: 15,
            coverage_floor: 20,
            absolute_floor: 15,
            max_rounds_ceiling: MAX_ROUNDS,
        }
    }
}

/// Per-provider call settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub timeout_ms: u64,
    /// Relative weight when splitting a round target across providers.
    pub share: f64,
}

/// Fetch settings keyed by provenance type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub peer_reviewed: ProviderSettings,
    pub preprint: ProviderSettings,
    pub clinical_trial: ProviderSettings,
    pub web: ProviderSettings,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            peer_reviewed: ProviderSettings {
                timeout_ms: 3000,
                share: 0.4,
            },
            preprint: ProviderSettings {
                timeout_ms: 3000,
                share: 0.2,
            },
            clinical_trial: ProviderSettings {
                timeout_ms: 3000,
                share: 0.2,
            },
            web: ProviderSettings {
                timeout_ms: 10_000,
                share: 0.2,
            },
        }
    }
}

impl FetchConfig {
    pub fn settings(&self, provenance: Provenance) -> &ProviderSettings {
        match provenance {
            Provenance::PeerReviewed => &self.peer_reviewed,
            Provenance::Preprint => &self.preprint,
            Provenance::ClinicalTrial => &self.clinical_trial,
            Provenance::Web => &self.web,
        }
    }
}

impl GleanConfig {
    /// Check every section, collecting all problems into one error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        let r = &self.research;
        if r.initial_round_target == 0 || r.followup_round_target == 0 {
            problems.push("research round targets must be positive".to_string());
        }
        if !(1..=MAX_ROUNDS).contains(&r.max_rounds_ceiling) {
            problems.push(format!(
                "research.max_rounds_ceiling must be between 1 and {MAX_ROUNDS}, got {}",
                r.max_rounds_ceiling
            ));
        }

        for provenance in Provenance::ALL {
            let s = self.fetch.settings(provenance);
            if s.timeout_ms == 0 {
                problems.push(format!("fetch.{provenance}.timeout_ms must be positive"));
            }
            if !s.share.is_finite() || s.share < 0.0 {
                problems.push(format!(
                    "fetch.{provenance}.share must be a non-negative number, got {}",
                    s.share
                ));
            }
        }

        if self.stopping.comprehensive_threshold == 0 {
            problems.push("stopping.comprehensive_threshold must be positive".to_string());
        }

        let sel = &self.selection;
        if sel.base_limit == 0 {
            problems.push("selection.base_limit must be positive".to_string());
        }
        if sel.extended_limit < sel.base_limit {
            problems.push(format!(
                "selection.extended_limit ({}) must be >= base_limit ({})",
                sel.extended_limit, sel.base_limit
            ));
        }
        if sel.token_budget == 0 {
            problems.push("selection.token_budget must be positive".to_string());
        }
        if sel.min_relevance_score > 100 || sel.high_quality_threshold > 100 {
            problems.push("selection score thresholds must be within 0..=100".to_string());
        }
        if !(sel.semantic_similarity_threshold > 0.0 && sel.semantic_similarity_threshold <= 1.0) {
            problems.push(format!(
                "selection.semantic_similarity_threshold must be in (0, 1], got {}",
                sel.semantic_similarity_threshold
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                message: problems.join("; "),
            })
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "glean", "glean")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// Load configuration from layered sources, then validate it.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `GLEAN_`, sections split on `__`)
/// 3. Workspace-local config (`.glean/config.toml`)
/// 4. User config (`~/.config/glean/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&GleanConfig>,
) -> Result<GleanConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(GleanConfig::default()));

    if let Some(user_config) = user_config_path().filter(|p| p.exists()) {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // GLEAN_SELECTION__TOKEN_BUDGET, GLEAN_FETCH__WEB__TIMEOUT_MS, ...
    figment = figment.merge(Env::prefixed("GLEAN_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: GleanConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Check whether a user-level or workspace-level config file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}

/// Write the default configuration to `<workspace>/.glean/config.toml`.
///
/// Refuses to overwrite an existing file. Returns the written path.
pub fn write_default_config(workspace: &Path) -> crate::Result<PathBuf> {
    let path = workspace_config_path(workspace);
    if path.exists() {
        return Err(ConfigError::Invalid {
            message: format!("{} already exists", path.display()),
        }
        .into());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let content = to_toml(&GleanConfig::default())?;
    std::fs::write(&path, content)?;
    Ok(path)
}

/// Render a configuration as TOML.
pub fn to_toml(config: &GleanConfig) -> Result<String, ConfigError> {
    toml::to_string_pretty(config).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = GleanConfig::default();
        assert_eq!(config.research.initial_round_target, 25);
        assert_eq!(config.research.followup_round_target, 15);
        assert_eq!(config.fetch.web.timeout_ms, 10_000);
        assert_eq!(config.fetch.settings(Provenance::Preprint).timeout_ms, 3000);
        assert_eq!(config.stopping.comprehensive_threshold, 30);
        assert_eq!(config.selection.token_budget, 12_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = GleanConfig::default();
        let toml_str = to_toml(&config).unwrap();
        let deserialized: GleanConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: GleanConfig = toml::from_str("[selection]\ntoken_budget = 500\n").unwrap();
        assert_eq!(config.selection.token_budget, 500);
        assert_eq!(config.selection.base_limit, 15);
        assert_eq!(config.research, ResearchConfig::default());
    }

    #[test]
    fn test_validate_collects_problems() {
        let mut config = GleanConfig::default();
        config.selection.extended_limit = 5;
        config.research.max_rounds_ceiling = 9;
        config.fetch.web.share = -1.0;
        let err = config.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("extended_limit"));
        assert!(message.contains("max_rounds_ceiling"));
        assert!(message.contains("fetch.web.share"));
    }

    #[test]
    fn test_load_config_workspace_layer() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".glean")).unwrap();
        std::fs::write(
            workspace_config_path(dir.path()),
            "[research]\ninitial_round_target = 40\n\n[fetch.web]\ntimeout_ms = 2500\nshare = 0.5\n",
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.research.initial_round_target, 40);
        assert_eq!(config.fetch.web.timeout_ms, 2500);
        assert_eq!(config.research.followup_round_target, 15);
        assert!(config_exists(Some(dir.path())));
    }

    #[test]
    fn test_load_config_rejects_invalid_workspace_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".glean")).unwrap();
        std::fs::write(
            workspace_config_path(dir.path()),
            "[selection]\nbase_limit = 30\nextended_limit = 10\n",
        )
        .unwrap();

        let err = load_config(Some(dir.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_load_config_overrides_win() {
        let overrides = GleanConfig {
            selection: SelectionOptions {
                token_budget: 4000,
                ..Default::default()
            },
            ..Default::default()
        };
        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.selection.token_budget, 4000);
    }

    #[test]
    fn test_write_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_default_config(dir.path()).unwrap();
        assert!(path.ends_with(".glean/config.toml"));
        let loaded = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(loaded.selection, SelectionOptions::default());
        assert!(write_default_config(dir.path()).is_err());
    }
}
