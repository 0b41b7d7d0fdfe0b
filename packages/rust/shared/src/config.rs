//! Application configuration for the spider-pool generator.
//!
//! User config lives at `~/.spiderpool/spiderpool.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpiderPoolError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "spiderpool.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".spiderpool";

// ---------------------------------------------------------------------------
// Config structs (matching spiderpool.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Page synthesis bounds.
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Domain name → theme tag.
    #[serde(default)]
    pub themes: BTreeMap<String, String>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Database file location.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Pages generated per domain in a bulk run.
    #[serde(default = "default_page_count")]
    pub page_count: u32,

    /// Theme used when a domain has no `[themes]` entry.
    #[serde(default = "default_theme")]
    pub default_theme: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            page_count: default_page_count(),
            default_theme: default_theme(),
        }
    }
}

fn default_database_path() -> String {
    "~/.spiderpool/spiderpool.db".into()
}
fn default_page_count() -> u32 {
    150
}
fn default_theme() -> String {
    "general".into()
}

/// `[synthesis]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default = "default_min_keywords")]
    pub min_keywords: usize,
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,
    /// Heading + paragraph sections per page body.
    #[serde(default = "default_min_sections")]
    pub min_sections: usize,
    #[serde(default = "default_max_sections")]
    pub max_sections: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            min_keywords: default_min_keywords(),
            max_keywords: default_max_keywords(),
            min_sections: default_min_sections(),
            max_sections: default_max_sections(),
        }
    }
}

fn default_min_keywords() -> usize {
    5
}
fn default_max_keywords() -> usize {
    15
}
fn default_min_sections() -> usize {
    3
}
fn default_max_sections() -> usize {
    5
}

impl SynthesisConfig {
    /// Reject empty or inverted ranges.
    pub fn validate(&self) -> Result<()> {
        if self.min_keywords == 0 || self.min_keywords > self.max_keywords {
            return Err(SpiderPoolError::config(format!(
                "invalid keyword range {}..={}",
                self.min_keywords, self.max_keywords
            )));
        }
        if self.min_sections == 0 || self.min_sections > self.max_sections {
            return Err(SpiderPoolError::config(format!(
                "invalid section range {}..={}",
                self.min_sections, self.max_sections
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Runtime generation config (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Domain → theme lookup with a default fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeMap {
    entries: BTreeMap<String, String>,
    default_theme: String,
}

impl ThemeMap {
    pub fn new(entries: BTreeMap<String, String>, default_theme: impl Into<String>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(domain, theme)| (domain.to_ascii_lowercase(), theme))
                .collect(),
            default_theme: default_theme.into(),
        }
    }

    /// Theme for `domain`, or the default theme when unmapped.
    pub fn theme_for(&self, domain: &str) -> &str {
        self.entries
            .get(&domain.to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or(&self.default_theme)
    }

    pub fn default_theme(&self) -> &str {
        &self.default_theme
    }
}

/// Runtime generation configuration.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Pages per domain in a bulk run.
    pub page_count: u32,
    pub synthesis: SynthesisConfig,
    pub themes: ThemeMap,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for GenerationConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            page_count: config.defaults.page_count,
            synthesis: config.synthesis.clone(),
            themes: ThemeMap::new(config.themes.clone(), config.defaults.default_theme.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.spiderpool/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SpiderPoolError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.spiderpool/spiderpool.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SpiderPoolError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        SpiderPoolError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.synthesis.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SpiderPoolError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SpiderPoolError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SpiderPoolError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| SpiderPoolError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("database_path"));
        assert!(toml_str.contains("default_theme"));
    }

    #[test]
    fn config_with_themes() {
        let toml_str = r#"
[defaults]
page_count = 40
default_theme = "news"

[themes]
"pool-a.example.com" = "travel"
"pool-b.example.com" = "finance"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.themes.len(), 2);
        assert_eq!(config.synthesis, SynthesisConfig::default());

        let generation = GenerationConfig::from(&config);
        assert_eq!(generation.page_count, 40);
        assert_eq!(generation.themes.theme_for("pool-a.example.com"), "travel");
        assert_eq!(generation.themes.theme_for("POOL-B.example.com"), "finance");
        assert_eq!(generation.themes.theme_for("unmapped.example.com"), "news");
    }

    #[test]
    fn generation_config_defaults() {
        let generation = GenerationConfig::default();
        assert_eq!(generation.page_count, 150);
        assert_eq!(generation.synthesis.min_keywords, 5);
        assert_eq!(generation.synthesis.max_keywords, 15);
        assert_eq!(generation.themes.default_theme(), "general");
    }

    #[test]
    fn synthesis_range_validation() {
        assert!(SynthesisConfig::default().validate().is_ok());

        let inverted = SynthesisConfig {
            min_keywords: 10,
            max_keywords: 4,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());

        let zero = SynthesisConfig {
            min_sections: 0,
            ..Default::default()
        };
        assert!(zero.validate().unwrap_err().to_string().contains("section range"));
    }

    #[test]
    fn load_config_rejects_bad_ranges() {
        let path = std::env::temp_dir().join(format!("sp_cfg_{}.toml", uuid::Uuid::now_v7()));
        std::fs::write(&path, "[synthesis]\nmin_keywords = 9\nmax_keywords = 2\n").unwrap();
        let result = load_config_from(&path);
        assert!(result.is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/tmp/x.db").unwrap(), PathBuf::from("/tmp/x.db"));
        assert!(expand_home("~/x.db").unwrap().ends_with("x.db"));
    }
}
