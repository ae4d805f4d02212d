//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use commentline_harvest::HarvestConfig;
use serde::Deserialize;

/// Global configuration for commentline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub harvest: HarvestConfig,
    pub source: SourceConfig,
    pub http: HttpConfig,
}

/// Where comments come from; CLI flags take precedence
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SourceConfig {
    /// URL with an `{id}` placeholder; `${VAR}` references are expanded
    #[serde(deserialize_with = "deserialize_env_vars")]
    pub url_template: Option<String>,
    /// Directory of captured `{id}.jsonl` / `{id}.txt` files
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Seconds without data before a response counts as stalled
    pub read_timeout: u64,
    pub connect_timeout: u64,
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            read_timeout: 20,
            connect_timeout: 30,
            user_agent: None,
        }
    }
}

/// Deserialize a string whose `${VAR}` references come from the environment
fn deserialize_env_vars<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    opt.map(|s| expand_env_vars(&s).map_err(serde::de::Error::custom))
        .transpose()
}

/// Expand every `${VAR}`; an unset variable is an error
fn expand_env_vars(s: &str) -> Result<String, String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| format!("unterminated variable reference in {s:?}"))?;
        let name = &after[..end];
        let value =
            std::env::var(name).map_err(|_| format!("environment variable {name} is not set"))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./commentline.toml (current directory)
    /// 2. ~/.config/commentline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("commentline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "commentline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commentline_harvest::SelectionPolicy;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.harvest.batch_size, 100);
        assert_eq!(config.http.read_timeout, 20);
        assert!(config.source.url_template.is_none());
    }

    #[test]
    fn expand_embedded_vars() {
        std::env::set_var("COMMENTLINE_TEST_KEY", "k123");
        assert_eq!(
            expand_env_vars("https://x.test/{id}?key=${COMMENTLINE_TEST_KEY}&n=1").unwrap(),
            "https://x.test/{id}?key=k123&n=1"
        );
        std::env::remove_var("COMMENTLINE_TEST_KEY");
    }

    #[test]
    fn expand_literal() {
        assert_eq!(expand_env_vars("literal").unwrap(), "literal");
    }

    #[test]
    fn expand_missing_or_unterminated() {
        assert!(expand_env_vars("${NONEXISTENT_VAR_12345}").is_err());
        assert!(expand_env_vars("abc ${OPEN").is_err());
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[harvest]
input = "ids/all_video_ids.txt"
output_dir = "/tmp/comments"
workers = 5
policy = "mixed_only"

[harvest.cooldown]
every_batches = 10

[source]
dir = "captured"

[http]
read_timeout = 60
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.harvest.input, PathBuf::from("ids/all_video_ids.txt"));
        assert_eq!(config.harvest.workers, 5);
        assert_eq!(config.harvest.policy, SelectionPolicy::MixedOnly);
        assert_eq!(config.harvest.cooldown.every_batches, 10);
        assert_eq!(config.source.dir, Some(PathBuf::from("captured")));
        assert_eq!(config.http.read_timeout, 60);
        assert_eq!(config.http.connect_timeout, 30);
    }

    #[test]
    fn from_file_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[harvest\n").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }
}
