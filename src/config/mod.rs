pub mod model;
pub mod nickname;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

pub use model::{BotConfig, CtcpConfig, DccConfig, LoggingConfig, ServerConfig, TimingConfig};

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("crabbot")
        .join("config.toml")
}

/// Load the config from `path`, or from the default location. A missing
/// default file is created with defaults; a missing explicit file is an error.
pub fn load_config(path: Option<&Path>) -> Result<BotConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let path = config_path();
            if !path.exists() {
                let config = BotConfig::default();
                save_config(&path, &config)?;
                info!(path = %path.display(), "wrote default config");
                return Ok(config);
            }
            path
        }
    };
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: BotConfig =
        toml::from_str(&contents).with_context(|| "Failed to parse config file")?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &BotConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }
    let contents = toml::to_string_pretty(config).with_context(|| "Failed to serialize config")?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_must_exist() {
        let missing = std::env::temp_dir().join("crabbot-no-such-dir/config.toml");
        assert!(load_config(Some(&missing)).is_err());
    }

    #[test]
    fn saved_config_loads_back() {
        let path = std::env::temp_dir()
            .join(format!("crabbot-config-{}", std::process::id()))
            .join("config.toml");
        let mut config = BotConfig::default();
        config.workers = 3;
        save_config(&path, &config).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.workers, 3);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
