//! Configuration loader (figment-based).
//!
//! Resolution chain: built-in defaults → global config
//! (`~/.config/deckmind/config.toml`) → project config
//! (`.deckmind/config.toml`) → environment variables (`DECKMIND_*` prefix).

use std::env;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use tracing::debug;

use super::types::Config;
use crate::types::{PipelineError, Result};

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load() -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("loading global config from {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("loading project config from {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        figment = figment.merge(Env::prefixed("DECKMIND_").split('_').lowercase(true));

        let config: Config = figment
            .extract()
            .map_err(|e| PipelineError::Config(format!("configuration error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| PipelineError::Config(format!("configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn global_dir() -> Option<PathBuf> {
        env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                env::var("HOME")
                    .ok()
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .map(|p| p.join("deckmind"))
    }

    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".deckmind/config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_defaults_with_no_files_present() {
        let config = ConfigLoader::load().unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn env_var_overrides_default() {
        // SAFETY: test is single-threaded with respect to this var and
        // cleans up after itself.
        unsafe {
            std::env::set_var("DECKMIND_LLM_MODEL", "test-model");
        }
        let config = ConfigLoader::load().unwrap();
        assert_eq!(config.llm.model, "test-model");
        unsafe {
            std::env::remove_var("DECKMIND_LLM_MODEL");
        }
    }

    #[test]
    fn loads_project_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[llm]\nbase_url = \"http://localhost:8080/v1\"\nmodel = \"local-model\"\n",
        )
        .unwrap();
        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.llm.model, "local-model");
        assert_eq!(config.llm.base_url, "http://localhost:8080/v1");
    }
}
