use std::path::PathBuf;

use quaver_core::SessionConfig;

#[derive(serde::Serialize, serde::Deserialize, Default)]
pub(crate) struct AppConfig {
    #[serde(default)]
    pub session: SessionConfig,
}

pub(crate) fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quaver")
        .join("config.toml")
}

/// Missing or unreadable config falls back to defaults
pub(crate) fn load_config() -> AppConfig {
    let path = config_path();
    let Ok(text) = std::fs::read_to_string(&path) else {
        return AppConfig::default();
    };
    match toml::from_str(&text) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "ignoring malformed config");
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_table() {
        let config: AppConfig = toml::from_str("[session]\nbpm = 96.0\n").unwrap();
        assert_eq!(config.session.bpm, 96.0);
        assert_eq!(config.session.sample_rate, 44100.0);
    }

    #[test]
    fn test_empty_file_is_default() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.session, SessionConfig::default());
    }
}
