// config.rs

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

/// Represents the full configuration of a blackbox session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Display name of the environment (its identity derives from this).
    pub environment_name: String,

    /// Bounded wait between two mailbox polls of an idle agent, in
    /// milliseconds.
    pub poll_interval_ms: u64,

    /// Debug mode flag (enables additional logging).
    pub debug: bool,
}

impl Config {
    /// Returns a default configuration.
    pub fn default() -> Self {
        Self {
            environment_name: "blackbox".to_string(),
            poll_interval_ms: 25,
            debug: false,
        }
    }

    /// The poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Arguments
    /// * `path` - The file path to load the configuration from.
    ///
    /// # Returns
    /// * `Ok(Config)` if the file is successfully read and parsed.
    /// * `Err(Box<dyn std::error::Error>)` if an error occurs.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Saves the current configuration to a JSON file.
    ///
    /// # Arguments
    /// * `path` - The file path to save the configuration to.
    ///
    /// # Returns
    /// * `Ok(())` if the file is successfully written.
    /// * `Err(Box<dyn std::error::Error>)` if an error occurs.
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration() {
        let config = Config::default();
        assert_eq!(config.environment_name, "blackbox");
        assert_eq!(config.poll_interval(), Duration::from_millis(25));
        assert!(!config.debug);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.environment_name = "session-7".to_string();
        config.poll_interval_ms = 5;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.environment_name, "session-7");
        assert_eq!(loaded.poll_interval_ms, 5);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(Config::load(Path::new("does-not-exist.json")).is_err());
    }
}
