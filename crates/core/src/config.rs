use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timecode::FrameRate;

/// Default file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "ltcpanel.json";

/// Engine settings. Missing fields in a config file fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Timecode
    pub frame_rate: FrameRate,

    // Decoder (incoming LTC)
    pub decoder_program: String,
    pub decoder_args: Vec<String>,
    pub signal_timeout_ms: u64,
    pub auto_restart_decoder: bool,
    pub decoder_restart_delay_ms: u64,

    // Encoder (outgoing LTC)
    pub encoder_program: String,
    /// `{fps}` and `{start}` are substituted on every launch.
    pub encoder_args: Vec<String>,
    pub terminate_grace_ms: u64,

    // Mirror display
    pub display_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            frame_rate: FrameRate::Fps25,

            decoder_program: "ltcdump".to_string(),
            decoder_args: vec!["-f".to_string(), "-".to_string()],
            signal_timeout_ms: 1000,
            auto_restart_decoder: false,
            decoder_restart_delay_ms: 2000,

            encoder_program: "ltcgen".to_string(),
            encoder_args: ["-f", "{fps}", "-s", "{start}", "-"]
                .iter()
                .map(|arg| arg.to_string())
                .collect(),
            terminate_grace_ms: 500,

            display_enabled: false,
        }
    }
}

impl Settings {
    pub fn signal_timeout(&self) -> Duration {
        Duration::from_millis(self.signal_timeout_ms)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    pub fn decoder_restart_delay(&self) -> Duration {
        Duration::from_millis(self.decoder_restart_delay_ms)
    }
}

/// Loads and persists [`Settings`] as JSON.
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

/// Available configuration options with validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSchema {
    pub timecode: TimecodeConfigSchema,
    pub decoder: DecoderConfigSchema,
    pub encoder: EncoderConfigSchema,
    pub display: DisplayConfigSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimecodeConfigSchema {
    pub frame_rate: ConfigOption<FrameRate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfigSchema {
    pub decoder_program: ConfigOption<String>,
    pub signal_timeout_ms: ConfigOption<u64>,
    pub auto_restart_decoder: ConfigOption<bool>,
    pub decoder_restart_delay_ms: ConfigOption<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfigSchema {
    pub encoder_program: ConfigOption<String>,
    pub terminate_grace_ms: ConfigOption<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfigSchema {
    pub display_enabled: ConfigOption<bool>,
}

/// Configuration option with validation and available choices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigOption<T> {
    pub default: T,
    pub valid_range: Option<(T, T)>,
    pub valid_choices: Option<Vec<T>>,
    pub description: String,
    pub requires_restart: bool,
}

/// Persisted configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    pub settings: Settings,
    pub created_at: String,
    pub modified_at: String,
}

impl ConfigManager {
    /// Defaults to [`DEFAULT_CONFIG_FILE`] in the working directory.
    pub fn new(config_path: Option<PathBuf>) -> Self {
        let config_path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        Self {
            config_path,
            settings: Settings::default(),
        }
    }

    /// Load settings, writing a default file first if none exists.
    pub fn load(&mut self) -> Result<Settings, ConfigError> {
        if !self.config_path.exists() {
            self.save()?;
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config_file: ConfigFile =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if config_file.version != env!("CARGO_PKG_VERSION") {
            log::warn!(
                "Config file version {} doesn't match application version {}. Using defaults for new settings.",
                config_file.version,
                env!("CARGO_PKG_VERSION")
            );
        }

        self.settings = config_file.settings;
        Ok(self.settings.clone())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            if parent != Path::new("") && parent != Path::new(".") {
                fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
            }
        }

        let now = chrono::Utc::now().to_rfc3339();
        let config_file = ConfigFile {
            version: env!("CARGO_PKG_VERSION").to_string(),
            settings: self.settings.clone(),
            created_at: now.clone(),
            modified_at: now,
        };

        let content = serde_json::to_string_pretty(&config_file)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(&self.config_path, content)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Validate, then replace and persist the settings.
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), ConfigError> {
        Self::validate_settings(&settings).map_err(ConfigError::ValidationError)?;
        self.settings = settings;
        self.save()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn schema() -> ConfigSchema {
        let defaults = Settings::default();

        ConfigSchema {
            timecode: TimecodeConfigSchema {
                frame_rate: ConfigOption {
                    default: defaults.frame_rate,
                    valid_range: None,
                    valid_choices: Some(FrameRate::ALL.to_vec()),
                    description: "LTC frame rate (non-drop)".to_string(),
                    requires_restart: true,
                },
            },
            decoder: DecoderConfigSchema {
                decoder_program: ConfigOption {
                    default: defaults.decoder_program,
                    valid_range: None,
                    valid_choices: None,
                    description: "Program that decodes incoming LTC to text lines".to_string(),
                    requires_restart: true,
                },
                signal_timeout_ms: ConfigOption {
                    default: defaults.signal_timeout_ms,
                    valid_range: Some((100, 10_000)),
                    valid_choices: None,
                    description: "Report signal loss after this long without decoder output"
                        .to_string(),
                    requires_restart: true,
                },
                auto_restart_decoder: ConfigOption {
                    default: defaults.auto_restart_decoder,
                    valid_range: None,
                    valid_choices: None,
                    description: "Relaunch the decoder when it exits".to_string(),
                    requires_restart: false,
                },
                decoder_restart_delay_ms: ConfigOption {
                    default: defaults.decoder_restart_delay_ms,
                    valid_range: Some((100, 60_000)),
                    valid_choices: None,
                    description: "Delay before relaunching the decoder".to_string(),
                    requires_restart: false,
                },
            },
            encoder: EncoderConfigSchema {
                encoder_program: ConfigOption {
                    default: defaults.encoder_program,
                    valid_range: None,
                    valid_choices: None,
                    description: "Program that generates outgoing LTC".to_string(),
                    requires_restart: true,
                },
                terminate_grace_ms: ConfigOption {
                    default: defaults.terminate_grace_ms,
                    valid_range: Some((0, 10_000)),
                    valid_choices: None,
                    description: "Time a process gets to exit after SIGTERM before it is killed"
                        .to_string(),
                    requires_restart: false,
                },
            },
            display: DisplayConfigSchema {
                display_enabled: ConfigOption {
                    default: defaults.display_enabled,
                    valid_range: None,
                    valid_choices: None,
                    description: "Show the timecode mirror at startup".to_string(),
                    requires_restart: false,
                },
            },
        }
    }

    pub fn validate_settings(settings: &Settings) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let schema = Self::schema();

        if let Some(choices) = &schema.timecode.frame_rate.valid_choices {
            if !choices.contains(&settings.frame_rate) {
                errors.push(format!("frame_rate must be one of: {:?}", choices));
            }
        }

        if settings.decoder_program.trim().is_empty() {
            errors.push("decoder_program must not be empty".to_string());
        }

        if settings.encoder_program.trim().is_empty() {
            errors.push("encoder_program must not be empty".to_string());
        }

        let ranges = [
            (
                "signal_timeout_ms",
                settings.signal_timeout_ms,
                schema.decoder.signal_timeout_ms.valid_range,
            ),
            (
                "decoder_restart_delay_ms",
                settings.decoder_restart_delay_ms,
                schema.decoder.decoder_restart_delay_ms.valid_range,
            ),
            (
                "terminate_grace_ms",
                settings.terminate_grace_ms,
                schema.encoder.terminate_grace_ms.valid_range,
            ),
        ];

        for (name, value, range) in ranges {
            if let Some((min, max)) = range {
                if value < min || value > max {
                    errors.push(format!("{} must be between {} and {}", name, min, max));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
    #[error("Failed to parse config file: {0}")]
    ParseError(String),
    #[error("Failed to serialize config: {0}")]
    SerializeError(String),
    #[error("Config validation errors: {}", .0.join(", "))]
    ValidationError(Vec<String>),
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_config_manager_new() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.json");

        let manager = ConfigManager::new(Some(config_path.clone()));
        assert_eq!(manager.config_path(), config_path);
        assert_eq!(manager.settings(), &Settings::default());
    }

    #[test]
    fn test_load_creates_default_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("ltcpanel.json");

        let mut manager = ConfigManager::new(Some(config_path.clone()));
        assert_eq!(manager.load().unwrap(), Settings::default());
        assert!(config_path.exists());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.json");

        let mut manager = ConfigManager::new(Some(config_path.clone()));

        let settings = Settings {
            frame_rate: FrameRate::Fps30,
            encoder_program: "/opt/ltc/bin/ltcgen".to_string(),
            auto_restart_decoder: true,
            ..Settings::default()
        };
        manager.update_settings(settings).unwrap();

        let mut manager2 = ConfigManager::new(Some(config_path));
        let loaded = manager2.load().unwrap();

        assert_eq!(loaded.frame_rate, FrameRate::Fps30);
        assert_eq!(loaded.encoder_program, "/opt/ltc/bin/ltcgen");
        assert!(loaded.auto_restart_decoder);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("partial.json");
        fs::write(
            &config_path,
            r#"{
                "version": "0.0.1",
                "settings": { "frame_rate": "24" },
                "created_at": "",
                "modified_at": ""
            }"#,
        )
        .unwrap();

        let mut manager = ConfigManager::new(Some(config_path));
        let loaded = manager.load().unwrap();
        assert_eq!(loaded.frame_rate, FrameRate::Fps24);
        assert_eq!(loaded.decoder_program, "ltcdump");
    }

    #[test]
    fn test_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("broken.json");
        fs::write(&config_path, "{ not json").unwrap();

        let mut manager = ConfigManager::new(Some(config_path));
        assert!(matches!(manager.load(), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validation() {
        let mut settings = Settings::default();
        assert!(ConfigManager::validate_settings(&settings).is_ok());

        settings.signal_timeout_ms = 50;
        assert!(ConfigManager::validate_settings(&settings).is_err());

        settings.signal_timeout_ms = 1000;
        settings.encoder_program = "  ".to_string();
        let errors = ConfigManager::validate_settings(&settings).unwrap_err();
        assert_eq!(errors, vec!["encoder_program must not be empty".to_string()]);
    }

    #[test]
    fn test_update_rejects_invalid_settings() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = ConfigManager::new(Some(temp_dir.path().join("c.json")));

        let settings = Settings {
            terminate_grace_ms: 60_000,
            ..Settings::default()
        };
        assert!(matches!(
            manager.update_settings(settings),
            Err(ConfigError::ValidationError(_))
        ));
        assert_eq!(manager.settings(), &Settings::default());
    }

    #[test]
    fn test_schema_completeness() {
        let schema = ConfigManager::schema();

        assert_eq!(schema.timecode.frame_rate.default, FrameRate::Fps25);
        assert!(schema.decoder.signal_timeout_ms.valid_range.is_some());
        assert!(!schema.encoder.encoder_program.description.is_empty());
        assert!(schema.encoder.terminate_grace_ms.valid_range.is_some());
    }
}
