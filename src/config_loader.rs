use crate::coordinator::CoordinatorConfig;
use crate::voice::VoiceSettings;

use config::{Config, File};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::sync::RwLock;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Settings {
    // Chat backend
    pub backend_url: String,
    pub api_token: String,
    pub request_timeout_secs: u64,
    pub memory_size: usize,
    // Voice output defaults (per-session; the store owns them after startup)
    pub enable_voice: bool,
    pub voice_rate: f32,
    pub voice_pitch: f32,
    pub voice_volume: f32,
    pub voice_name: String,
    // Playback robustness
    pub utterance_timeout_secs: u64, // 0 disables the watchdog
    pub advance_delay_ms: u64,
    // Voice input
    pub stt_record_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000".to_string(),
            api_token: String::new(),
            request_timeout_secs: 30,
            memory_size: 50,
            enable_voice: true,
            voice_rate: 1.0,
            voice_pitch: 1.0,
            voice_volume: 0.8,
            voice_name: String::new(),
            utterance_timeout_secs: 0,
            advance_delay_ms: 4,
            stt_record_secs: 3,
        }
    }
}

lazy_static! {
    pub static ref SETTINGS: RwLock<Settings> =
        RwLock::new(Settings::new().expect("Failed to load settings"));
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder()
            // Connect to defaults
            .set_default("backend_url", "http://localhost:8000")?
            .set_default("api_token", "")?
            .set_default("request_timeout_secs", 30)?
            .set_default("memory_size", 50)?
            .set_default("enable_voice", true)?
            .set_default("voice_rate", 1.0)?
            .set_default("voice_pitch", 1.0)?
            .set_default("voice_volume", 0.8)?
            .set_default("voice_name", "")?
            .set_default("utterance_timeout_secs", 0)?
            .set_default("advance_delay_ms", 4)?
            .set_default("stt_record_secs", 3)?
            // Merge with local config file (if exists)
            .add_source(File::with_name("Companion").required(false));

        if let Some(config_dir) = dirs::config_dir() {
            let user_file = config_dir.join("rama-voice/Companion");
            builder = builder.add_source(
                File::with_name(&user_file.to_string_lossy()).required(false),
            );
        }

        // Merge with environment variables (e.g. RAMA_BACKEND_URL)
        let builder = builder.add_source(config::Environment::with_prefix("RAMA"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if !(0.0..=1.0).contains(&self.voice_volume) {
            return Err(config::ConfigError::Message(format!(
                "Invalid voice_volume: {}. Must be between 0.0 and 1.0",
                self.voice_volume
            )));
        }
        if !(0.5..=2.0).contains(&self.voice_rate) {
            return Err(config::ConfigError::Message(format!(
                "Invalid voice_rate: {}. Must be between 0.5 and 2.0",
                self.voice_rate
            )));
        }
        if !(0.5..=2.0).contains(&self.voice_pitch) {
            return Err(config::ConfigError::Message(format!(
                "Invalid voice_pitch: {}. Must be between 0.5 and 2.0",
                self.voice_pitch
            )));
        }
        if self.memory_size == 0 {
            return Err(config::ConfigError::Message(
                "memory_size must be greater than 0".to_string(),
            ));
        }
        if self.stt_record_secs == 0 {
            return Err(config::ConfigError::Message(
                "stt_record_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// The voice settings a fresh session starts with.
    pub fn voice_settings(&self) -> VoiceSettings {
        VoiceSettings {
            enabled: self.enable_voice,
            rate: self.voice_rate,
            pitch: self.voice_pitch,
            volume: self.voice_volume,
            voice_id: self.voice_name.clone(),
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            utterance_timeout: match self.utterance_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            advance_delay: Duration::from_millis(self.advance_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_load() {
        let settings = Settings::new().expect("Failed to load settings");
        assert!(settings.memory_size > 0);
        assert!((0.5..=2.0).contains(&settings.voice_rate));
    }

    #[test]
    #[serial]
    fn test_env_override() {
        std::env::set_var("RAMA_VOICE_RATE", "1.5");
        let settings = Settings::new().expect("Failed to load settings");
        std::env::remove_var("RAMA_VOICE_RATE");
        assert_eq!(settings.voice_rate, 1.5);
    }

    #[test]
    fn test_validate_rejects_bad_volume() {
        let settings = Settings {
            voice_volume: 1.5,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_watchdog_disabled_by_default() {
        let settings = Settings::default();
        assert!(settings.coordinator_config().utterance_timeout.is_none());
    }
}
