use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Represents one text-to-speech voice as reported by the synthesizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub language: String,
}

/// Speech parameters for the current session.
/// `voice_id` empty means "use the synthesizer default".
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    pub enabled: bool,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub voice_id: String,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: 1.0,
            pitch: 1.0,
            volume: 0.8,
            voice_id: String::new(),
        }
    }
}

impl VoiceSettings {
    /// Force every field back into its valid range.
    fn clamp(&mut self) {
        self.rate = self.rate.clamp(0.5, 2.0);
        self.pitch = self.pitch.clamp(0.5, 2.0);
        self.volume = self.volume.clamp(0.0, 1.0);
    }
}

/// Partial update applied over the current settings. Fields left as `None`
/// keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoiceSettingsUpdate {
    pub enabled: Option<bool>,
    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub volume: Option<f32>,
    pub voice_id: Option<String>,
}

/// Session-lifetime store for the user's voice settings. One instance per
/// coordinator; playback snapshots it at the start of each utterance, so an
/// update never alters speech already in flight.
pub struct VoiceSettingsStore {
    inner: RwLock<VoiceSettings>,
}

impl VoiceSettingsStore {
    pub fn new(initial: VoiceSettings) -> Self {
        let mut settings = initial;
        settings.clamp();
        Self {
            inner: RwLock::new(settings),
        }
    }

    pub fn get(&self) -> VoiceSettings {
        self.inner.read().unwrap().clone()
    }

    /// Merge `update` into the current settings and return the new value.
    pub fn update(&self, update: VoiceSettingsUpdate) -> VoiceSettings {
        let mut settings = self.inner.write().unwrap();
        if let Some(enabled) = update.enabled {
            settings.enabled = enabled;
        }
        if let Some(rate) = update.rate {
            settings.rate = rate;
        }
        if let Some(pitch) = update.pitch {
            settings.pitch = pitch;
        }
        if let Some(volume) = update.volume {
            settings.volume = volume;
        }
        if let Some(voice_id) = update.voice_id {
            settings.voice_id = voice_id;
        }
        settings.clamp();
        settings.clone()
    }
}

impl Default for VoiceSettingsStore {
    fn default() -> Self {
        Self::new(VoiceSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = VoiceSettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.rate, 1.0);
        assert_eq!(settings.pitch, 1.0);
        assert_eq!(settings.volume, 0.8);
        assert!(settings.voice_id.is_empty());
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let store = VoiceSettingsStore::default();
        let updated = store.update(VoiceSettingsUpdate {
            rate: Some(1.5),
            ..Default::default()
        });
        assert_eq!(updated.rate, 1.5);
        assert_eq!(updated.volume, 0.8);
        assert!(updated.enabled);
        assert_eq!(store.get(), updated);
    }

    #[test]
    fn test_update_clamps_out_of_range() {
        let store = VoiceSettingsStore::default();
        let updated = store.update(VoiceSettingsUpdate {
            rate: Some(9.0),
            pitch: Some(0.1),
            volume: Some(-1.0),
            ..Default::default()
        });
        assert_eq!(updated.rate, 2.0);
        assert_eq!(updated.pitch, 0.5);
        assert_eq!(updated.volume, 0.0);
    }
}
