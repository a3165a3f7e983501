pub mod espeak;

use crate::voice::Voice;

/// Acoustic knobs applied to a single synthesis run. Rate and pitch are the
/// user's multipliers; each backend maps them onto its own native scale.
/// Volume is not here on purpose: it is applied at playback time.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub rate: f32,
    pub pitch: f32,
    pub voice: Option<String>,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            voice: None,
        }
    }
}

/// Trait that all speech synthesis backends must implement.
/// This allows us to plug in different engines behind the audio engine.
pub trait SpeechBackend: Send + Sync {
    /// Returns the unique ID of the backend (e.g., "espeak-ng")
    fn id(&self) -> &'static str;

    /// Synthesize `text` into a WAV byte buffer
    fn synthesize(&self, text: &str, options: &SynthesisOptions) -> std::io::Result<Vec<u8>>;

    /// Returns the list of voices this backend can speak with
    fn list_voices(&self) -> std::io::Result<Vec<Voice>>;

    /// Whether the backend can actually run on this machine
    fn is_available(&self) -> bool;
}
