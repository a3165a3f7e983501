use crate::backends::espeak::EspeakBackend;
use crate::backends::{SpeechBackend, SynthesisOptions};
use crate::voice::{Voice, VoiceSettings};

use async_trait::async_trait;
use deunicode::deunicode;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::io::{Cursor, Error, ErrorKind};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::oneshot;

/// Acoustic parameters committed to the synthesizer when an utterance
/// starts. Captured once per utterance; later settings changes do not reach
/// speech already in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakParams {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub voice_id: String,
}

impl From<&VoiceSettings> for SpeakParams {
    fn from(settings: &VoiceSettings) -> Self {
        Self {
            rate: settings.rate,
            pitch: settings.pitch,
            volume: settings.volume,
            voice_id: settings.voice_id.clone(),
        }
    }
}

/// The speech output capability the playback coordinator drives. Exactly one
/// completion per `speak` call: the future resolves when the utterance has
/// finished playing (or failed).
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn speak(&self, text: &str, params: &SpeakParams) -> std::io::Result<()>;

    async fn list_voices(&self) -> std::io::Result<Vec<Voice>>;

    /// Halt the utterance currently playing, if any. Releases the waiting
    /// `speak` call.
    fn stop(&self);

    fn is_available(&self) -> bool;
}

enum PlayCommand {
    Play {
        data: Vec<u8>,
        volume: f32,
        done: oneshot::Sender<std::io::Result<()>>,
    },
}

/// Production synthesizer: delegates waveform generation to a
/// `SpeechBackend` and plays the result on a dedicated audio thread.
pub struct AudioEngine {
    backend: Arc<dyn SpeechBackend>,
    // std channel sender is not Sync, so it sits behind a lock
    tx: Mutex<Sender<PlayCommand>>,
    current: Arc<Mutex<Option<Arc<Sink>>>>,
    voices: Mutex<Option<Vec<Voice>>>,
}

impl AudioEngine {
    pub fn new() -> Self {
        Self::with_backend(Arc::new(EspeakBackend::new()))
    }

    pub fn with_backend(backend: Arc<dyn SpeechBackend>) -> Self {
        let (tx, rx) = channel::<PlayCommand>();
        let current: Arc<Mutex<Option<Arc<Sink>>>> = Arc::new(Mutex::new(None));
        let thread_current = current.clone();

        thread::spawn(move || {
            // Audio stream must live on this thread
            let (_stream, stream_handle) = match OutputStream::try_default() {
                Ok(pair) => pair,
                Err(e) => {
                    eprintln!("Engine: no audio output device found: {}", e);
                    while let Ok(PlayCommand::Play { done, .. }) = rx.recv() {
                        let _ = done.send(Err(Error::new(
                            ErrorKind::NotFound,
                            "no audio output device",
                        )));
                    }
                    return;
                }
            };

            while let Ok(PlayCommand::Play { data, volume, done }) = rx.recv() {
                let result = play_buffer(&stream_handle, &thread_current, data, volume);
                let _ = done.send(result);
            }
        });

        Self {
            backend,
            tx: Mutex::new(tx),
            current,
            voices: Mutex::new(None),
        }
    }

    async fn cached_voices(&self) -> std::io::Result<Vec<Voice>> {
        if let Some(list) = self.voices.lock().unwrap().clone() {
            return Ok(list);
        }

        let backend = self.backend.clone();
        let list = tokio::task::spawn_blocking(move || backend.list_voices())
            .await
            .map_err(|e| Error::new(ErrorKind::Other, e))??;

        *self.voices.lock().unwrap() = Some(list.clone());
        Ok(list)
    }

    /// Resolve a configured voice identity against the enumerated voices.
    /// No match (or an enumeration failure) falls back to the backend
    /// default by returning `None`.
    async fn resolve_voice(&self, voice_id: &str) -> Option<String> {
        if voice_id.is_empty() {
            return None;
        }
        let voices = self.cached_voices().await.ok()?;
        match_voice(&voices, voice_id).map(|v| v.id.clone())
    }

    /// The voice an empty preference is seeded with: the first
    /// natural-language match for the companion's locale, or just the first
    /// voice the backend reports.
    pub async fn preferred_voice(&self) -> Option<Voice> {
        let voices = self.cached_voices().await.ok()?;
        voices
            .iter()
            .find(|v| v.name.to_lowercase().contains("english") || v.language.starts_with("en"))
            .or_else(|| voices.first())
            .cloned()
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Synthesizer for AudioEngine {
    async fn speak(&self, text: &str, params: &SpeakParams) -> std::io::Result<()> {
        let text = deunicode(text);
        let voice = self.resolve_voice(&params.voice_id).await;
        let options = SynthesisOptions {
            rate: params.rate,
            pitch: params.pitch,
            voice,
        };

        let backend = self.backend.clone();
        let data = tokio::task::spawn_blocking(move || backend.synthesize(&text, &options))
            .await
            .map_err(|e| Error::new(ErrorKind::Other, e))??;

        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .lock()
            .unwrap()
            .send(PlayCommand::Play {
                data,
                volume: params.volume,
                done: done_tx,
            })
            .map_err(|_| Error::new(ErrorKind::BrokenPipe, "audio thread is gone"))?;

        done_rx
            .await
            .map_err(|_| Error::new(ErrorKind::BrokenPipe, "audio thread dropped the utterance"))?
    }

    async fn list_voices(&self) -> std::io::Result<Vec<Voice>> {
        self.cached_voices().await
    }

    fn stop(&self) {
        if let Some(sink) = self.current.lock().unwrap().take() {
            sink.stop();
        }
    }

    fn is_available(&self) -> bool {
        self.backend.is_available()
    }
}

fn play_buffer(
    handle: &OutputStreamHandle,
    current: &Mutex<Option<Arc<Sink>>>,
    data: Vec<u8>,
    volume: f32,
) -> std::io::Result<()> {
    let sink = Sink::try_new(handle).map_err(|e| Error::new(ErrorKind::Other, e))?;
    let source =
        Decoder::new(Cursor::new(data)).map_err(|e| Error::new(ErrorKind::InvalidData, e))?;

    sink.set_volume(volume);
    sink.append(source.convert_samples::<f32>());

    let sink = Arc::new(sink);
    *current.lock().unwrap() = Some(sink.clone());

    // Blocks the audio thread until the utterance drains. stop() empties the
    // sink, which also ends this wait.
    sink.sleep_until_end();

    *current.lock().unwrap() = None;
    Ok(())
}

fn match_voice<'a>(voices: &'a [Voice], wanted: &str) -> Option<&'a Voice> {
    let wanted_lower = wanted.to_lowercase();
    voices.iter().find(|v| {
        v.id.eq_ignore_ascii_case(wanted) || v.name.to_lowercase() == wanted_lower
    })
}
