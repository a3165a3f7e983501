use crate::engine::{SpeakParams, Synthesizer};
use crate::queue::{Utterance, UtteranceQueue};
use crate::voice::{VoiceSettings, VoiceSettingsStore, VoiceSettingsUpdate};

use std::io::{Error, ErrorKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, sleep, timeout, Instant};

/// Floor for the subtitle cadence so the reveal stays perceptible even for
/// long utterances.
const MIN_WORD_DURATION_MS: u64 = 100;

/// What the chat view reads to render the currently spoken message and its
/// word-by-word highlight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackState {
    pub is_speaking: bool,
    pub active_message_id: Option<String>,
    /// Number of words of the active utterance revealed so far
    pub highlighted_words: usize,
    /// The revealed words joined back together, ready for display
    pub highlighted_text: String,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Abandon an utterance whose completion never fires. `None` preserves
    /// the wait-forever behavior.
    pub utterance_timeout: Option<Duration>,
    /// Scheduling yield between one utterance finishing and the next
    /// starting. Not a semantic delay.
    pub advance_delay: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            utterance_timeout: None,
            advance_delay: Duration::from_millis(4),
        }
    }
}

struct DrainState {
    queue: UtteranceQueue,
    draining: bool,
}

struct Inner {
    synth: Arc<dyn Synthesizer>,
    settings: VoiceSettingsStore,
    drain: Mutex<DrainState>,
    // Bumped by stop_all; utterances carry the generation they were started
    // under and go quiet when it moves on
    generation: AtomicU64,
    state_tx: watch::Sender<PlaybackState>,
    config: CoordinatorConfig,
}

/// Serializes queued utterances into a single audible stream and drives the
/// subtitle highlight in lockstep. One instance per chat session; clones
/// share it.
#[derive(Clone)]
pub struct PlaybackCoordinator {
    inner: Arc<Inner>,
}

impl PlaybackCoordinator {
    pub fn new(
        synth: Arc<dyn Synthesizer>,
        initial_settings: VoiceSettings,
        config: CoordinatorConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::default());
        Self {
            inner: Arc::new(Inner {
                synth,
                settings: VoiceSettingsStore::new(initial_settings),
                drain: Mutex::new(DrainState {
                    queue: UtteranceQueue::new(),
                    draining: false,
                }),
                generation: AtomicU64::new(0),
                state_tx,
                config,
            }),
        }
    }

    pub fn get_settings(&self) -> VoiceSettings {
        self.inner.settings.get()
    }

    pub fn update_settings(&self, update: VoiceSettingsUpdate) -> VoiceSettings {
        self.inner.settings.update(update)
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.inner.state_tx.subscribe()
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.state_tx.borrow().clone()
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.state_tx.borrow().is_speaking
    }

    /// Queue `text` for speech. A no-op for blank text or while voice output
    /// is disabled. If the coordinator is idle, draining starts immediately.
    /// Must be called from within a tokio runtime.
    pub fn enqueue_speech(&self, text: &str, message_id: &str) {
        if !self.inner.settings.get().enabled {
            return;
        }

        let mut drain = self.inner.drain.lock().unwrap();
        if !drain.queue.push(text, message_id) {
            return;
        }

        if !drain.draining {
            drain.draining = true;
            drop(drain);

            // The queue was empty before this push, so the head is the entry
            // just added; surface it as active before the drain task runs.
            let active = message_id.to_string();
            self.inner.state_tx.send_modify(|state| {
                state.is_speaking = true;
                state.active_message_id = Some(active);
                state.highlighted_words = 0;
                state.highlighted_text.clear();
            });

            let inner = self.inner.clone();
            tokio::spawn(async move {
                inner.drain_loop().await;
            });
        }
    }

    /// Clear every pending utterance and halt the one playing. The
    /// coordinator is idle when this returns; utterances enqueued afterwards
    /// play normally.
    pub fn stop_all(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.drain.lock().unwrap().queue.clear();
        self.inner.synth.stop();
        self.inner.publish_idle();
    }
}

impl Inner {
    async fn drain_loop(self: Arc<Self>) {
        loop {
            let entry = {
                let mut drain = self.drain.lock().unwrap();
                match drain.queue.pop() {
                    Some(entry) => entry,
                    None => {
                        drain.draining = false;
                        drop(drain);
                        self.publish_idle();
                        return;
                    }
                }
            };

            let gen = self.generation.load(Ordering::SeqCst);
            self.clone().speak_entry(entry, gen).await;
        }
    }

    /// One code path for "entry finished" no matter how it ended: natural
    /// completion, disabled fast-forward, synthesis failure, or watchdog.
    async fn speak_entry(self: Arc<Self>, entry: Utterance, gen: u64) {
        // Snapshot: this entry keeps these parameters even if the user
        // changes settings while it plays
        let settings = self.settings.get();

        if !settings.enabled {
            // Disabled mid-queue: drain the rest without speaking
            sleep(self.config.advance_delay).await;
            return;
        }

        let words: Vec<String> = entry
            .text
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let word_duration = word_duration(settings.rate, words.len());

        if self.generation.load(Ordering::SeqCst) == gen {
            let active = entry.message_id.clone();
            self.state_tx.send_modify(|state| {
                state.is_speaking = true;
                state.active_message_id = Some(active);
                state.highlighted_words = 0;
                state.highlighted_text.clear();
            });
        }

        let ticker = {
            let inner = self.clone();
            tokio::spawn(async move {
                inner.run_ticker(words, word_duration, gen).await;
            })
        };

        let params = SpeakParams::from(&settings);
        let result = match self.config.utterance_timeout {
            Some(limit) => match timeout(limit, self.synth.speak(&entry.text, &params)).await {
                Ok(result) => result,
                Err(_) => {
                    self.synth.stop();
                    Err(Error::new(
                        ErrorKind::TimedOut,
                        "utterance completion never fired",
                    ))
                }
            },
            None => self.synth.speak(&entry.text, &params).await,
        };

        if let Err(e) = result {
            // Fail open: log and move on so one bad utterance never stalls
            // the queue
            eprintln!(
                "Coordinator: utterance for message {} failed: {}",
                entry.message_id, e
            );
        }

        ticker.abort();
        sleep(self.config.advance_delay).await;
    }

    /// The cosmetic half of an utterance: reveal one more word per tick.
    /// The acoustic completion is authoritative; the spawner aborts this
    /// task when speech ends, revealed or not.
    async fn run_ticker(self: Arc<Self>, words: Vec<String>, period: Duration, gen: u64) {
        if words.is_empty() {
            return;
        }

        let mut ticker = interval_at(Instant::now() + period, period);
        let mut revealed = 0usize;

        while revealed < words.len() {
            ticker.tick().await;
            if self.generation.load(Ordering::SeqCst) != gen {
                return;
            }
            revealed += 1;
            let prefix = words[..revealed].join(" ");
            self.state_tx.send_modify(|state| {
                state.highlighted_words = revealed;
                state.highlighted_text = prefix;
            });
        }
    }

    fn publish_idle(&self) {
        self.state_tx.send_modify(|state| {
            state.is_speaking = false;
            state.active_message_id = None;
            state.highlighted_words = 0;
            state.highlighted_text.clear();
        });
    }
}

/// Per-word reveal interval derived from the configured speech rate,
/// floored so it stays perceptible.
pub fn word_duration(rate: f32, word_count: usize) -> Duration {
    if word_count == 0 {
        return Duration::from_millis(MIN_WORD_DURATION_MS);
    }
    let per_word = (rate * 1000.0) / word_count as f32;
    Duration::from_millis(per_word.max(MIN_WORD_DURATION_MS as f32) as u64)
}
