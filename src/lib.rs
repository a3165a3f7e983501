//! Voice companion core for the Rama elder-care assistant.
//!
//! The centerpiece is the [`coordinator::PlaybackCoordinator`], which
//! serializes queued utterances into one audible stream and drives a
//! word-by-word subtitle highlight in lockstep. Around it sit the local
//! synthesizer ([`engine::AudioEngine`]), the chat backend client
//! ([`chat::ChatClient`]), and microphone input ([`listen::VoiceInput`]).

pub mod backends;
pub mod chat;
pub mod config_loader;
pub mod coordinator;
pub mod engine;
pub mod listen;
pub mod queue;
pub mod voice;
