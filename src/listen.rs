use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::watch;

/// One-shot voice input: record from the default microphone, hand the
/// capture to an installed transcriber, return the final transcript. At
/// most one transcript per call; no retry.
pub struct VoiceInput {
    record_secs: u64,
    listening_tx: watch::Sender<bool>,
}

impl VoiceInput {
    pub fn new(record_secs: u64) -> Self {
        let (listening_tx, _) = watch::channel(false);
        Self {
            record_secs,
            listening_tx,
        }
    }

    /// True while a recording is in progress; the view uses this for its
    /// listening indicator.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.listening_tx.subscribe()
    }

    pub fn is_supported(&self) -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    /// Record one utterance and transcribe it. Blocking; run it on a
    /// blocking thread from async code.
    pub fn listen(&self) -> Result<String, String> {
        if !self.is_supported() {
            return Err("Speech recognition is not supported here (no input device).".to_string());
        }

        self.listening_tx.send_replace(true);
        let result = self.record_and_transcribe();
        self.listening_tx.send_replace(false);
        result
    }

    fn record_and_transcribe(&self) -> Result<String, String> {
        println!("Listen: Starting to listen...");

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| "Error: No input device found".to_string())?;

        let config = device
            .default_input_config()
            .map_err(|e| format!("Error getting input config: {}", e))?;

        // Buffer to store recorded samples
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let buffer_clone = buffer.clone();

        let err_fn = move |err| {
            eprintln!("Listen: stream error: {}", err);
        };

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config.clone().into(),
                move |data: &[f32], _: &_| {
                    if let Ok(mut b) = buffer_clone.lock() {
                        b.extend_from_slice(data);
                    }
                },
                err_fn,
                None,
            ),
            _ => return Err("Error: Only F32 sample format supported for now".to_string()),
        };

        let stream = stream.map_err(|e| format!("Error building stream: {}", e))?;
        stream
            .play()
            .map_err(|e| format!("Error starting stream: {}", e))?;

        println!("Listen: Recording...");
        thread::sleep(Duration::from_secs(self.record_secs));
        drop(stream); // Stop recording

        let wav_path = std::env::temp_dir().join("rama_voice_input.wav");
        let captured = buffer.lock().unwrap();

        let spec = hound::WavSpec {
            channels: config.channels(),
            sample_rate: config.sample_rate().0,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut writer = hound::WavWriter::create(&wav_path, spec)
            .map_err(|e| format!("Error saving WAV: {}", e))?;
        for &sample in captured.iter() {
            let _ = writer.write_sample(sample);
        }
        writer
            .finalize()
            .map_err(|e| format!("Error saving WAV: {}", e))?;

        println!("Listen: Recorded {} samples", captured.len());

        transcribe(&wav_path).map(|t| t.trim().to_string())
    }
}

fn transcribe(path: &Path) -> Result<String, String> {
    let txt_path = path.with_extension("txt");

    // PRIORITY 1: Vosk (Low Latency / Offline)
    let vosk_check = Command::new("vosk-transcriber")
        .arg("-i")
        .arg(path)
        .arg("-o")
        .arg(&txt_path)
        .output();

    if let Ok(out) = vosk_check {
        if out.status.success() {
            return read_transcript(&txt_path);
        }
    }

    // PRIORITY 2: Whisper (High Accuracy)
    let output_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let whisper_check = Command::new("whisper")
        .arg(path)
        .arg("--model")
        .arg("tiny")
        .arg("--output_format")
        .arg("txt")
        .arg("--output_dir")
        .arg(output_dir)
        .output();

    match whisper_check {
        Ok(out) => {
            if out.status.success() {
                read_transcript(&txt_path)
            } else {
                let err = String::from_utf8_lossy(&out.stderr);
                Err(format!("Transcription failed: {}", err))
            }
        }
        Err(_) => Err(
            "No speech recognizer found. Install 'vosk' (pip install vosk) or 'openai-whisper'."
                .to_string(),
        ),
    }
}

fn read_transcript(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path)
        .map_err(|e| format!("Transcriber ran but transcript unreadable: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "remind me about paracetamol").unwrap();

        let text = read_transcript(&path).unwrap();
        assert_eq!(text.trim(), "remind me about paracetamol");
    }

    #[test]
    fn test_read_transcript_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_transcript(&dir.path().join("nope.txt")).is_err());
    }

    #[test]
    fn test_listening_flag_starts_low() {
        let input = VoiceInput::new(3);
        assert!(!*input.subscribe().borrow());
    }
}
