use super::{SpeechBackend, SynthesisOptions};
use crate::voice::Voice;

use regex::Regex;
use std::io::{Error, ErrorKind, Result};
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

// espeak-ng native defaults the multipliers are applied against
const BASE_WPM: f32 = 175.0;
const BASE_PITCH: f32 = 50.0;

const SYNTH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct EspeakBackend;

impl EspeakBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EspeakBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechBackend for EspeakBackend {
    fn id(&self) -> &'static str {
        "espeak-ng"
    }

    fn synthesize(&self, text: &str, options: &SynthesisOptions) -> Result<Vec<u8>> {
        let speed = (BASE_WPM * options.rate).round() as u32;
        let pitch = (BASE_PITCH * options.pitch).round().clamp(0.0, 99.0) as u32;

        let mut cmd = Command::new("espeak-ng");
        cmd.arg("--stdout")
            .arg("-s")
            .arg(speed.to_string())
            .arg("-p")
            .arg(pitch.to_string());

        if let Some(voice) = options.voice.as_deref() {
            cmd.arg("-v").arg(voice);
        }

        let mut child = cmd
            .arg(text)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        match child.wait_timeout(SYNTH_TIMEOUT)? {
            Some(status) => {
                let output = child.wait_with_output()?;
                if status.success() {
                    Ok(output.stdout)
                } else {
                    let err_msg = String::from_utf8_lossy(&output.stderr);
                    Err(Error::new(
                        ErrorKind::Other,
                        format!("espeak error: {}", err_msg),
                    ))
                }
            }
            None => {
                // Timeout occurred, kill the process
                let _ = child.kill();
                let _ = child.wait();
                Err(Error::new(
                    ErrorKind::TimedOut,
                    format!("Backend timed out after {}s", SYNTH_TIMEOUT.as_secs()),
                ))
            }
        }
    }

    fn list_voices(&self) -> Result<Vec<Voice>> {
        let output = Command::new("espeak-ng").arg("--voices").output()?;

        if !output.status.success() {
            let err_msg = String::from_utf8_lossy(&output.stderr);
            return Err(Error::new(
                ErrorKind::Other,
                format!("espeak --voices failed: {}", err_msg),
            ));
        }

        // Table rows look like:
        //  5  en-gb           --/M      English (Great Britain)   gmw/en
        // The pty column is numeric, which is how we skip the header line.
        let row = Regex::new(r"^\s*\d+\s+(?P<lang>[\w-]+)\s+\S+\s+(?P<name>\S+)")
            .map_err(|e| Error::new(ErrorKind::Other, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut voices = Vec::new();
        for line in stdout.lines() {
            if let Some(caps) = row.captures(line) {
                let lang = caps["lang"].to_string();
                voices.push(Voice {
                    id: lang.clone(),
                    name: caps["name"].replace('_', " "),
                    language: lang,
                });
            }
        }

        Ok(voices)
    }

    fn is_available(&self) -> bool {
        Command::new("espeak-ng")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_row_parsing() {
        let row = Regex::new(r"^\s*\d+\s+(?P<lang>[\w-]+)\s+\S+\s+(?P<name>\S+)").unwrap();

        let caps = row
            .captures(" 5  en-gb           --/M      English_(GB)      gmw/en")
            .expect("row should match");
        assert_eq!(&caps["lang"], "en-gb");
        assert_eq!(&caps["name"], "English_(GB)");

        // Header line must not match
        assert!(row
            .captures("Pty Language       Age/Gender VoiceName          File")
            .is_none());
    }
}
