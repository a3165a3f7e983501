use clap::Parser;
use rama_voice::chat::{self, ChatClient, ChatMessage};
use rama_voice::config_loader;
use rama_voice::coordinator::PlaybackCoordinator;
use rama_voice::engine::{AudioEngine, Synthesizer};
use rama_voice::listen::VoiceInput;
use rama_voice::voice::VoiceSettingsUpdate;

use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Interactive companion for the Rama elder-care assistant
#[derive(Parser)]
#[command(name = "rama-voice")]
#[command(author = "Rama AI")]
#[command(version)]
#[command(about = "Talk with the Rama assistant, out loud or by keyboard", long_about = None)]
struct Cli {
    /// Chat backend base URL (overrides configuration)
    #[arg(long)]
    backend_url: Option<String>,

    /// Voice to speak with (id or name, see /voices)
    #[arg(long)]
    voice: Option<String>,

    /// Speech rate multiplier (0.5 - 2.0)
    #[arg(long)]
    rate: Option<f32>,

    /// Start with voice output off
    #[arg(long)]
    no_voice: bool,
}

const OPENING_PROMPTS: &[&str] = &[
    "Who are we caring for today? Search an elder by name.",
    "Want to add a medication reminder for an elder?",
    "Ask me about an elder's profile to view details.",
    "Need a quick health summary? Type your question.",
    "Set a reminder like: 'Paracetamol 650mg at 8:00 PM'.",
    "Tell me what you need and I'll guide you step by step.",
];

fn opening_prompt() -> &'static str {
    let idx = chrono::Utc::now().timestamp_millis() as usize % OPENING_PROMPTS.len();
    OPENING_PROMPTS[idx]
}

fn print_prompt() {
    print!("you> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Some(url) = cli.backend_url {
        config_loader::SETTINGS.write().unwrap().backend_url = url;
    }

    let (mut voice_settings, coordinator_config, stt_record_secs) = {
        let settings = config_loader::SETTINGS.read().unwrap();
        (
            settings.voice_settings(),
            settings.coordinator_config(),
            settings.stt_record_secs,
        )
    };
    if let Some(rate) = cli.rate {
        voice_settings.rate = rate;
    }
    if let Some(voice) = cli.voice {
        voice_settings.voice_id = voice;
    }
    if cli.no_voice {
        voice_settings.enabled = false;
    }

    let engine = Arc::new(AudioEngine::new());
    if voice_settings.enabled && !engine.is_available() {
        eprintln!("Voice output unavailable (espeak-ng not found); continuing without speech.");
        voice_settings.enabled = false;
    }
    if voice_settings.enabled && voice_settings.voice_id.is_empty() {
        if let Some(voice) = engine.preferred_voice().await {
            voice_settings.voice_id = voice.id;
        }
    }

    let coordinator =
        PlaybackCoordinator::new(engine.clone(), voice_settings, coordinator_config);
    let chat_client = ChatClient::new();
    let voice_input = Arc::new(VoiceInput::new(stt_record_secs));

    println!("Rama: {}", opening_prompt());
    println!("Commands: /listen  /voices  /voice on|off  /rate N  /stop  /quit");

    // Live subtitle: echo the highlighted prefix while a message is spoken
    let mut state_rx = coordinator.subscribe();
    tokio::spawn(async move {
        let mut was_speaking = false;
        while state_rx.changed().await.is_ok() {
            let state = state_rx.borrow_and_update().clone();
            if state.is_speaking && !state.highlighted_text.is_empty() {
                print!("\r  >> {}", state.highlighted_text);
                let _ = std::io::stdout().flush();
                was_speaking = true;
            } else if was_speaking && !state.is_speaking {
                println!();
                was_speaking = false;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_prompt();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim().to_string();
        if input.is_empty() {
            print_prompt();
            continue;
        }

        match input.as_str() {
            "/quit" | "/exit" => break,
            "/stop" => coordinator.stop_all(),
            "/voices" => match engine.list_voices().await {
                Ok(voices) => {
                    for v in voices {
                        println!("  {:<12} {} [{}]", v.id, v.name, v.language);
                    }
                }
                Err(e) => eprintln!("Could not list voices: {}", e),
            },
            "/voice on" => {
                coordinator.update_settings(VoiceSettingsUpdate {
                    enabled: Some(true),
                    ..Default::default()
                });
                println!("Voice output on.");
            }
            "/voice off" => {
                coordinator.update_settings(VoiceSettingsUpdate {
                    enabled: Some(false),
                    ..Default::default()
                });
                println!("Voice output off.");
            }
            "/listen" => {
                let input_handle = voice_input.clone();
                match tokio::task::spawn_blocking(move || input_handle.listen()).await? {
                    Ok(text) if !text.is_empty() => {
                        println!("you (voice)> {}", text);
                        exchange(&chat_client, &coordinator, &text).await;
                    }
                    Ok(_) => println!("(heard nothing)"),
                    Err(e) => eprintln!("{}", e),
                }
            }
            _ if input.starts_with("/rate ") => {
                match input["/rate ".len()..].trim().parse::<f32>() {
                    Ok(rate) => {
                        let updated = coordinator.update_settings(VoiceSettingsUpdate {
                            rate: Some(rate),
                            ..Default::default()
                        });
                        println!("Speech rate set to {:.2}.", updated.rate);
                    }
                    Err(_) => eprintln!("Usage: /rate <0.5-2.0>"),
                }
            }
            _ => exchange(&chat_client, &coordinator, &input).await,
        }
        print_prompt();
    }

    Ok(())
}

async fn exchange(chat_client: &ChatClient, coordinator: &PlaybackCoordinator, text: &str) {
    let message = chat_client.ask(text).await;
    render(&message);

    // The connection apology is displayed but not voiced
    if !message.content.is_empty() && message.content != chat::OFFLINE_REPLY {
        coordinator.enqueue_speech(&message.content, &message.id);
    }
}

fn render(message: &ChatMessage) {
    if !message.content.is_empty() {
        println!("Rama: {}", message.content);
    }

    if let Some(profile) = &message.profile {
        println!("  Profile:");
        if let Some(name) = &profile.name {
            println!("    Name: {}", name);
        }
        if let Some(age) = profile.age {
            println!("    Age: {}", age);
        }
        if let Some(email) = &profile.email {
            println!("    Email: {}", email);
        }
        if let Some(phone) = &profile.phone {
            println!("    Phone: {}", phone);
        }
        if let Some(address) = &profile.address {
            println!("    Address: {}", address);
        }
        if let Some(notes) = &profile.notes {
            println!("    Notes: {}", notes);
        }
    }

    if let Some(reminders) = &message.reminders {
        if !reminders.is_empty() {
            println!("  Upcoming medications:");
            for r in reminders {
                let name = r.medication_name.as_deref().unwrap_or("(medication)");
                let dosage = r
                    .dosage
                    .as_ref()
                    .map(|d| format!(" ({})", d))
                    .unwrap_or_default();
                let time = r.send_time.as_deref().unwrap_or("");
                let frequency = r
                    .frequency
                    .as_ref()
                    .map(|f| format!(" - {}", f))
                    .unwrap_or_default();
                println!("    {}{}  {}{}", name, dosage, time, frequency);
            }
        }
    }
}
