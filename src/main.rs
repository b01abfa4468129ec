use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use uli_assistant::speech::{
    Microphone, OpenAiSynthesizer, PLAYBACK_SAMPLE_RATE, Speaker, Synthesizer,
};
use uli_assistant::{Config, Daemon};

/// Uli - wake-word voice assistant with an animated avatar
#[derive(Parser)]
#[command(name = "uli", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable voice features (console-only control, no audio hardware)
    #[arg(long, env = "ULI_DISABLE_VOICE")]
    disable_voice: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test speech synthesis
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hola, esto es una prueba de síntesis de voz.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,uli_assistant=warn",
        1 => "info,uli_assistant=info",
        2 => "info,uli_assistant=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker(),
            Command::TestTts { text } => test_tts(&text).await,
        };
    }

    let config = Config::load_with_options(cli.disable_voice)?;
    tracing::debug!(?config, "loaded configuration");

    let daemon = Daemon::new(config)?;
    daemon.run().await?;

    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Probando el micrófono durante {duration} segundos...");
    println!("¡Habla al micrófono!\n");

    let mut mic = Microphone::open()?;
    mic.start()?;
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = mic.drain();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Pico: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    mic.stop();

    println!("\n---");
    println!("Si el medidor se movió, el micrófono funciona.");
    println!("Si el RMS quedó en 0, revisa:");
    println!("  1. ¿Está conectado el micrófono?");
    println!("  2. Ejecuta: pactl info | grep 'Default Source'");
    println!("  3. Ejecuta: arecord -l (para listar dispositivos)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
fn test_speaker() -> anyhow::Result<()> {
    println!("Probando la salida de audio...");
    println!("Deberías oír un tono de 440Hz durante 2 segundos\n");

    let speaker = Speaker::open()?;

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (PLAYBACK_SAMPLE_RATE as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Reproduciendo {} muestras...", samples.len());
    speaker.play_samples(samples)?;

    println!("\n---");
    println!("Si oíste el tono, los altavoces funcionan.");
    println!("Si no, revisa:");
    println!("  1. Ejecuta: pactl info | grep 'Default Sink'");
    println!("  2. Ejecuta: pactl list sinks short");

    Ok(())
}

/// Test speech synthesis end to end
async fn test_tts(text: &str) -> anyhow::Result<()> {
    println!("Probando síntesis con el texto: \"{text}\"\n");

    let config = Config::load()?;
    let api_key = config
        .voice
        .openai_api_key
        .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY no configurada"))?;

    let synthesizer = OpenAiSynthesizer::new(
        api_key,
        config.voice.tts_model,
        config.voice.tts_voice,
        config.voice.tts_speed,
    )?;

    println!("Sintetizando...");
    let mp3 = synthesizer.synthesize(text).await?;
    println!("Recibidos {} bytes de audio", mp3.len());

    if mp3.len() > 3 {
        println!(
            "Primeros 4 bytes: {:02x} {:02x} {:02x} {:02x}",
            mp3[0], mp3[1], mp3[2], mp3[3]
        );
    }

    println!("Reproduciendo...");
    let speaker = Speaker::open()?;
    speaker.play_mp3(&mp3)?;

    println!("\n---");
    println!("Si oíste la voz, la síntesis funciona.");

    Ok(())
}
