use keyviz::config::{VizConfig, CONFIG_FILE};
use keyviz::decode::load_sound;
use keyviz::error::VizError;
use keyviz::ingest::ingest;
use keyviz::logging::{self, LogDiversion};
use keyviz::playback;
use keyviz::presentation::PresentationLoop;
use keyviz::scheduler::EventScheduler;
use keyviz::session::PlaybackSession;
use keyviz::terminal::TerminalFrontend;
use keyviz::transcriber::{GoertzelTranscriber, Transcriber};

use clap::Parser;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "keyviz")]
#[command(about = "Transcribe an audio file and play it back as a fading keyboard")]
struct Cli {
    /// Audio file to visualize (WAV natively, anything else through ffmpeg)
    audio_file: PathBuf,
}

fn main() {
    logging::init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        error!("{}", e);
        eprintln!("keyviz: {}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), VizError> {
    let config = VizConfig::load(&std::env::current_dir().unwrap_or_default().join(CONFIG_FILE));

    info!("═══════════════════════════════════════════════");
    info!("  KEYVIZ v{}", env!("CARGO_PKG_VERSION"));
    info!("  Input: {:?}", cli.audio_file);
    info!("  Decode: {} Hz, {} ch", config.sample_rate, config.channels);
    info!("  Invalid events: {:?}", config.invalid_events);
    info!("═══════════════════════════════════════════════");

    // ─── Decode and analyse the whole file up front ─────────────────
    let pcm = load_sound(&cli.audio_file, config.sample_rate, config.channels, &config.ffmpeg_bin)?;

    let mut transcriber = GoertzelTranscriber::new(config.analysis.clone());
    let notes = transcriber.transcribe(&pcm.analysis_channel(), pcm.sample_rate)?;

    let ingested = ingest(&notes, config.invalid_events)?;
    let scheduler: EventScheduler = ingested.events.into_iter().collect();

    // ─── Display + audio, started from the same zero point ──────────
    // Declared before the frontend so logging returns to stderr only after
    // the terminal is restored.
    let _log_diversion = match LogDiversion::start(Path::new(&config.log_file)) {
        Ok(d) => {
            info!("Logging to {} while the keyboard is shown", config.log_file);
            Some(d)
        }
        Err(e) => {
            warn!("Cannot open log file {}: {}; logging to stderr", config.log_file, e);
            None
        }
    };
    let frontend = TerminalFrontend::open(config.screen_width, config.screen_height, config.background)?;
    let mut session = PlaybackSession::open(frontend, |faults| playback::start(&pcm, faults))?;
    let mut presentation = PresentationLoop::new(scheduler, &session, config.loop_settings());

    presentation.run(&mut session)?;
    Ok(())
}
