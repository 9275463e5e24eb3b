//! perception - camera deck -> obstacle classifier -> signal link
//!
//! This process:
//! 1. Connects to the signal link served by `pilot`
//! 2. Reads the deck's unframed JPEG stream and cuts it into frames
//! 3. Classifies each frame and smooths the outputs over a rolling window
//! 4. Sends one smoothed signal per classified frame once the window is warm

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use obstacle_pilot::config::PilotConfig;
use obstacle_pilot::{
    DeckSource, ObstacleClassifier, PerceptionPipeline, SignalSender, StubClassifier,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Stream camera frames through the obstacle classifier and feed the pilot"
)]
struct Args {
    /// Deck address (host:port). Overrides the configured value.
    #[arg(long, env = "PILOT_DECK_ADDR")]
    deck_addr: Option<String>,

    /// Signal link address served by `pilot`.
    #[arg(long, env = "PILOT_LINK_ADDR")]
    link_addr: Option<String>,

    /// ONNX model file. Requires the `backend-tract` feature.
    #[arg(long, env = "PILOT_MODEL_PATH")]
    model: Option<PathBuf>,

    /// Run without a model, reporting this probability for every frame.
    #[arg(long, conflicts_with = "model")]
    stub_probability: Option<f32>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = PilotConfig::load()?;
    if let Some(addr) = args.deck_addr {
        config.deck.addr = addr;
    }
    if let Some(addr) = args.link_addr {
        config.link.addr = addr;
    }
    if let Some(path) = args.model {
        config.model.path = Some(path);
    }

    match (args.stub_probability, config.model.path.clone()) {
        (Some(p), _) => run(StubClassifier::constant(p), &config),
        (None, Some(path)) => run(load_model(&path, &config)?, &config),
        (None, None) => {
            log::warn!("no model configured; using stub classifier (p = 0)");
            run(StubClassifier::default(), &config)
        }
    }
}

#[cfg(feature = "backend-tract")]
fn load_model(path: &std::path::Path, config: &PilotConfig) -> Result<impl ObstacleClassifier> {
    obstacle_pilot::TractClassifier::new(path, config.model.width, config.model.height)
}

#[cfg(not(feature = "backend-tract"))]
fn load_model(path: &std::path::Path, _config: &PilotConfig) -> Result<StubClassifier> {
    Err(anyhow::anyhow!(
        "model {} configured but this build lacks the backend-tract feature",
        path.display()
    ))
}

fn run<C: ObstacleClassifier>(classifier: C, config: &PilotConfig) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .context("install Ctrl-C handler")?;

    log::info!("connecting to pilot at {}", config.link.addr);
    let link = SignalSender::connect(config.link.addr.as_str(), &config.auth_key())
        .with_context(|| format!("connect signal link {}", config.link.addr))?;

    let deck = DeckSource::connect(&config.deck_config())?;

    let mut pipeline = PerceptionPipeline::new(classifier, config.smoother(), link);
    let stats = pipeline.run(deck, &stop)?;
    log::info!(
        "perception stopped: frames={} sent={} decode_failures={} inference_failures={}",
        stats.frames,
        stats.signals_sent,
        stats.decode_failures,
        stats.inference_failures
    );
    Ok(())
}
