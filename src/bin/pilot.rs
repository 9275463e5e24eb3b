//! pilot - signal link -> control loop -> flight controller
//!
//! Binds the signal link, waits for `perception` to connect, then flies the
//! plan: estimator reset, takeoff ramp, cruise paced by incoming signals,
//! landing ramp, stop.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use std::io;

use obstacle_pilot::config::PilotConfig;
use obstacle_pilot::control::{JsonLinesSink, LogSink};
use obstacle_pilot::{ControlLoop, SetpointSink, SignalListener, VelocityPolicy};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SinkKind {
    /// Log every command (dry run).
    Log,
    /// One JSON command per line on stdout, for a radio bridge.
    Jsonl,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Fly forward at constant altitude, slowing for obstacles reported by perception"
)]
struct Args {
    /// Velocity law: `threshold` or `low_pass`.
    #[arg(long, env = "PILOT_POLICY")]
    policy: Option<String>,

    /// Where setpoints go.
    #[arg(long, value_enum, default_value = "log")]
    sink: SinkKind,

    /// Address to bind the signal link on.
    #[arg(long, env = "PILOT_LINK_ADDR")]
    link_addr: Option<String>,

    /// Advancing cruise steps before landing.
    #[arg(long, env = "PILOT_CRUISE_STEPS")]
    cruise_steps: Option<u32>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = PilotConfig::load()?;
    if let Some(policy) = args.policy {
        config.flight.policy = policy;
    }
    if let Some(addr) = args.link_addr {
        config.link.addr = addr;
    }
    if let Some(steps) = args.cruise_steps {
        config.flight.cruise_steps = steps;
    }

    let policy = config.velocity_policy()?;
    policy.validate()?;

    match args.sink {
        SinkKind::Log => fly(&config, policy, LogSink::new()),
        SinkKind::Jsonl => fly(&config, policy, JsonLinesSink::new(io::stdout().lock())),
    }
}

fn fly<S: SetpointSink>(config: &PilotConfig, policy: VelocityPolicy, sink: S) -> Result<()> {
    let listener = SignalListener::bind(config.link.addr.as_str(), config.auth_key())
        .with_context(|| format!("bind signal link {}", config.link.addr))?;
    let local = listener
        .local_addr()
        .map_err(|e| anyhow!("signal link has no local address: {}", e))?;
    log::info!("waiting for perception on {}", local);

    let mut signals = listener.accept().context("accept perception connection")?;
    log::info!("perception connected from {}", signals.peer_addr());

    let mut control = ControlLoop::new(config.flight_plan(), policy, sink);
    let report = control.run(&mut signals).context("flight aborted")?;
    log::info!(
        "landed: {} cruise steps, {} hover ticks, last vx={:.3}",
        report.cruise_steps,
        report.hover_ticks,
        report.last_forward
    );
    Ok(())
}
