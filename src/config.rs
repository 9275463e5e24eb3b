use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::control::policy::{
    VelocityPolicy, DEFAULT_ALPHA, DEFAULT_CRUISE_VELOCITY, DEFAULT_THRESHOLD, DEFAULT_V_MAX,
};
use crate::control::{
    FlightPlan, DEFAULT_CRUISE_ALTITUDE, DEFAULT_CRUISE_STEPS, DEFAULT_RAMP_STEPS,
    DEFAULT_RESET_PULSE, DEFAULT_RESET_SETTLE, DEFAULT_TICK,
};
use crate::frame::{DEFAULT_INPUT_HEIGHT, DEFAULT_INPUT_WIDTH};
use crate::ingest::jpeg::DEFAULT_MAX_BUFFER_BYTES;
use crate::ingest::DeckConfig;
use crate::smoother::{RollingSmoother, DEFAULT_WINDOW};
use crate::transport::{is_loopback_addr, AuthKey};

const DEFAULT_DECK_ADDR: &str = "192.168.4.1:5000";
const DEFAULT_DECK_CHUNK: usize = 512;
const DEFAULT_DECK_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_LINK_ADDR: &str = "127.0.0.1:6000";
const DEFAULT_AUTH_KEY: &str = "crazyflie";
const DEFAULT_POLICY: &str = "threshold";

#[derive(Debug, Deserialize, Default)]
struct PilotConfigFile {
    deck: Option<DeckConfigFile>,
    link: Option<LinkConfigFile>,
    model: Option<ModelConfigFile>,
    smoothing: Option<SmoothingConfigFile>,
    flight: Option<FlightConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DeckConfigFile {
    addr: Option<String>,
    chunk_size: Option<usize>,
    max_buffer_bytes: Option<usize>,
    connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct LinkConfigFile {
    addr: Option<String>,
    auth_key: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SmoothingConfigFile {
    window: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct FlightConfigFile {
    policy: Option<String>,
    cruise_altitude: Option<f64>,
    ramp_steps: Option<u32>,
    cruise_steps: Option<u32>,
    tick_ms: Option<u64>,
    reset_settle_ms: Option<u64>,
    threshold: Option<f64>,
    cruise_velocity: Option<f64>,
    alpha: Option<f64>,
    v_max: Option<f64>,
}

/// Settings shared by the `perception` and `pilot` binaries.
#[derive(Debug, Clone)]
pub struct PilotConfig {
    pub deck: DeckSettings,
    pub link: LinkSettings,
    pub model: ModelSettings,
    pub window: usize,
    pub flight: FlightSettings,
}

#[derive(Debug, Clone)]
pub struct DeckSettings {
    pub addr: String,
    pub chunk_size: usize,
    pub max_buffer_bytes: usize,
    pub connect_timeout: Duration,
}

#[derive(Clone)]
pub struct LinkSettings {
    pub addr: String,
    pub auth_key: String,
}

impl std::fmt::Debug for LinkSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSettings")
            .field("addr", &self.addr)
            .field("auth_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub path: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct FlightSettings {
    pub policy: String,
    pub cruise_altitude: f64,
    pub ramp_steps: u32,
    pub cruise_steps: u32,
    pub tick: Duration,
    pub reset_settle: Duration,
    pub threshold: f64,
    pub cruise_velocity: f64,
    pub alpha: f64,
    pub v_max: f64,
}

impl PilotConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PILOT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PilotConfigFile) -> Self {
        let deck = file.deck.unwrap_or_default();
        let link = file.link.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let flight = file.flight.unwrap_or_default();
        Self {
            deck: DeckSettings {
                addr: deck.addr.unwrap_or_else(|| DEFAULT_DECK_ADDR.to_string()),
                chunk_size: deck.chunk_size.unwrap_or(DEFAULT_DECK_CHUNK),
                max_buffer_bytes: deck.max_buffer_bytes.unwrap_or(DEFAULT_MAX_BUFFER_BYTES),
                connect_timeout: Duration::from_secs(
                    deck.connect_timeout_secs
                        .unwrap_or(DEFAULT_DECK_CONNECT_TIMEOUT_SECS),
                ),
            },
            link: LinkSettings {
                addr: link.addr.unwrap_or_else(|| DEFAULT_LINK_ADDR.to_string()),
                auth_key: link
                    .auth_key
                    .unwrap_or_else(|| DEFAULT_AUTH_KEY.to_string()),
            },
            model: ModelSettings {
                path: model.path,
                width: model.width.unwrap_or(DEFAULT_INPUT_WIDTH),
                height: model.height.unwrap_or(DEFAULT_INPUT_HEIGHT),
            },
            window: file
                .smoothing
                .and_then(|smoothing| smoothing.window)
                .unwrap_or(DEFAULT_WINDOW),
            flight: FlightSettings {
                policy: flight.policy.unwrap_or_else(|| DEFAULT_POLICY.to_string()),
                cruise_altitude: flight.cruise_altitude.unwrap_or(DEFAULT_CRUISE_ALTITUDE),
                ramp_steps: flight.ramp_steps.unwrap_or(DEFAULT_RAMP_STEPS),
                cruise_steps: flight.cruise_steps.unwrap_or(DEFAULT_CRUISE_STEPS),
                tick: flight
                    .tick_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_TICK),
                reset_settle: flight
                    .reset_settle_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_RESET_SETTLE),
                threshold: flight.threshold.unwrap_or(DEFAULT_THRESHOLD),
                cruise_velocity: flight.cruise_velocity.unwrap_or(DEFAULT_CRUISE_VELOCITY),
                alpha: flight.alpha.unwrap_or(DEFAULT_ALPHA),
                v_max: flight.v_max.unwrap_or(DEFAULT_V_MAX),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("PILOT_DECK_ADDR") {
            if !addr.trim().is_empty() {
                self.deck.addr = addr;
            }
        }
        if let Ok(addr) = std::env::var("PILOT_LINK_ADDR") {
            if !addr.trim().is_empty() {
                self.link.addr = addr;
            }
        }
        if let Ok(key) = std::env::var("PILOT_AUTH_KEY") {
            if !key.is_empty() {
                self.link.auth_key = key;
            }
        }
        if let Ok(policy) = std::env::var("PILOT_POLICY") {
            if !policy.trim().is_empty() {
                self.flight.policy = policy;
            }
        }
        if let Ok(path) = std::env::var("PILOT_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model.path = Some(PathBuf::from(path));
            }
        }
        if let Ok(steps) = std::env::var("PILOT_CRUISE_STEPS") {
            self.flight.cruise_steps = steps
                .trim()
                .parse()
                .map_err(|_| anyhow!("PILOT_CRUISE_STEPS must be a non-negative integer"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.velocity_policy()?.validate()?;
        if self.window == 0 {
            return Err(anyhow!("smoothing window must be at least 1"));
        }
        if self.flight.ramp_steps == 0 {
            return Err(anyhow!("ramp_steps must be at least 1"));
        }
        if !(self.flight.cruise_altitude.is_finite() && self.flight.cruise_altitude > 0.0) {
            return Err(anyhow!(
                "cruise_altitude must be positive, got {}",
                self.flight.cruise_altitude
            ));
        }
        if self.deck.chunk_size == 0 {
            return Err(anyhow!("deck chunk_size must be at least 1"));
        }
        if self.link.auth_key.is_empty() {
            return Err(anyhow!("link auth_key must not be empty"));
        }
        if !is_loopback_addr(&self.link.addr) {
            log::warn!(
                "signal link {} is not loopback; the link is authenticated but not encrypted",
                self.link.addr
            );
        }
        Ok(())
    }

    /// The configured law with its constants.
    pub fn velocity_policy(&self) -> Result<VelocityPolicy> {
        let policy = match self.flight.policy.parse::<VelocityPolicy>()? {
            VelocityPolicy::Threshold { .. } => VelocityPolicy::Threshold {
                threshold: self.flight.threshold,
                cruise_velocity: self.flight.cruise_velocity,
            },
            VelocityPolicy::LowPass { .. } => VelocityPolicy::LowPass {
                alpha: self.flight.alpha,
                v_max: self.flight.v_max,
            },
        };
        Ok(policy)
    }

    /// Perception-side window. The pilot divides by `flight_plan().window`,
    /// so both come from the same `window` setting and are never overridden
    /// separately.
    pub fn smoother(&self) -> RollingSmoother {
        RollingSmoother::new(self.window)
    }

    pub fn flight_plan(&self) -> FlightPlan {
        FlightPlan {
            cruise_altitude: self.flight.cruise_altitude,
            ramp_steps: self.flight.ramp_steps,
            cruise_steps: self.flight.cruise_steps,
            window: self.window,
            tick: self.flight.tick,
            reset_pulse: DEFAULT_RESET_PULSE,
            reset_settle: self.flight.reset_settle,
        }
    }

    pub fn deck_config(&self) -> DeckConfig {
        DeckConfig {
            addr: self.deck.addr.clone(),
            chunk_size: self.deck.chunk_size,
            max_buffer_bytes: self.deck.max_buffer_bytes,
            connect_timeout: Some(self.deck.connect_timeout),
        }
    }

    pub fn auth_key(&self) -> AuthKey {
        AuthKey::from(self.link.auth_key.as_str())
    }
}

fn read_config_file(path: &Path) -> Result<PilotConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
