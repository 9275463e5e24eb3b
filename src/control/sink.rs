//! Flight-controller command sinks.
//!
//! The radio driver lives outside this crate. Anything that can accept a
//! hover setpoint, toggle the state-estimator reset and stop the motors can
//! sit behind `SetpointSink`.

use serde::Serialize;
use std::io::Write;

use crate::error::SinkError;

/// One hover command: body-frame velocities, yaw rate and absolute altitude.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Setpoint {
    /// Forward velocity (m/s).
    pub vx: f64,
    /// Lateral velocity (m/s).
    pub vy: f64,
    /// Yaw rate (deg/s).
    pub yaw_rate: f64,
    /// Target altitude (m).
    pub z: f64,
}

impl Setpoint {
    /// Hold position at `z`.
    pub fn altitude(z: f64) -> Self {
        Self {
            vx: 0.0,
            vy: 0.0,
            yaw_rate: 0.0,
            z,
        }
    }

    /// Fly straight ahead at `vx`, holding `z`.
    pub fn forward(vx: f64, z: f64) -> Self {
        Self {
            vx,
            vy: 0.0,
            yaw_rate: 0.0,
            z,
        }
    }

    /// Only the altitude component is non-zero.
    pub fn is_altitude_only(&self) -> bool {
        self.vx == 0.0 && self.vy == 0.0 && self.yaw_rate == 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.vx.is_finite() && self.vy.is_finite() && self.yaw_rate.is_finite() && self.z.is_finite()
    }
}

pub trait SetpointSink {
    fn send_hover_setpoint(&mut self, setpoint: Setpoint) -> Result<(), SinkError>;

    /// Set or clear the state-estimator reset flag.
    fn reset_estimator(&mut self, reset: bool) -> Result<(), SinkError>;

    /// Stop sending setpoints; motors go idle.
    fn stop(&mut self) -> Result<(), SinkError>;
}

impl<S: SetpointSink + ?Sized> SetpointSink for &mut S {
    fn send_hover_setpoint(&mut self, setpoint: Setpoint) -> Result<(), SinkError> {
        (**self).send_hover_setpoint(setpoint)
    }

    fn reset_estimator(&mut self, reset: bool) -> Result<(), SinkError> {
        (**self).reset_estimator(reset)
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        (**self).stop()
    }
}

impl<S: SetpointSink + ?Sized> SetpointSink for Box<S> {
    fn send_hover_setpoint(&mut self, setpoint: Setpoint) -> Result<(), SinkError> {
        (**self).send_hover_setpoint(setpoint)
    }

    fn reset_estimator(&mut self, reset: bool) -> Result<(), SinkError> {
        (**self).reset_estimator(reset)
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        (**self).stop()
    }
}

fn check_finite(setpoint: &Setpoint) -> Result<(), SinkError> {
    if setpoint.is_finite() {
        Ok(())
    } else {
        Err(SinkError::new(format!("non-finite setpoint {:?}", setpoint)))
    }
}

/// Dry-run sink: logs every command.
#[derive(Debug, Default)]
pub struct LogSink {
    commands: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> u64 {
        self.commands
    }
}

impl SetpointSink for LogSink {
    fn send_hover_setpoint(&mut self, setpoint: Setpoint) -> Result<(), SinkError> {
        check_finite(&setpoint)?;
        self.commands += 1;
        log::info!(
            "setpoint #{}: vx={:.3} vy={:.3} yaw_rate={:.1} z={:.2}",
            self.commands,
            setpoint.vx,
            setpoint.vy,
            setpoint.yaw_rate,
            setpoint.z
        );
        Ok(())
    }

    fn reset_estimator(&mut self, reset: bool) -> Result<(), SinkError> {
        log::info!("estimator reset flag = {}", reset);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        log::info!("stop after {} setpoints", self.commands);
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Command<'a> {
    Hover(&'a Setpoint),
    ResetEstimator { reset: bool },
    Stop,
}

/// One JSON object per line, for a radio bridge reading stdin or a pipe.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, command: &Command<'_>) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.out, command)
            .map_err(|e| SinkError::new(format!("encode command: {}", e)))?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> SetpointSink for JsonLinesSink<W> {
    fn send_hover_setpoint(&mut self, setpoint: Setpoint) -> Result<(), SinkError> {
        check_finite(&setpoint)?;
        self.emit(&Command::Hover(&setpoint))
    }

    fn reset_estimator(&mut self, reset: bool) -> Result<(), SinkError> {
        self.emit(&Command::ResetEstimator { reset })
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        self.emit(&Command::Stop)
    }
}

/// Everything a sink was asked to do, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum SinkEvent {
    Hover(Setpoint),
    ResetEstimator(bool),
    Stop,
}

/// Keeps every command in memory. Can be told to start rejecting.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<SinkEvent>,
    reject_after: Option<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every hover setpoint after the first `accepted` ones.
    pub fn rejecting_after(accepted: usize) -> Self {
        Self {
            events: Vec::new(),
            reject_after: Some(accepted),
        }
    }

    pub fn setpoints(&self) -> Vec<Setpoint> {
        self.events
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Hover(sp) => Some(*sp),
                _ => None,
            })
            .collect()
    }
}

impl SetpointSink for RecordingSink {
    fn send_hover_setpoint(&mut self, setpoint: Setpoint) -> Result<(), SinkError> {
        if let Some(limit) = self.reject_after {
            if self.setpoints().len() >= limit {
                return Err(SinkError::new("recording sink configured to reject"));
            }
        }
        self.events.push(SinkEvent::Hover(setpoint));
        Ok(())
    }

    fn reset_estimator(&mut self, reset: bool) -> Result<(), SinkError> {
        self.events.push(SinkEvent::ResetEstimator(reset));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        self.events.push(SinkEvent::Stop);
        Ok(())
    }
}
