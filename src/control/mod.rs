//! Flight control loop.
//!
//! The loop walks a fixed sequence of states:
//!
//! ```text
//! Resetting -> TakingOff -> Cruising -> Landing -> Done
//! ```
//!
//! Every command is followed by one tick of pause. During `Cruising` each
//! step first blocks on the signal link, so the realized cadence is the
//! slower of the perception rate and the tick. There is no independent
//! timer: a stalled perception process stalls the cruise phase with it.
//!
//! A transport failure while cruising is fatal. Before the error is returned
//! the loop tries to bring the vehicle down with the normal landing ramp.

pub mod policy;
pub mod sink;

use std::time::Duration;

use crate::error::ControlError;
use crate::smoother::DEFAULT_WINDOW;
use crate::transport::SignalSource;

pub use policy::{VelocityCommand, VelocityPolicy};
pub use sink::{JsonLinesSink, LogSink, RecordingSink, Setpoint, SetpointSink, SinkEvent};

pub const DEFAULT_CRUISE_ALTITUDE: f64 = 0.8;
pub const DEFAULT_RAMP_STEPS: u32 = 20;
pub const DEFAULT_CRUISE_STEPS: u32 = 250;
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);
pub const DEFAULT_RESET_PULSE: Duration = Duration::from_millis(100);
pub const DEFAULT_RESET_SETTLE: Duration = Duration::from_secs(2);

/// Fixed shape of one flight.
#[derive(Clone, Debug, PartialEq)]
pub struct FlightPlan {
    /// Altitude held while cruising (m).
    pub cruise_altitude: f64,
    /// Setpoints in each of the takeoff and landing ramps.
    pub ramp_steps: u32,
    /// Advancing steps before landing.
    pub cruise_steps: u32,
    /// Smoother window; received sums are divided by this.
    pub window: usize,
    pub tick: Duration,
    pub reset_pulse: Duration,
    pub reset_settle: Duration,
}

impl Default for FlightPlan {
    fn default() -> Self {
        Self {
            cruise_altitude: DEFAULT_CRUISE_ALTITUDE,
            ramp_steps: DEFAULT_RAMP_STEPS,
            cruise_steps: DEFAULT_CRUISE_STEPS,
            window: DEFAULT_WINDOW,
            tick: DEFAULT_TICK,
            reset_pulse: DEFAULT_RESET_PULSE,
            reset_settle: DEFAULT_RESET_SETTLE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlState {
    Resetting,
    TakingOff,
    Cruising,
    Landing,
    Done,
}

/// Where the loop waits between commands.
pub trait Pacer {
    fn pause(&mut self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested pauses without sleeping.
#[derive(Clone, Debug, Default)]
pub struct RecordingPacer {
    pub pauses: Vec<Duration>,
}

impl Pacer for RecordingPacer {
    fn pause(&mut self, duration: Duration) {
        self.pauses.push(duration);
    }
}

/// Counters for one run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlightReport {
    pub signals_received: u64,
    pub cruise_steps: u32,
    pub hover_ticks: u64,
    pub last_forward: f64,
    pub aborted: bool,
}

/// Altitudes of the takeoff ramp: strictly increasing, ending at `cruise_altitude`.
pub fn takeoff_ramp(cruise_altitude: f64, steps: u32) -> impl Iterator<Item = f64> {
    (0..steps).map(move |k| cruise_altitude * (k + 1) as f64 / steps as f64)
}

/// Altitudes of the landing ramp: strictly decreasing, ending at zero.
pub fn landing_ramp(cruise_altitude: f64, steps: u32) -> impl Iterator<Item = f64> {
    (0..steps).map(move |k| cruise_altitude * (steps - 1 - k) as f64 / steps as f64)
}

pub struct ControlLoop<S: SetpointSink, P: Pacer = ThreadPacer> {
    plan: FlightPlan,
    policy: VelocityPolicy,
    sink: S,
    pacer: P,
    state: ControlState,
    report: FlightReport,
}

impl<S: SetpointSink> ControlLoop<S, ThreadPacer> {
    pub fn new(plan: FlightPlan, policy: VelocityPolicy, sink: S) -> Self {
        Self::with_pacer(plan, policy, sink, ThreadPacer)
    }
}

impl<S: SetpointSink, P: Pacer> ControlLoop<S, P> {
    pub fn with_pacer(plan: FlightPlan, policy: VelocityPolicy, sink: S, pacer: P) -> Self {
        Self {
            plan,
            policy,
            sink,
            pacer,
            state: ControlState::Resetting,
            report: FlightReport::default(),
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn report(&self) -> &FlightReport {
        &self.report
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    pub fn into_parts(self) -> (S, P) {
        (self.sink, self.pacer)
    }

    /// Fly the whole plan, consuming signals during the cruise phase.
    pub fn run<R: SignalSource + ?Sized>(
        &mut self,
        signals: &mut R,
    ) -> Result<FlightReport, ControlError> {
        log::info!(
            "flight start: policy={} cruise_steps={} altitude={:.2}",
            self.policy,
            self.plan.cruise_steps,
            self.plan.cruise_altitude
        );
        while self.state != ControlState::Done {
            if let Err(err) = self.run_phase(signals) {
                log::error!("control loop aborted in {:?}: {}", self.state, err);
                self.safe_exit(&err);
                return Err(err);
            }
        }
        log::info!(
            "flight complete: {} signals, {} cruise steps, {} hover ticks",
            self.report.signals_received,
            self.report.cruise_steps,
            self.report.hover_ticks
        );
        Ok(self.report.clone())
    }

    fn run_phase<R: SignalSource + ?Sized>(&mut self, signals: &mut R) -> Result<(), ControlError> {
        match self.state {
            ControlState::Resetting => {
                self.reset_estimator()?;
                self.transition(ControlState::TakingOff);
            }
            ControlState::TakingOff => {
                self.take_off()?;
                self.transition(ControlState::Cruising);
            }
            ControlState::Cruising => {
                self.cruise(signals)?;
                self.transition(ControlState::Landing);
            }
            ControlState::Landing => {
                self.land()?;
                self.sink.stop()?;
                self.transition(ControlState::Done);
            }
            ControlState::Done => {}
        }
        Ok(())
    }

    fn transition(&mut self, next: ControlState) {
        log::info!("control state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn reset_estimator(&mut self) -> Result<(), ControlError> {
        self.sink.reset_estimator(true)?;
        self.pacer.pause(self.plan.reset_pulse);
        self.sink.reset_estimator(false)?;
        self.pacer.pause(self.plan.reset_settle);
        Ok(())
    }

    fn take_off(&mut self) -> Result<(), ControlError> {
        for z in takeoff_ramp(self.plan.cruise_altitude, self.plan.ramp_steps) {
            self.sink.send_hover_setpoint(Setpoint::altitude(z))?;
            self.pacer.pause(self.plan.tick);
        }
        Ok(())
    }

    fn cruise<R: SignalSource + ?Sized>(&mut self, signals: &mut R) -> Result<(), ControlError> {
        let window = self.plan.window.max(1) as f64;
        let mut previous = 0.0;
        let mut steps = 0u32;

        while steps < self.plan.cruise_steps {
            let signal = signals.recv()?;
            self.report.signals_received += 1;

            let p = signal / window;
            let command = self.policy.next(p, previous);
            self.sink
                .send_hover_setpoint(Setpoint::forward(command.forward, self.plan.cruise_altitude))?;
            previous = command.forward;
            self.report.last_forward = command.forward;

            if command.advances {
                steps += 1;
                self.report.cruise_steps = steps;
            } else {
                self.report.hover_ticks += 1;
            }
            log::debug!(
                "cruise step {}/{}: p={:.3} vx={:.3}{}",
                steps,
                self.plan.cruise_steps,
                p,
                command.forward,
                if command.advances { "" } else { " (hover)" }
            );
            self.pacer.pause(self.plan.tick);
        }
        Ok(())
    }

    fn land(&mut self) -> Result<(), ControlError> {
        for z in landing_ramp(self.plan.cruise_altitude, self.plan.ramp_steps) {
            self.sink.send_hover_setpoint(Setpoint::altitude(z))?;
            self.pacer.pause(self.plan.tick);
        }
        Ok(())
    }

    /// Best-effort exit after a fatal error. Sink failures here are logged only.
    fn safe_exit(&mut self, err: &ControlError) {
        self.report.aborted = true;
        let airborne = matches!(
            self.state,
            ControlState::TakingOff | ControlState::Cruising | ControlState::Landing
        );

        if airborne && matches!(err, ControlError::Transport(_)) {
            log::warn!("signal lost; holding then landing");
            let hold = Setpoint::altitude(self.plan.cruise_altitude);
            if let Err(e) = self.sink.send_hover_setpoint(hold) {
                log::warn!("safe exit hold failed: {}", e);
            }
            self.pacer.pause(self.plan.tick);
            for z in landing_ramp(self.plan.cruise_altitude, self.plan.ramp_steps) {
                if let Err(e) = self.sink.send_hover_setpoint(Setpoint::altitude(z)) {
                    log::warn!("safe exit landing aborted: {}", e);
                    break;
                }
                self.pacer.pause(self.plan.tick);
            }
        }

        if let Err(e) = self.sink.stop() {
            log::warn!("safe exit stop failed: {}", e);
        }
        self.state = ControlState::Done;
    }
}
