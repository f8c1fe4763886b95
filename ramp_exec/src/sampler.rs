//! # Dual-Channel Sampler
//!
//! The control loop. Each tick sends one torque setpoint to the active controller, a zero torque
//! command to every controller still waiting for its own ramp, and reads one line from the strain
//! gauge digitizer. The loop runs as fast as the two links allow, so the
//! achieved rate is measured and reported every `report_interval` ticks.
//!
//! Per-tick I/O failures never stop the loop: the controller must keep receiving fresh commands
//! or it brakes on its command timeout. A failed tick is returned as a [`TickFault`] holding the
//! row to record in its place.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, warn};
use std::{fmt, io};
use thiserror::Error;

use bldc_if::{Address, LineChannel, RegisterTransport, RegisterWrite, TransportError};
use util::{module::State, session, time};

use crate::{
    ramp_profile::RampProfile,
    recorder::{CommandSample, Recording, SampleRow, SensorSample, SessionRecorder},
};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Source of tick timestamps.
pub trait Clock {
    /// Seconds since the start of the session.
    fn elapsed_s(&self) -> f64;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Clock counting from the session epoch.
///
/// The session must be created before this clock is read.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionClock;

/// The control loop state.
pub struct Sampler<T, S, C> {
    transport: T,
    sensor: S,
    clock: C,

    report_interval: u64,

    /// Controllers held at zero torque while another one ramps
    holding: Vec<Address>,

    /// Counters of the ramp in progress
    stats: TickStats,

    /// Clock reading at the start of the ramp in progress
    ramp_start_s: f64,
}

/// Input to one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setpoint {
    pub address: Address,
    pub value: f64,
}

/// Status of a tick which completed without fault.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// Index of the tick within the ramp
    pub tick: u64,
}

/// Per-ramp tick counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub degraded_ticks: u64,
    pub motor_write_faults: u64,
    pub sensor_read_faults: u64,
    pub parse_faults: u64,

    /// Failed zero torque commands to held controllers, these do not degrade the tick
    pub hold_write_faults: u64,
}

/// A tick which did not complete cleanly.
#[derive(Debug, Error)]
#[error("Degraded tick at {:.4} s", .row.elapsed_s)]
pub struct TickFault {
    /// The row recorded for this tick, with zeros in place of unusable sensor values
    pub row: SampleRow,

    /// Failure to send the setpoint, if any
    pub motor: Option<TransportError>,

    /// Failure to obtain a sensor sample, if any
    pub sensor: Option<SensorFault>,
}

/// End of ramp summary.
#[derive(Debug, Clone, PartialEq)]
pub struct RampSummary {
    pub address: Address,
    pub target: f64,
    pub stats: TickStats,
    pub duration_s: f64,
    pub rate_hz: Option<f64>,
    pub rows_padded: usize,
}

/// Everything a finished ramp produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RampOutcome {
    pub recording: Recording,
    pub summary: RampSummary,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SensorFault {
    #[error("Sensor read failed: {0}")]
    Read(#[from] io::Error),

    #[error("No sensor line before the timeout")]
    Timeout,

    #[error("Cannot parse sensor line {0:?}")]
    Parse(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Clock for SessionClock {
    fn elapsed_s(&self) -> f64 {
        session::get_elapsed_seconds()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn elapsed_s(&self) -> f64 {
        (**self).elapsed_s()
    }
}

impl<T, S, C> Sampler<T, S, C>
where
    T: RegisterTransport,
    S: LineChannel,
    C: Clock,
{
    pub fn new(transport: T, sensor: S, clock: C, report_interval: u64) -> Self {
        Self {
            transport,
            sensor,
            clock,
            report_interval,
            holding: Vec::new(),
            stats: TickStats::default(),
            ramp_start_s: 0.0,
        }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    /// Counters of the current (or last) ramp.
    pub fn stats(&self) -> TickStats {
        self.stats
    }

    /// Drive a whole profile through the controller at `address`, one tick per setpoint.
    ///
    /// Every tick also commands zero torque on each of `holding`, so that they stay below their
    /// command timeout until their own ramp.
    pub fn run_ramp(
        &mut self,
        address: Address,
        profile: &RampProfile,
        holding: &[Address],
    ) -> RampOutcome {
        self.stats = TickStats::default();
        self.holding = holding.iter().copied().filter(|&a| a != address).collect();
        self.ramp_start_s = self.clock.elapsed_s();

        let mut recorder = SessionRecorder::with_capacity(profile.len());
        let mut phase = None;

        info!(
            "Ramping controller {} to {} in steps of {} ({} ticks)",
            address,
            profile.target(),
            profile.step(),
            profile.len()
        );

        for (p, value) in profile {
            if phase != Some(p) {
                debug!("Controller {} entering the {:?} phase", address, p);
                phase = Some(p);
            }

            let row = match self.proc(&Setpoint { address, value }) {
                Ok((row, _)) => row,
                Err(fault) => fault.substitute(),
            };

            recorder.push_row(&row);
        }

        self.holding.clear();

        let recording = recorder.finalise();
        let duration_s = self.clock.elapsed_s() - self.ramp_start_s;

        let summary = RampSummary {
            address,
            target: profile.target(),
            stats: self.stats,
            duration_s,
            rate_hz: time::rate_hz(self.stats.ticks, duration_s),
            rows_padded: recording.rows_padded,
        };

        RampOutcome { recording, summary }
    }

    /// Command zero torque on a controller once its ramp is over.
    pub fn release(&mut self, address: Address) {
        if let Err(e) = self
            .transport
            .write_register(RegisterWrite::torque_command(address, 0.0))
        {
            warn!("Cannot command zero torque on controller {}: {}", address, e);
        }
    }

    fn read_sensor(&mut self) -> Result<SensorSample, SensorFault> {
        let line = self.sensor.read_line()?;
        parse_sensor_line(&line)
    }

    fn hold_idle_controllers(&mut self) {
        for &address in &self.holding {
            if let Err(e) = self
                .transport
                .write_register(RegisterWrite::torque_command(address, 0.0))
            {
                debug!("Cannot hold controller {} at zero torque: {}", address, e);
                self.stats.hold_write_faults += 1;
            }
        }
    }

    fn count_fault(&mut self, fault: &TickFault) {
        self.stats.degraded_ticks += 1;

        if fault.motor.is_some() {
            self.stats.motor_write_faults += 1;
        }

        match fault.sensor {
            Some(SensorFault::Parse(_)) => self.stats.parse_faults += 1,
            Some(_) => self.stats.sensor_read_faults += 1,
            None => (),
        }
    }

    fn report_throughput(&self, address: Address, now_s: f64) {
        let rate = time::rate_hz(self.stats.ticks, now_s - self.ramp_start_s).unwrap_or(0.0);

        info!(
            "Controller {}: {} ticks at {:.1} Hz ({} degraded)",
            address, self.stats.ticks, rate, self.stats.degraded_ticks
        );
    }
}

impl<T, S, C> State for Sampler<T, S, C>
where
    T: RegisterTransport,
    S: LineChannel,
    C: Clock,
{
    type InputData = Setpoint;
    type OutputData = SampleRow;
    type StatusReport = TickReport;
    type ProcError = TickFault;

    /// Run one tick.
    fn proc(&mut self, setpoint: &Setpoint) -> Result<(SampleRow, TickReport), TickFault> {
        // Held controllers first, the sensor reading must follow the active setpoint
        self.hold_idle_controllers();

        let elapsed_s = self.clock.elapsed_s();

        let motor = self
            .transport
            .write_register(RegisterWrite::torque_command(
                setpoint.address,
                setpoint.value as f32,
            ))
            .err();

        let command = CommandSample {
            elapsed_s,
            command: setpoint.value,
        };

        let (sensor_sample, sensor) = match self.read_sensor() {
            Ok(s) => (s, None),
            Err(e) => (SensorSample::ZERO, Some(e)),
        };

        let row = SampleRow::new(command, sensor_sample);
        let tick = self.stats.ticks;
        self.stats.ticks += 1;

        let result = if motor.is_none() && sensor.is_none() {
            Ok((row, TickReport { tick }))
        } else {
            let fault = TickFault { row, motor, sensor };
            self.count_fault(&fault);
            Err(fault)
        };

        if self.report_interval > 0 && self.stats.ticks % self.report_interval == 0 {
            self.report_throughput(setpoint.address, self.clock.elapsed_s());
        }

        result
    }
}

impl TickFault {
    /// The row to record in place of the failed tick.
    pub fn substitute(self) -> SampleRow {
        self.row
    }
}

impl fmt::Display for RampSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Controller {} ramp to {}: {} ticks in {:.2} s",
            self.address, self.target, self.stats.ticks, self.duration_s
        )?;

        if let Some(r) = self.rate_hz {
            write!(f, " ({:.1} Hz)", r)?;
        }

        write!(
            f,
            ", {} motor write faults, {} sensor read faults, {} parse faults, \
            {} hold write faults, {} rows padded",
            self.stats.motor_write_faults,
            self.stats.sensor_read_faults,
            self.stats.parse_faults,
            self.stats.hold_write_faults,
            self.rows_padded
        )
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse one digitizer line of the form `strain1,strain2` followed by its line ending.
pub fn parse_sensor_line(line: &[u8]) -> Result<SensorSample, SensorFault> {
    if line.is_empty() {
        return Err(SensorFault::Timeout);
    }

    let text = std::str::from_utf8(line)
        .map_err(|_| SensorFault::Parse(String::from_utf8_lossy(line).into_owned()))?;
    let trimmed = text.trim_end_matches(&['\r', '\n'][..]);

    let fields: Vec<&str> = trimmed.split(',').collect();
    let parse_err = || SensorFault::Parse(trimmed.to_string());

    match fields.as_slice() {
        [a, b] => Ok(SensorSample {
            strain1: a.trim().parse().map_err(|_| parse_err())?,
            strain2: b.trim().parse().map_err(|_| parse_err())?,
        }),
        _ => Err(parse_err()),
    }
}
