//! # Ramp Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use util::logger::LogLevels;

use crate::calib_apply::{BringUpParams, SettleParams};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampExecParams {
    /// Baud rate of the motor controller bus
    pub motor_baud_rate: u32,

    /// Read timeout on the motor controller bus, in milliseconds
    pub motor_timeout_ms: u64,

    /// Baud rate of the strain gauge digitizer
    pub sensor_baud_rate: u32,

    /// Read timeout on the strain gauge digitizer, in milliseconds
    pub sensor_timeout_ms: u64,

    /// Setpoint increment between two ticks
    pub step: f64,

    /// Maximum number of negated setpoints appended after the descent
    pub overshoot_len: usize,

    /// Rate written into each controller's control loop rate register
    pub control_loop_rate_hz: u16,

    /// Wait after leaving the bootloader, in milliseconds
    pub bootloader_settle_ms: u64,

    /// Number of zero torque commands sent to every controller before the first ramp
    pub settle_ticks: usize,

    /// Period of the zero torque commands, in milliseconds
    pub settle_period_ms: u64,

    /// Number of ticks between two throughput reports
    pub throughput_report_interval: u64,

    /// Terminal log level, `info` or more verbose
    pub console_log_level: LevelFilter,

    /// Session log file level
    pub file_log_level: LevelFilter,

    /// Level of the controller bus and digitizer link modules
    pub link_log_level: LevelFilter,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum ParamsError {
    #[error("Baud rates must be non-zero")]
    ZeroBaudRate,

    #[error("Link timeouts must be non-zero")]
    ZeroTimeout,

    #[error("The step must be positive and finite, got {0}")]
    InvalidStep(f64),

    #[error("The control loop rate must be non-zero")]
    ZeroControlLoopRate,

    #[error("The throughput report interval must be non-zero")]
    ZeroReportInterval,

    #[error("The console log level must show throughput reports, got {0}")]
    QuietConsole(LevelFilter),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for RampExecParams {
    fn default() -> Self {
        Self {
            motor_baud_rate: 1_000_000,
            motor_timeout_ms: 100,
            sensor_baud_rate: 9600,
            sensor_timeout_ms: 100,
            step: 0.0002,
            overshoot_len: 200,
            control_loop_rate_hz: 1000,
            bootloader_settle_ms: 200,
            settle_ticks: 100,
            settle_period_ms: 50,
            throughput_report_interval: 100,
            console_log_level: LevelFilter::Info,
            file_log_level: LevelFilter::Debug,
            link_log_level: LevelFilter::Info,
        }
    }
}

impl RampExecParams {
    /// Determines if the parameters are valid.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        if self.motor_baud_rate == 0 || self.sensor_baud_rate == 0 {
            return Err(ParamsError::ZeroBaudRate);
        }

        if self.motor_timeout_ms == 0 || self.sensor_timeout_ms == 0 {
            return Err(ParamsError::ZeroTimeout);
        }

        if !self.step.is_finite() || self.step <= 0.0 {
            return Err(ParamsError::InvalidStep(self.step));
        }

        if self.control_loop_rate_hz == 0 {
            return Err(ParamsError::ZeroControlLoopRate);
        }

        if self.throughput_report_interval == 0 {
            return Err(ParamsError::ZeroReportInterval);
        }

        if self.console_log_level < LevelFilter::Info {
            return Err(ParamsError::QuietConsole(self.console_log_level));
        }

        Ok(())
    }

    pub fn motor_timeout(&self) -> Duration {
        Duration::from_millis(self.motor_timeout_ms)
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }

    /// Log levels of the session, with the link modules at their own level.
    pub fn log_levels(&self) -> LogLevels {
        LogLevels {
            console: self.console_log_level,
            file: self.file_log_level,
            targets: Vec::new(),
        }
        .with_target("bldc_if", self.link_log_level)
        .with_target("serialport", self.link_log_level.min(LevelFilter::Info))
    }

    pub fn bring_up(&self) -> BringUpParams {
        BringUpParams {
            bootloader_settle: Duration::from_millis(self.bootloader_settle_ms),
            control_loop_rate_hz: self.control_loop_rate_hz,
        }
    }

    pub fn settle(&self) -> SettleParams {
        SettleParams {
            ticks: self.settle_ticks,
            period: Duration::from_millis(self.settle_period_ms),
        }
    }
}
