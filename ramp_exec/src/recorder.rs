//! # Session Recorder
//!
//! Holds the command stream and the sensor stream of one ramp as they are produced, and merges
//! them row by row once the ramp is over.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

use util::archive::{self, ArchiveError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Column names of a persisted recording.
pub const HEADER: [&str; 4] = ["time", "command", "strain1", "strain2"];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One entry of the command stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandSample {
    /// Seconds since the start of the session
    pub elapsed_s: f64,

    /// Setpoint sent to the controller
    pub command: f64,
}

/// One entry of the sensor stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub strain1: f64,
    pub strain2: f64,
}

/// One row of a finalised recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SampleRow {
    #[serde(rename = "time")]
    pub elapsed_s: f64,
    pub command: f64,
    pub strain1: f64,
    pub strain2: f64,
}

/// Accumulates the two streams of one ramp.
#[derive(Debug, Default)]
pub struct SessionRecorder {
    commands: Vec<CommandSample>,
    sensors: Vec<SensorSample>,
}

/// The merged, row aligned result of a [`SessionRecorder`].
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub rows: Vec<SampleRow>,

    /// Number of rows whose sensor values were missing and filled with zeros
    pub rows_padded: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Cannot write the recording: {0}")]
    Archive(#[from] ArchiveError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SensorSample {
    /// Substitute for a sensor read that could not be used.
    pub const ZERO: SensorSample = SensorSample {
        strain1: 0.0,
        strain2: 0.0,
    };
}

impl SampleRow {
    pub fn new(command: CommandSample, sensor: SensorSample) -> Self {
        Self {
            elapsed_s: command.elapsed_s,
            command: command.command,
            strain1: sensor.strain1,
            strain2: sensor.strain2,
        }
    }

    pub fn command_sample(&self) -> CommandSample {
        CommandSample {
            elapsed_s: self.elapsed_s,
            command: self.command,
        }
    }

    pub fn sensor_sample(&self) -> SensorSample {
        SensorSample {
            strain1: self.strain1,
            strain2: self.strain2,
        }
    }
}

impl SessionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recorder with room for `capacity` ticks in each stream.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(capacity),
            sensors: Vec::with_capacity(capacity),
        }
    }

    pub fn push_command(&mut self, sample: CommandSample) {
        self.commands.push(sample);
    }

    pub fn push_sensor(&mut self, sample: SensorSample) {
        self.sensors.push(sample);
    }

    /// Record one whole tick.
    pub fn push_row(&mut self, row: &SampleRow) {
        self.push_command(row.command_sample());
        self.push_sensor(row.sensor_sample());
    }

    /// Merge both streams by index.
    ///
    /// Every command produces one row. Missing sensor samples are filled with
    /// [`SensorSample::ZERO`], surplus ones are dropped.
    pub fn finalise(self) -> Recording {
        let num_rows = self.commands.len();

        if self.sensors.len() > num_rows {
            warn!(
                "Dropping {} sensor samples with no matching command",
                self.sensors.len() - num_rows
            );
        }
        let rows_padded = num_rows.saturating_sub(self.sensors.len());

        let mut sensors = self.sensors.into_iter();
        let rows = self
            .commands
            .into_iter()
            .map(|c| SampleRow::new(c, sensors.next().unwrap_or(SensorSample::ZERO)))
            .collect();

        Recording { rows, rows_padded }
    }
}

impl Recording {
    /// Write the recording as a delimited table with the [`HEADER`] columns.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), RecorderError> {
        archive::write_table(path, &HEADER, &self.rows)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
