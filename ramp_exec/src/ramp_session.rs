//! # Ramp Session
//!
//! One complete bench run: every controller is brought up and settled, then each is ramped in
//! turn and its recording written to `{title}_{target}.csv`. Controllers waiting for their ramp
//! are held at zero torque on every tick of the ramps before theirs.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::info;
use std::path::{Path, PathBuf};
use thiserror::Error;

use bldc_if::{Address, LineChannel, RegisterTransport};

use crate::{
    calib_apply::{self, CalibApplyError},
    cli::RampTarget,
    params::RampExecParams,
    ramp_profile::{RampProfile, RampProfileError},
    recorder::RecorderError,
    sampler::{Clock, RampSummary, Sampler},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A planned ramp, validated before any I/O takes place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedRamp {
    pub address: Address,
    pub profile: RampProfile,
}

/// Result of one ramp of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct RampRecord {
    pub summary: RampSummary,

    /// Where the recording was written
    pub path: PathBuf,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RampSessionError {
    #[error("Invalid ramp for controller {address}: {source}")]
    Profile {
        address: Address,
        source: RampProfileError,
    },

    #[error("Controller bring up failed: {0}")]
    BringUp(#[from] CalibApplyError),

    #[error("Cannot clear the sensor input: {0}")]
    SensorReset(std::io::Error),

    #[error("Cannot save the recording to {path:?}: {source}")]
    Recorder {
        path: PathBuf,
        source: RecorderError,
    },
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build and validate the profile of every ramp.
pub fn plan(
    targets: &[RampTarget],
    step: f64,
    overshoot_len: usize,
) -> Result<Vec<PlannedRamp>, RampSessionError> {
    targets
        .iter()
        .map(|t| {
            RampProfile::new(step, t.target, overshoot_len)
                .map(|profile| PlannedRamp {
                    address: t.address,
                    profile,
                })
                .map_err(|source| RampSessionError::Profile {
                    address: t.address,
                    source,
                })
        })
        .collect()
}

/// File name of the recording of a ramp to `target`.
pub fn recording_file_name(title: &str, target: f64) -> String {
    format!("{}_{:?}.csv", title, target)
}

/// Run a whole session, writing the recordings into `out_dir`.
///
/// Bring up failures abort the session before any controller moves. Once ramping has started only
/// a failure to save a recording stops it.
pub fn run<T, S, C>(
    transport: T,
    sensor: S,
    clock: C,
    ramps: &[PlannedRamp],
    params: &RampExecParams,
    title: &str,
    out_dir: &Path,
) -> Result<Vec<RampRecord>, RampSessionError>
where
    T: RegisterTransport,
    S: LineChannel,
    C: Clock,
{
    let mut sampler = Sampler::new(transport, sensor, clock, params.throughput_report_interval);
    let addresses: Vec<Address> = ramps.iter().map(|r| r.address).collect();

    // ---- BRING UP ----

    let bring_up = params.bring_up();
    for &address in &addresses {
        calib_apply::bring_up(sampler.transport_mut(), address, &bring_up)?;
    }

    calib_apply::settle(sampler.transport_mut(), &addresses, &params.settle());

    // ---- RAMPS ----

    let mut records = Vec::with_capacity(ramps.len());

    for (i, ramp) in ramps.iter().enumerate() {
        // Drop whatever the digitizer sent before this ramp
        sampler
            .sensor_mut()
            .reset_input_buffer()
            .map_err(RampSessionError::SensorReset)?;

        let outcome = sampler.run_ramp(ramp.address, &ramp.profile, &addresses[i + 1..]);
        sampler.release(ramp.address);

        info!("{}", outcome.summary);

        let path = out_dir.join(recording_file_name(title, ramp.profile.target()));
        outcome
            .recording
            .write_csv(&path)
            .map_err(|source| RampSessionError::Recorder {
                path: path.clone(),
                source,
            })?;

        info!("Recording saved to {:?}", path);

        records.push(RampRecord {
            summary: outcome.summary,
            path,
        });
    }

    Ok(records)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_plan_fails_before_io() {
        let targets = [
            RampTarget {
                address: 1,
                target: 0.1,
            },
            RampTarget {
                address: 2,
                target: 0.15,
            },
        ];

        let ramps = plan(&targets, 0.05, 200).unwrap();
        assert_eq!(ramps.len(), 2);
        assert_eq!(ramps[1].profile.ascending_len(), 4);

        match plan(&targets, 0.04, 200) {
            Err(RampSessionError::Profile { address: 1, .. }) => (),
            r => panic!("Expected a profile error, got {:?}", r),
        }
    }

    #[test]
    fn test_recording_file_name() {
        assert_eq!(recording_file_name("bench", 0.1), "bench_0.1.csv");
        assert_eq!(recording_file_name("bench", 2.0), "bench_2.0.csv");
    }
}
