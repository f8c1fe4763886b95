//! # Ramp library.
//!
//! This library allows the ramp executable, its integration tests and benchmarks to access the
//! items defined inside the ramp crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Calibration applicator - loads each motor's calibration into its controller
pub mod calib_apply;

/// Command line interface
pub mod cli;

/// Executable parameters
pub mod params;

/// Profile generator - the sequence of setpoints of one ramp
pub mod ramp_profile;

/// Session recorder - merges the command and sensor streams into rows
pub mod recorder;

/// Dual-channel sampler - the control loop
pub mod sampler;

/// A complete bench session over several controllers
pub mod ramp_session;
