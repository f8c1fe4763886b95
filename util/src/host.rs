//! Host platform utility functions

use std::env;
use std::path::PathBuf;

/// Environment variable pointing at the root of the bench software checkout.
pub const SW_ROOT_ENV_VAR: &str = "BLDC_RAMP_ROOT";

/// Get the software root directory from the `BLDC_RAMP_ROOT` environment
/// variable.
pub fn get_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
