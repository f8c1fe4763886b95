//! # Command Line Interface

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::str::FromStr;
use structopt::StructOpt;
use thiserror::Error;

use bldc_if::Address;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Ramp the torque of one or more BLDC motors while recording a strain gauge.
#[derive(Debug, StructOpt)]
#[structopt(name = "ramp_exec")]
pub struct Cli {
    /// Serial port of the motor controller bus
    pub port: String,

    /// Comma separated controller addresses, e.g. `1,2`
    pub addresses: AddressList,

    /// Comma separated target torques, one per address
    pub targets: TargetList,

    /// Title of the recordings, each is written to `{title}_{target}.csv`
    pub title: String,

    /// Serial port of the strain gauge digitizer
    #[structopt(long, default_value = "/dev/ttyACM0")]
    pub sensor_port: String,

    /// Setpoint increment, overrides the parameter file
    #[structopt(long)]
    pub step: Option<f64>,

    /// Drive the simulated bench instead of the serial ports
    #[structopt(long)]
    pub sim: bool,

    /// Parameter file, relative to the params directory
    #[structopt(long, default_value = "ramp_exec.toml")]
    pub params: String,
}

/// A list of controller addresses.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressList(pub Vec<Address>);

/// A list of ramp targets.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetList(pub Vec<f64>);

/// One ramp to run: a controller and the torque to ramp it to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampTarget {
    pub address: Address,
    pub target: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum CliError {
    #[error("The list is empty")]
    EmptyList,

    #[error("Invalid address {0:?}, expected an integer between 1 and 255")]
    InvalidAddress(String),

    #[error("Address {0} is given more than once")]
    DuplicateAddress(Address),

    #[error("Invalid target {0:?}, expected a number")]
    InvalidTarget(String),

    #[error("Got {addresses} addresses but {targets} targets")]
    LengthMismatch { addresses: usize, targets: usize },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Cli {
    /// Pair addresses with their targets.
    pub fn ramp_targets(&self) -> Result<Vec<RampTarget>, CliError> {
        if self.addresses.0.len() != self.targets.0.len() {
            return Err(CliError::LengthMismatch {
                addresses: self.addresses.0.len(),
                targets: self.targets.0.len(),
            });
        }

        Ok(self
            .addresses
            .0
            .iter()
            .zip(self.targets.0.iter())
            .map(|(&address, &target)| RampTarget { address, target })
            .collect())
    }
}

impl FromStr for AddressList {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut addresses: Vec<Address> = Vec::new();

        for item in split_list(s)? {
            let address = match item.parse::<Address>() {
                Ok(a) if a > 0 => a,
                _ => return Err(CliError::InvalidAddress(item.to_string())),
            };

            if addresses.contains(&address) {
                return Err(CliError::DuplicateAddress(address));
            }
            addresses.push(address);
        }

        Ok(AddressList(addresses))
    }
}

impl FromStr for TargetList {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        split_list(s)?
            .into_iter()
            .map(|item| {
                item.parse::<f64>()
                    .map_err(|_| CliError::InvalidTarget(item.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(TargetList)
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn split_list(s: &str) -> Result<Vec<&str>, CliError> {
    let items: Vec<&str> = s.split(',').map(str::trim).collect();

    if items.iter().all(|i| i.is_empty()) {
        return Err(CliError::EmptyList);
    }

    Ok(items)
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, structopt::clap::Error> {
        Cli::from_iter_safe(std::iter::once("ramp_exec").chain(args.iter().copied()))
    }

    #[test]
    fn test_full_command_line() {
        let cli = parse(&["/dev/ttyUSB0", "1,2", "0.1,0.2", "bench"]).unwrap();

        assert_eq!(cli.port, "/dev/ttyUSB0");
        assert_eq!(cli.sensor_port, "/dev/ttyACM0");
        assert_eq!(cli.params, "ramp_exec.toml");
        assert_eq!(cli.step, None);
        assert!(!cli.sim);
        assert_eq!(
            cli.ramp_targets().unwrap(),
            vec![
                RampTarget { address: 1, target: 0.1 },
                RampTarget { address: 2, target: 0.2 }
            ]
        );

        let cli = parse(&[
            "/dev/ttyUSB0", "5", "0.3", "bench", "--sim", "--step", "0.01", "--sensor-port",
            "/dev/ttyACM1",
        ])
        .unwrap();
        assert!(cli.sim);
        assert_eq!(cli.step, Some(0.01));
        assert_eq!(cli.sensor_port, "/dev/ttyACM1");
    }

    #[test]
    fn test_malformed_command_line() {
        assert!(parse(&["/dev/ttyUSB0", "1,2", "0.1"]).is_err());
        assert!(parse(&["/dev/ttyUSB0", "0", "0.1", "bench"]).is_err());
        assert!(parse(&["/dev/ttyUSB0", "1,x", "0.1,0.2", "bench"]).is_err());

        let cli = parse(&["/dev/ttyUSB0", "1,2", "0.1", "bench"]).unwrap();
        assert_eq!(
            cli.ramp_targets(),
            Err(CliError::LengthMismatch {
                addresses: 2,
                targets: 1
            })
        );
    }

    #[test]
    fn test_lists() {
        assert_eq!("1, 2,3".parse::<AddressList>(), Ok(AddressList(vec![1, 2, 3])));
        assert_eq!("256".parse::<AddressList>(), Err(CliError::InvalidAddress("256".into())));
        assert_eq!("1,1".parse::<AddressList>(), Err(CliError::DuplicateAddress(1)));
        assert_eq!("".parse::<AddressList>(), Err(CliError::EmptyList));
        assert_eq!("1,".parse::<AddressList>(), Err(CliError::InvalidAddress("".into())));

        assert_eq!("0.1,2".parse::<TargetList>(), Ok(TargetList(vec![0.1, 2.0])));
        assert_eq!("a".parse::<TargetList>(), Err(CliError::InvalidTarget("a".into())));
    }
}
