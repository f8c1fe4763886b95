//! # Ramp Executable
//!
//! Bench characterisation of BLDC motor torque. For each given controller the executable:
//!
//!     - Brings the controller out of its bootloader and loads the motor's calibration
//!     - Ramps the torque command from zero to the target, back down and into the negative
//!       overshoot, one setpoint per tick
//!     - Reads the strain gauge digitizer once per tick
//!     - Writes the merged command and strain record to the session archive
//!
//! With `--sim` the simulated bench is driven instead of the serial ports.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::info;
use structopt::{
    clap::{Error as ClapError, ErrorKind},
    StructOpt,
};

// Internal
use bldc_if::{
    sim::{SimController, SimSensor},
    Address, CalibrationProfile, EncoderCompensation, LineChannel, RegisterTransport,
    SerialLineChannel, SerialRegisterClient,
};
use ramp_lib::{
    cli::Cli,
    params::RampExecParams,
    ramp_session,
    sampler::SessionClock,
};
use util::{logger::logger_init, session::Session};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Strain reported by the simulated digitizer per unit of torque command.
const SIM_STRAIN_GAIN: f32 = 10.0;

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    // ---- ARGUMENTS ----

    // Malformed arguments print the usage and exit before anything is touched
    let cli = Cli::from_args();
    let targets = match cli.ramp_targets() {
        Ok(t) => t,
        Err(e) => ClapError::with_description(&e.to_string(), ErrorKind::ValueValidation).exit(),
    };

    // ---- LOAD PARAMETERS ----

    // Loaded before logging starts as they set its levels
    let mut params: RampExecParams =
        util::params::load(&cli.params).wrap_err("Could not load the exec params")?;

    if let Some(step) = cli.step {
        params.step = step;
    }

    params.are_valid().wrap_err("Invalid exec params")?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("ramp_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(&params.log_levels(), &session).wrap_err("Failed to initialise logging")?;

    info!("BLDC Ramp Executable\n");
    info!("Exec parameters loaded from {}", cli.params);

    // Every profile is checked before any controller is touched
    let ramps = ramp_session::plan(&targets, params.step, params.overshoot_len)
        .wrap_err("Invalid ramp")?;

    // ---- OPEN THE BENCH ----

    let addresses: Vec<Address> = targets.iter().map(|t| t.address).collect();

    let transport: Box<dyn RegisterTransport>;
    let sensor: Box<dyn LineChannel>;

    if cli.sim {
        info!("Driving the simulated bench");
        let (sim_ctrl, sim_sensor) = sim_bench(&addresses);
        transport = Box::new(sim_ctrl);
        sensor = Box::new(sim_sensor);
    } else {
        transport = Box::new(
            SerialRegisterClient::open(&cli.port, params.motor_baud_rate, params.motor_timeout())
                .wrap_err_with(|| format!("Failed to open the controller bus on {}", cli.port))?,
        );

        sensor = Box::new(
            SerialLineChannel::open(
                &cli.sensor_port,
                params.sensor_baud_rate,
                params.sensor_timeout(),
            )
            .wrap_err_with(|| format!("Failed to open the strain gauge on {}", cli.sensor_port))?,
        );
    }

    // ---- RUN ----

    let records = ramp_session::run(
        transport,
        sensor,
        SessionClock,
        &ramps,
        &params,
        &cli.title,
        &session.arch_root,
    )
    .wrap_err("Ramp session failed")?;

    info!("Session complete, {} recordings written", records.len());

    Ok(())
}

/// A simulated bench with one controller per address and a strain gauge following the torque.
fn sim_bench(addresses: &[Address]) -> (SimController, SimSensor) {
    let calibration = CalibrationProfile {
        zero_angle: 0.0,
        invert_phases: false,
        erevs_per_mrev: 14,
        torque_constant: 0.05,
        position_offset: 0.0,
        encoder_compensation: Some(EncoderCompensation {
            scale: 0.01,
            offset: 0.0,
            table: vec![0; 257],
        }),
    };

    let ctrl = addresses.iter().fold(SimController::new(), |ctrl, &a| {
        ctrl.with_motor(a, calibration.clone())
    });
    let sensor = SimSensor::following(ctrl.clone(), SIM_STRAIN_GAIN);

    (ctrl, sensor)
}
