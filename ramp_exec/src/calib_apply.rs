//! # Calibration Applicator
//!
//! Brings a controller from its bootloader into torque control: the motor's stored calibration is
//! read back and written into the working registers, then the control mode is switched with a zero
//! torque command in place.
//!
//! Any failure here is fatal, a partially calibrated motor must never be ramped. The only
//! exception is encoder angle compensation, which older firmware does not implement.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, warn};
use std::thread;
use std::time::Duration;
use thiserror::Error;

use bldc_if::{
    regs::{self, Address, ControlMode, RegisterWrite},
    CalibrationProfile, EncoderCompensation, RegisterTransport, TransportError,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Timing and rate settings used while bringing a controller up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BringUpParams {
    /// Time given to the controller to boot the firmware after leaving the bootloader
    pub bootloader_settle: Duration,

    /// Rate written to the control loop rate register
    pub control_loop_rate_hz: u16,
}

/// Zero torque pre-roll settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettleParams {
    /// Number of zero commands sent to each controller
    pub ticks: usize,

    /// Pause between two rounds of commands
    pub period: Duration,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// What happened to the encoder angle compensation of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EacOutcome {
    /// The profile has no compensation table
    Absent,

    /// Scale, offset and all `chunks` table chunks were written
    Applied { chunks: usize },

    /// The controller firmware does not implement compensation
    Unsupported,
}

#[derive(Debug, Error)]
pub enum CalibApplyError {
    #[error("Controller {address} did not leave its bootloader: {source}")]
    LeaveBootloader {
        address: Address,
        source: TransportError,
    },

    #[error("Cannot clear the controller bus input: {0}")]
    ResetInput(TransportError),

    #[error("Cannot read the calibration of controller {address}: {source}")]
    ReadCalibration {
        address: Address,
        source: TransportError,
    },

    #[error("Cannot write register {register:#06x} of controller {address}: {source}")]
    Write {
        address: Address,
        register: u16,
        source: TransportError,
    },
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Register writes carrying the base calibration, in the order they must be issued.
pub fn calibration_writes(address: Address, profile: &CalibrationProfile) -> Vec<RegisterWrite> {
    vec![
        RegisterWrite::f32(address, regs::ZERO_ANGLE, profile.zero_angle),
        RegisterWrite::u8(address, regs::INVERT_PHASES, profile.invert_phases as u8),
        RegisterWrite::u8(address, regs::EREVS_PER_MREV, profile.erevs_per_mrev),
        RegisterWrite::f32(address, regs::TORQUE_CONSTANT, profile.torque_constant),
        RegisterWrite::f32(address, regs::POSITION_OFFSET, profile.position_offset),
    ]
}

/// Register writes carrying an encoder angle compensation: scale, offset, then the table in
/// chunks of [`regs::EAC_CHUNK_LEN`] entries.
pub fn eac_writes(address: Address, eac: &EncoderCompensation) -> Vec<RegisterWrite> {
    let mut writes = vec![
        RegisterWrite::f32(address, regs::EAC_SCALE, eac.scale),
        RegisterWrite::f32(address, regs::EAC_OFFSET, eac.offset),
    ];

    writes.extend(
        eac.table
            .chunks(regs::EAC_CHUNK_LEN)
            .enumerate()
            .map(|(i, chunk)| {
                let register = regs::EAC_TABLE_BASE + (i * regs::EAC_CHUNK_LEN) as u16;
                RegisterWrite::i8_table(address, register, chunk)
            }),
    );

    writes
}

/// Write a calibration profile into a controller's working registers.
///
/// The base calibration is written one register per call. If the controller reports the
/// compensation registers as unsupported a warning is logged and the rest of the table is skipped.
pub fn apply_calibration<T: RegisterTransport + ?Sized>(
    transport: &mut T,
    address: Address,
    profile: &CalibrationProfile,
) -> Result<EacOutcome, CalibApplyError> {
    for w in calibration_writes(address, profile) {
        write(transport, w)?;
    }

    let eac = match &profile.encoder_compensation {
        Some(e) => e,
        None => return Ok(EacOutcome::Absent),
    };

    let writes = eac_writes(address, eac);
    let chunks = writes.len() - 2;

    for w in writes {
        let register = w.register;
        match transport.write_register(w) {
            Ok(()) => (),
            Err(e) if e.is_unsupported() => {
                warn!(
                    "Controller {} does not support encoder angle compensation, try updating \
                     the firmware",
                    address
                );
                return Ok(EacOutcome::Unsupported);
            }
            Err(source) => {
                return Err(CalibApplyError::Write {
                    address,
                    register,
                    source,
                })
            }
        }
    }

    debug!(
        "Controller {} encoder angle compensation written ({} entries)",
        address,
        eac.table.len()
    );

    Ok(EacOutcome::Applied { chunks })
}

/// Switch a calibrated controller into torque control with a zero torque command.
pub fn enter_torque_mode<T: RegisterTransport + ?Sized>(
    transport: &mut T,
    address: Address,
    control_loop_rate_hz: u16,
) -> Result<(), CalibApplyError> {
    write(transport, RegisterWrite::control_mode(address, ControlMode::Current))?;
    write(
        transport,
        RegisterWrite::u16(address, regs::CONTROL_LOOP_RATE, control_loop_rate_hz),
    )?;
    write(transport, RegisterWrite::torque_command(address, 0.0))?;
    write(transport, RegisterWrite::control_mode(address, ControlMode::Torque))?;

    Ok(())
}

/// Bring one controller up: leave the bootloader, load and apply its calibration, enter torque
/// mode.
pub fn bring_up<T: RegisterTransport + ?Sized>(
    transport: &mut T,
    address: Address,
    params: &BringUpParams,
) -> Result<CalibrationProfile, CalibApplyError> {
    transport
        .leave_bootloader(address)
        .map_err(|source| CalibApplyError::LeaveBootloader { address, source })?;

    thread::sleep(params.bootloader_settle);

    // The bootloader may have left a banner on the bus
    transport
        .reset_input_buffer()
        .map_err(CalibApplyError::ResetInput)?;

    let profile = transport
        .read_calibration(address)
        .map_err(|source| CalibApplyError::ReadCalibration { address, source })?;

    debug!("Controller {} calibration: {:?}", address, profile);

    let eac = apply_calibration(transport, address, &profile)?;
    enter_torque_mode(transport, address, params.control_loop_rate_hz)?;

    info!(
        "Controller {} ready in torque mode (encoder compensation: {:?})",
        address, eac
    );

    Ok(profile)
}

/// Send rounds of zero torque commands to every controller, keeping their command timeout fed
/// while the sensor settles.
///
/// Failed writes are not retried. Returns the number of failed writes.
pub fn settle<T: RegisterTransport + ?Sized>(
    transport: &mut T,
    addresses: &[Address],
    params: &SettleParams,
) -> usize {
    let mut failures = 0;

    for _ in 0..params.ticks {
        for &address in addresses {
            if transport
                .write_register(RegisterWrite::torque_command(address, 0.0))
                .is_err()
            {
                failures += 1;
            }
        }
        thread::sleep(params.period);
    }

    if failures > 0 {
        warn!("{} zero torque commands failed during settling", failures);
    }

    failures
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn write<T: RegisterTransport + ?Sized>(
    transport: &mut T,
    w: RegisterWrite,
) -> Result<(), CalibApplyError> {
    let (address, register) = (w.address, w.register);

    transport
        .write_register(w)
        .map_err(|source| CalibApplyError::Write {
            address,
            register,
            source,
        })
}

#[cfg(test)]
mod test {
    use super::*;
    use bldc_if::sim::SimController;

    fn profile(table_len: Option<usize>) -> CalibrationProfile {
        CalibrationProfile {
            zero_angle: 1234.0,
            invert_phases: true,
            erevs_per_mrev: 14,
            torque_constant: 0.05,
            position_offset: 0.25,
            encoder_compensation: table_len.map(|n| EncoderCompensation {
                scale: 0.01,
                offset: -0.5,
                table: (0..n).map(|i| (i % 100) as i8).collect(),
            }),
        }
    }

    fn ready(p: CalibrationProfile) -> SimController {
        let mut sim = SimController::new().with_motor(3, p);
        sim.leave_bootloader(3).unwrap();
        sim
    }

    #[test]
    fn test_base_calibration() {
        let p = profile(None);
        let mut sim = ready(p.clone());

        assert_eq!(apply_calibration(&mut sim, 3, &p).unwrap(), EacOutcome::Absent);

        let registers: Vec<u16> = sim.writes().iter().map(|w| w.register).collect();
        assert_eq!(
            registers,
            vec![
                regs::ZERO_ANGLE,
                regs::INVERT_PHASES,
                regs::EREVS_PER_MREV,
                regs::TORQUE_CONSTANT,
                regs::POSITION_OFFSET
            ]
        );
        assert_eq!(sim.register(3, regs::INVERT_PHASES), Some(vec![1]));
        assert_eq!(sim.register(3, regs::EREVS_PER_MREV), Some(vec![14]));
    }

    #[test]
    fn test_eac_chunks() {
        let p = profile(Some(257));
        let mut sim = ready(p.clone());

        assert_eq!(
            apply_calibration(&mut sim, 3, &p).unwrap(),
            EacOutcome::Applied { chunks: 5 }
        );

        let writes = sim.writes();
        assert_eq!(writes.len(), 5 + 2 + 5);

        let tables: Vec<(u16, u8)> = writes[7..].iter().map(|w| (w.register, w.count)).collect();
        assert_eq!(
            tables,
            vec![(0x1200, 64), (0x1240, 64), (0x1280, 64), (0x12C0, 64), (0x1300, 1)]
        );
    }

    #[test]
    fn test_eac_unsupported_continues() {
        let p = profile(Some(100));
        let mut sim = ready(p.clone()).reject_registers(vec![regs::EAC_SCALE]);

        assert_eq!(apply_calibration(&mut sim, 3, &p).unwrap(), EacOutcome::Unsupported);
        assert!(enter_torque_mode(&mut sim, 3, 1000).is_ok());
        assert_eq!(sim.register(3, regs::CONTROL_MODE), Some(vec![ControlMode::Torque as u8]));
    }

    #[test]
    fn test_other_failures_fatal() {
        let p = profile(None);

        // Controller still in its bootloader rejects writes
        let mut sim = SimController::new().with_motor(3, p.clone());
        match apply_calibration(&mut sim, 3, &p) {
            Err(CalibApplyError::Write { register, .. }) => assert_eq!(register, regs::ZERO_ANGLE),
            r => panic!("Expected a write error, got {:?}", r),
        }

        // No controller at all
        let mut sim = SimController::new();
        let params = BringUpParams {
            bootloader_settle: Duration::from_millis(0),
            control_loop_rate_hz: 1000,
        };
        assert!(matches!(
            bring_up(&mut sim, 9, &params),
            Err(CalibApplyError::ReadCalibration { address: 9, .. })
        ));
    }

    #[test]
    fn test_bring_up_order() {
        let p = profile(None);
        let mut sim = SimController::new().with_motor(3, p.clone());
        let params = BringUpParams {
            bootloader_settle: Duration::from_millis(0),
            control_loop_rate_hz: 1000,
        };

        assert_eq!(bring_up(&mut sim, 3, &params).unwrap(), p);

        let writes = sim.writes();
        assert_eq!(writes.len(), 9);
        assert_eq!(writes[5], RegisterWrite::control_mode(3, ControlMode::Current));
        assert_eq!(writes[6], RegisterWrite::u16(3, regs::CONTROL_LOOP_RATE, 1000));
        assert_eq!(writes[7], RegisterWrite::torque_command(3, 0.0));
        assert_eq!(writes[8], RegisterWrite::control_mode(3, ControlMode::Torque));
    }

    #[test]
    fn test_settle_ignores_failures() {
        let mut sim = ready(profile(None)).fail_torque_writes(vec![0, 3]);
        let params = SettleParams {
            ticks: 4,
            period: Duration::from_millis(0),
        };

        assert_eq!(settle(&mut sim, &[3], &params), 2);
        assert_eq!(sim.writes().len(), 4);
    }
}
