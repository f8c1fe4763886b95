//! # Simulated Bench
//!
//! A register-file model of the motor controllers and a strain digitizer model, used for dry runs
//! without hardware and for testing. Both are cheap to clone and share their state, so a clone can
//! be kept to inspect what the code under test did.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io::{self, ErrorKind};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    calibration::CalibrationProfile,
    regs::{self, Address, RegisterWrite},
    sensor::LineChannel,
    transport::{ProtocolError, RegisterTransport, TransportError},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Status the simulated controller answers with for writes issued while in the bootloader.
const STATUS_IN_BOOTLOADER: u8 = 0x02;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Simulated controllers sharing one bus.
#[derive(Clone, Default)]
pub struct SimController {
    inner: Arc<Mutex<SimControllerInner>>,
}

#[derive(Default)]
struct SimControllerInner {
    motors: BTreeMap<Address, SimMotor>,

    /// Every write request received, in order, including failed ones
    writes: Vec<RegisterWrite>,

    /// Registers the firmware does not implement
    unsupported: HashSet<u16>,

    /// Indices (counting from zero over all torque command writes) which fail with an I/O error
    failing_torque_writes: HashSet<usize>,

    num_torque_writes: usize,

    last_torque_command: f32,
}

struct SimMotor {
    calibration: CalibrationProfile,
    in_bootloader: bool,
    registers: HashMap<u16, Vec<u8>>,
}

/// Simulated strain gauge digitizer.
pub struct SimSensor {
    source: SensorSource,
}

/// One scripted outcome of [`SimSensor::read_line`].
#[derive(Debug, Clone)]
pub enum SimRead {
    /// A line, returned as is
    Line(Vec<u8>),

    /// Nothing arrived before the timeout
    Timeout,

    /// The read fails with an I/O error
    Error,
}

enum SensorSource {
    Scripted {
        reads: VecDeque<SimRead>,
        fallback: SimRead,
    },
    Following {
        controller: SimController,
        gain: f32,
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a controller, starting in its bootloader, holding the given calibration.
    pub fn with_motor(self, address: Address, calibration: CalibrationProfile) -> Self {
        self.lock().motors.insert(address, SimMotor {
            calibration,
            in_bootloader: true,
            registers: HashMap::new(),
        });
        self
    }

    /// Make every controller answer writes to these registers as unsupported.
    pub fn reject_registers<I: IntoIterator<Item = u16>>(self, registers: I) -> Self {
        self.lock().unsupported.extend(registers);
        self
    }

    /// Make the given torque command writes (zero based, over all addresses) fail with an I/O
    /// error.
    pub fn fail_torque_writes<I: IntoIterator<Item = usize>>(self, indices: I) -> Self {
        self.lock().failing_torque_writes.extend(indices);
        self
    }

    /// All write requests received so far.
    pub fn writes(&self) -> Vec<RegisterWrite> {
        self.lock().writes.clone()
    }

    /// All write requests received so far by one controller.
    pub fn writes_to(&self, address: Address) -> Vec<RegisterWrite> {
        self.lock()
            .writes
            .iter()
            .filter(|w| w.address == address)
            .cloned()
            .collect()
    }

    /// Current contents of a register, `None` if never written.
    pub fn register(&self, address: Address, register: u16) -> Option<Vec<u8>> {
        self.lock()
            .motors
            .get(&address)
            .and_then(|m| m.registers.get(&register).cloned())
    }

    /// Whether the controller is still in its bootloader, `None` if there is no such controller.
    pub fn in_bootloader(&self, address: Address) -> Option<bool> {
        self.lock().motors.get(&address).map(|m| m.in_bootloader)
    }

    /// The most recent torque command accepted on the bus.
    pub fn last_torque_command(&self) -> f32 {
        self.lock().last_torque_command
    }

    fn lock(&self) -> MutexGuard<'_, SimControllerInner> {
        // A poisoned lock only means another holder panicked, the data is still usable
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SimControllerInner {
    fn write(&mut self, w: &RegisterWrite) -> Result<(), TransportError> {
        self.writes.push(w.clone());

        if w.register == regs::TORQUE_COMMAND {
            let idx = self.num_torque_writes;
            self.num_torque_writes += 1;

            if self.failing_torque_writes.contains(&idx) {
                return Err(io::Error::new(ErrorKind::TimedOut, "simulated write timeout").into());
            }
        }

        let unsupported = self.unsupported.contains(&w.register);
        let motor = self
            .motors
            .get_mut(&w.address)
            .ok_or(ProtocolError::NoResponse(w.address))?;

        if motor.in_bootloader {
            return Err(ProtocolError::Rejected {
                address: w.address,
                status: STATUS_IN_BOOTLOADER,
            }
            .into());
        }

        if unsupported {
            return Err(ProtocolError::Unsupported {
                address: w.address,
                register: w.register,
            }
            .into());
        }

        motor.registers.insert(w.register, w.payload.clone());

        if let Some(t) = w.as_f32().filter(|_| w.register == regs::TORQUE_COMMAND) {
            self.last_torque_command = t;
        }

        Ok(())
    }
}

impl RegisterTransport for SimController {
    fn write_registers(&mut self, writes: &[RegisterWrite]) -> Result<(), TransportError> {
        let mut inner = self.lock();
        for w in writes {
            inner.write(w)?;
        }
        Ok(())
    }

    fn read_registers(
        &mut self,
        address: Address,
        register: u16,
        count: u8,
    ) -> Result<Vec<u8>, TransportError> {
        let inner = self.lock();
        let motor = inner
            .motors
            .get(&address)
            .ok_or(ProtocolError::NoResponse(address))?;

        Ok(motor
            .registers
            .get(&register)
            .cloned()
            .unwrap_or_else(|| vec![0; count as usize]))
    }

    fn read_calibration(&mut self, address: Address) -> Result<CalibrationProfile, TransportError> {
        self.lock()
            .motors
            .get(&address)
            .map(|m| m.calibration.clone())
            .ok_or_else(|| ProtocolError::NoResponse(address).into())
    }

    fn leave_bootloader(&mut self, address: Address) -> Result<(), TransportError> {
        // Like the real firmware this is not acknowledged, unknown addresses are silently ignored
        if let Some(m) = self.lock().motors.get_mut(&address) {
            m.in_bootloader = false;
        }
        Ok(())
    }
}

impl SimSensor {
    /// A sensor answering the same line to every read.
    pub fn constant(line: &str) -> Self {
        Self::scripted(Vec::new(), SimRead::Line(line.as_bytes().to_vec()))
    }

    /// A sensor playing back `reads` in order, then `fallback` forever.
    pub fn scripted(reads: Vec<SimRead>, fallback: SimRead) -> Self {
        Self {
            source: SensorSource::Scripted {
                reads: reads.into(),
                fallback,
            },
        }
    }

    /// A sensor reading strain proportional to the last torque command on the bus, with the
    /// second channel mirroring the first.
    pub fn following(controller: SimController, gain: f32) -> Self {
        Self {
            source: SensorSource::Following { controller, gain },
        }
    }
}

impl SimRead {
    fn into_result(self) -> io::Result<Vec<u8>> {
        match self {
            SimRead::Line(l) => Ok(l),
            SimRead::Timeout => Ok(Vec::new()),
            SimRead::Error => Err(io::Error::new(ErrorKind::Other, "simulated sensor fault")),
        }
    }
}

impl LineChannel for SimSensor {
    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        match &mut self.source {
            SensorSource::Scripted { reads, fallback } => reads
                .pop_front()
                .unwrap_or_else(|| fallback.clone())
                .into_result(),
            SensorSource::Following { controller, gain } => {
                let strain = controller.last_torque_command() * *gain;
                Ok(format!("{:.6},{:.6}\r\n", strain, -strain).into_bytes())
            }
        }
    }

    fn reset_input_buffer(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn calibration() -> CalibrationProfile {
        CalibrationProfile {
            zero_angle: 0.0,
            invert_phases: false,
            erevs_per_mrev: 14,
            torque_constant: 0.05,
            position_offset: 0.0,
            encoder_compensation: None,
        }
    }

    #[test]
    fn test_bootloader_gate() {
        let mut ctrl = SimController::new().with_motor(1, calibration());

        assert!(ctrl.write_register(RegisterWrite::torque_command(1, 0.1)).is_err());

        ctrl.leave_bootloader(1).unwrap();
        assert_eq!(ctrl.in_bootloader(1), Some(false));
        ctrl.write_register(RegisterWrite::torque_command(1, 0.1)).unwrap();

        assert_eq!(ctrl.last_torque_command(), 0.1);
        assert_eq!(ctrl.writes_to(1).len(), 2);
        assert_eq!(
            ctrl.read_registers(1, regs::TORQUE_COMMAND, 1).unwrap(),
            0.1f32.to_le_bytes().to_vec()
        );
    }

    #[test]
    fn test_configured_faults() {
        let mut ctrl = SimController::new()
            .with_motor(1, calibration())
            .reject_registers(vec![regs::EAC_SCALE])
            .fail_torque_writes(vec![1]);
        ctrl.leave_bootloader(1).unwrap();

        assert!(ctrl
            .write_register(RegisterWrite::f32(1, regs::EAC_SCALE, 1.0))
            .unwrap_err()
            .is_unsupported());

        assert!(ctrl.write_register(RegisterWrite::torque_command(1, 0.1)).is_ok());
        assert!(matches!(
            ctrl.write_register(RegisterWrite::torque_command(1, 0.2)),
            Err(TransportError::Io(_))
        ));
        assert!(ctrl.write_register(RegisterWrite::torque_command(1, 0.3)).is_ok());

        assert!(matches!(
            ctrl.read_calibration(9),
            Err(TransportError::Protocol(ProtocolError::NoResponse(9)))
        ));
    }

    #[test]
    fn test_sensor_sources() {
        let mut s = SimSensor::scripted(
            vec![SimRead::Line(b"1,2\r\n".to_vec()), SimRead::Error],
            SimRead::Timeout,
        );
        assert_eq!(s.read_line().unwrap(), b"1,2\r\n".to_vec());
        assert!(s.read_line().is_err());
        assert!(s.read_line().unwrap().is_empty());

        let mut ctrl = SimController::new().with_motor(1, calibration());
        ctrl.leave_bootloader(1).unwrap();
        ctrl.write_register(RegisterWrite::torque_command(1, 0.5)).unwrap();

        let mut s = SimSensor::following(ctrl, 2.0);
        assert_eq!(s.read_line().unwrap(), b"1.000000,-1.000000\r\n".to_vec());
    }
}
