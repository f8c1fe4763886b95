//! Whole bench sessions driven against the simulated bench.

use std::cell::{Cell, RefCell};
use std::fs;
use std::io;
use std::rc::Rc;

use bldc_if::{
    regs,
    sim::{SimController, SimRead, SimSensor},
    CalibrationProfile, EncoderCompensation, LineChannel,
};
use ramp_lib::{
    cli::RampTarget,
    params::RampExecParams,
    ramp_session::{self, RampSessionError},
    sampler::Clock,
};

/// Clock advancing by 1 ms on every read.
#[derive(Default)]
struct TickClock {
    now: Cell<f64>,
}

impl Clock for TickClock {
    fn elapsed_s(&self) -> f64 {
        let t = self.now.get();
        self.now.set(t + 0.001);
        t
    }
}

/// Digitizer noting how many bus writes had been made each time its input is cleared.
struct ResetLog {
    sensor: SimSensor,
    bus: SimController,
    resets: Rc<RefCell<Vec<usize>>>,
}

impl LineChannel for ResetLog {
    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        self.sensor.read_line()
    }

    fn reset_input_buffer(&mut self) -> io::Result<()> {
        self.resets.borrow_mut().push(self.bus.writes().len());
        self.sensor.reset_input_buffer()
    }
}

fn params(step: f64) -> RampExecParams {
    RampExecParams {
        step,
        bootloader_settle_ms: 0,
        settle_ticks: 2,
        settle_period_ms: 0,
        ..Default::default()
    }
}

fn calibration(eac_len: Option<usize>) -> CalibrationProfile {
    CalibrationProfile {
        zero_angle: 512.0,
        invert_phases: false,
        erevs_per_mrev: 14,
        torque_constant: 0.05,
        position_offset: 0.0,
        encoder_compensation: eac_len.map(|n| EncoderCompensation {
            scale: 0.02,
            offset: 0.1,
            table: vec![-3; n],
        }),
    }
}

fn targets(pairs: &[(u8, f64)]) -> Vec<RampTarget> {
    pairs
        .iter()
        .map(|&(address, target)| RampTarget { address, target })
        .collect()
}

fn is_calibration_register(register: u16) -> bool {
    matches!(
        register,
        regs::ZERO_ANGLE
            | regs::INVERT_PHASES
            | regs::EREVS_PER_MREV
            | regs::TORQUE_CONSTANT
            | regs::POSITION_OFFSET
            | regs::EAC_SCALE
            | regs::EAC_OFFSET
    ) || register >= regs::EAC_TABLE_BASE && register < regs::CONTROL_MODE
}

#[test]
fn test_single_ramp_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let sim = SimController::new().with_motor(1, calibration(None));
    let p = params(0.05);

    let ramps = ramp_session::plan(&targets(&[(1, 0.1)]), p.step, p.overshoot_len).unwrap();
    let records = ramp_session::run(
        sim.clone(),
        SimSensor::constant("1.0,2.0\r\n"),
        TickClock::default(),
        &ramps,
        &p,
        "bench",
        dir.path(),
    )
    .unwrap();

    assert_eq!(records.len(), 1);
    let summary = &records[0].summary;
    assert_eq!(summary.stats.ticks, 9);
    assert_eq!(summary.stats.degraded_ticks, 0);
    assert_eq!(summary.rows_padded, 0);
    assert_eq!(records[0].path, dir.path().join("bench_0.1.csv"));

    // Read the recording back
    let contents = fs::read_to_string(&records[0].path).unwrap();
    let mut lines = contents.lines();
    assert_eq!(lines.next(), Some("time,command,strain1,strain2"));

    let rows: Vec<Vec<f64>> = lines
        .map(|l| l.split(',').map(|v| v.parse().unwrap()).collect())
        .collect();
    assert_eq!(rows.len(), 9);

    let ascending: Vec<(f64, f64, f64)> = rows[..3].iter().map(|r| (r[1], r[2], r[3])).collect();
    assert_eq!(
        ascending,
        vec![(0.0, 1.0, 2.0), (0.05, 1.0, 2.0), (0.1, 1.0, 2.0)]
    );

    let commands: Vec<f64> = rows.iter().map(|r| r[1]).collect();
    assert_eq!(
        commands,
        vec![0.0, 0.05, 0.1, 0.1, 0.05, 0.0, 0.0, -0.05, -0.1]
    );
    assert!(rows.windows(2).all(|w| w[0][0] < w[1][0]));

    // Controller left at zero torque
    assert_eq!(sim.last_torque_command(), 0.0);
    assert_eq!(
        sim.register(1, regs::CONTROL_MODE),
        Some(vec![regs::ControlMode::Torque as u8])
    );
}

#[test]
fn test_calibration_precedes_ramps() {
    let dir = tempfile::tempdir().unwrap();
    let sim = SimController::new()
        .with_motor(1, calibration(None))
        .with_motor(2, calibration(Some(100)));
    let p = params(0.01);

    let ramps =
        ramp_session::plan(&targets(&[(1, 0.1), (2, 0.2)]), p.step, p.overshoot_len).unwrap();
    let records = ramp_session::run(
        sim.clone(),
        SimSensor::constant("0.5,0.5\r\n"),
        TickClock::default(),
        &ramps,
        &p,
        "multi",
        dir.path(),
    )
    .unwrap();

    // Base calibration only, then with scale, offset and two table chunks
    let calib_count =
        |a: u8| sim.writes_to(a).iter().filter(|w| is_calibration_register(w.register)).count();
    assert_eq!(calib_count(1), 5);
    assert_eq!(calib_count(2), 5 + 2 + 2);

    // Every calibration write comes before the first ramp tick: bring up is 9 writes for
    // controller 1 and 13 for controller 2, then 2 rounds of settle commands
    let writes = sim.writes();
    let first_tick = 9 + 13 + 2 * 2;
    assert!(writes[..first_tick]
        .iter()
        .all(|w| w.register != regs::TORQUE_COMMAND || w.as_f32() == Some(0.0)));
    assert!(writes[first_tick..]
        .iter()
        .all(|w| !is_calibration_register(w.register)));

    // One recording per ramp, ramps run in order
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].summary.address, 1);
    assert_eq!(records[0].summary.stats.ticks, 2 * 11 + 11);
    assert_eq!(records[1].summary.address, 2);
    assert_eq!(records[1].summary.stats.ticks, 2 * 21 + 21);
    assert!(dir.path().join("multi_0.1.csv").exists());
    assert!(dir.path().join("multi_0.2.csv").exists());
}

#[test]
fn test_degraded_ticks_keep_every_row() {
    let dir = tempfile::tempdir().unwrap();

    // Torque writes: 0 is bring up, 1 and 2 settle, the ramp starts at 3
    let sim = SimController::new()
        .with_motor(4, calibration(None))
        .fail_torque_writes(vec![3, 5]);
    let sensor = SimSensor::scripted(
        vec![
            SimRead::Line(b"1.0,2.0\r\n".to_vec()),
            SimRead::Line(b"not a sample\r\n".to_vec()),
            SimRead::Timeout,
            SimRead::Error,
        ],
        SimRead::Line(b"3.0,4.0\r\n".to_vec()),
    );
    let p = params(0.05);

    let ramps = ramp_session::plan(&targets(&[(4, 0.1)]), p.step, p.overshoot_len).unwrap();
    let records = ramp_session::run(
        sim,
        sensor,
        TickClock::default(),
        &ramps,
        &p,
        "faults",
        dir.path(),
    )
    .unwrap();

    let stats = records[0].summary.stats;
    assert_eq!(stats.ticks, 9);
    assert_eq!(stats.motor_write_faults, 2);
    assert_eq!(stats.parse_faults, 1);
    assert_eq!(stats.sensor_read_faults, 2);
    assert_eq!(stats.degraded_ticks, 4);

    let contents = fs::read_to_string(&records[0].path).unwrap();
    let rows: Vec<&str> = contents.lines().skip(1).collect();
    assert_eq!(rows.len(), 9);
    assert!(rows[0].ends_with(",0.0,1.0,2.0"));
    assert!(rows[1].ends_with(",0.05,0.0,0.0"));
    assert!(rows[2].ends_with(",0.1,0.0,0.0"));
    assert!(rows[3].ends_with(",0.1,0.0,0.0"));
    assert!(rows[4].ends_with(",0.05,3.0,4.0"));
}

#[test]
fn test_unsupported_compensation_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let sim = SimController::new()
        .with_motor(1, calibration(Some(257)))
        .reject_registers(vec![regs::EAC_SCALE]);
    let p = params(0.05);

    let ramps = ramp_session::plan(&targets(&[(1, 0.1)]), p.step, p.overshoot_len).unwrap();
    let records = ramp_session::run(
        sim.clone(),
        SimSensor::constant("1.0,2.0\r\n"),
        TickClock::default(),
        &ramps,
        &p,
        "old_fw",
        dir.path(),
    )
    .unwrap();

    assert_eq!(records[0].summary.stats.ticks, 9);
    assert!(sim
        .writes()
        .iter()
        .all(|w| w.register < regs::EAC_TABLE_BASE || w.register >= regs::CONTROL_MODE));
}

#[test]
fn test_setup_failure_aborts_before_motion() {
    let dir = tempfile::tempdir().unwrap();

    // Controller 2 is not on the bus
    let sim = SimController::new().with_motor(1, calibration(None));
    let p = params(0.05);

    let ramps =
        ramp_session::plan(&targets(&[(1, 0.1), (2, 0.1)]), p.step, p.overshoot_len).unwrap();
    let result = ramp_session::run(
        sim.clone(),
        SimSensor::constant("1.0,2.0\r\n"),
        TickClock::default(),
        &ramps,
        &p,
        "abort",
        dir.path(),
    );

    assert!(matches!(result, Err(RampSessionError::BringUp(_))));
    assert!(sim
        .writes()
        .iter()
        .filter(|w| w.register == regs::TORQUE_COMMAND)
        .all(|w| w.as_f32() == Some(0.0)));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_waiting_controllers_keep_receiving_commands() {
    let dir = tempfile::tempdir().unwrap();
    let sim = SimController::new()
        .with_motor(1, calibration(None))
        .with_motor(2, calibration(None))
        .with_motor(3, calibration(Some(10)));
    let p = RampExecParams {
        settle_ticks: 3,
        ..params(0.01)
    };

    let ramps = ramp_session::plan(
        &targets(&[(1, 0.1), (2, 0.1), (3, 0.05)]),
        p.step,
        p.overshoot_len,
    )
    .unwrap();
    ramp_session::run(
        sim.clone(),
        SimSensor::constant("1.0,2.0\r\n"),
        TickClock::default(),
        &ramps,
        &p,
        "hold",
        dir.path(),
    )
    .unwrap();

    let torque: Vec<_> = sim
        .writes()
        .into_iter()
        .filter(|w| w.register == regs::TORQUE_COMMAND)
        .collect();

    // From its first torque command to its release no controller misses a whole tick, a tick
    // being at most one write per controller plus the release of the previous ramp
    for address in 1..=3 {
        let indices: Vec<usize> = torque
            .iter()
            .enumerate()
            .filter(|(_, w)| w.address == address)
            .map(|(i, _)| i)
            .collect();
        let longest_gap = indices.windows(2).map(|w| w[1] - w[0]).max().unwrap();

        assert!(
            longest_gap <= 2 * ramps.len(),
            "controller {} went {} torque writes without a command",
            address,
            longest_gap
        );
        assert_eq!(torque[*indices.last().unwrap()].as_f32(), Some(0.0));
    }
}

#[test]
fn test_sensor_cleared_before_each_ramp() {
    let dir = tempfile::tempdir().unwrap();
    let sim = SimController::new()
        .with_motor(1, calibration(None))
        .with_motor(2, calibration(None));
    let resets = Rc::new(RefCell::new(Vec::new()));
    let sensor = ResetLog {
        sensor: SimSensor::constant("1.0,2.0\r\n"),
        bus: sim.clone(),
        resets: resets.clone(),
    };
    let p = params(0.05);

    let ramps =
        ramp_session::plan(&targets(&[(1, 0.1), (2, 0.1)]), p.step, p.overshoot_len).unwrap();
    let records = ramp_session::run(
        sim.clone(),
        sensor,
        TickClock::default(),
        &ramps,
        &p,
        "reset",
        dir.path(),
    )
    .unwrap();

    // Bring up is 9 writes per controller and settling 2 rounds of 2, so the first ramp tick is
    // write 22. Each tick of the first ramp also holds controller 2, then controller 1 is released.
    let first_tick = 2 * 9 + 2 * 2;
    let second_tick = first_tick + 2 * records[0].summary.stats.ticks as usize + 1;
    assert_eq!(*resets.borrow(), vec![first_tick, second_tick]);
}
