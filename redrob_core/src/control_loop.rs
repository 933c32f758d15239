//! The control loop: the top-level cyclic task.
//!
//! Owns every worker and controller for its supervised lifetime. Each cycle
//! runs, in order: shutdown switch, battery check, system stats, worker
//! supervision, steering, camera.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::DaemonConfig;
use crate::control::camera::CameraController;
use crate::control::codes::SteerCode;
use crate::control::motor::{MotorController, SteerMode};
use crate::control::remote::{Arbiter, NetRemote, RemoteControl, RfRemote};
use crate::error::{RedrobError, RedrobResult};
use crate::hardware::leds::{Led, StatusLeds};
use crate::hardware::switches::HwSwitches;
use crate::hardware::sys_stat::SysStatSampler;
use crate::hardware::Hardware;
use crate::net::server::ServerControl;
use crate::task::{
    abort_task, check_task, finalize_task, initialize_task, CyclicBody, CyclicTask,
    SupervisionTimeouts,
};
use crate::tlog;
use crate::workers::alive::{AliveBeacon, ALIVE_FREQUENCY, ALIVE_TASK_NAME, ALIVE_TIMEOUTS};
use crate::workers::battery::{
    BatteryCell, BatteryMonitor, BATTERY_FREQUENCY, BATTERY_TASK_NAME, BATTERY_TIMEOUTS,
};

pub const CTRL_TASK_NAME: &str = "REDROBD_CTRL";
pub const CTRL_TIMEOUTS: SupervisionTimeouts =
    SupervisionTimeouts::from_millis(3000, 500, 10000);

const SYS_STAT_PERIOD: Duration = Duration::from_secs(1);

/// How far setup got, so cleanup only undoes what was done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    None,
    Alive,
    Rf,
    Net,
    Camera,
    Motor,
    Battery,
    Ready,
}

pub struct ControlLoop {
    alive: CyclicTask<AliveBeacon>,
    switches: HwSwitches,
    rf: RfRemote,
    net: NetRemote,
    camera: CameraController,
    motor: MotorController,
    battery: CyclicTask<BatteryMonitor>,
    battery_cell: Arc<BatteryCell>,
    bat_low_led: Led,
    arbiter: Arbiter,
    sys_stat: SysStatSampler,

    forced_mode: Option<SteerMode>,
    min_voltage: f32,
    verbose: bool,

    shutdown_request: Arc<AtomicBool>,
    shutdown_signalled: bool,
    battery_low: bool,
    last_steer: SteerCode,
    battery_due: Instant,
    sys_stat_due: Instant,
    stage: Stage,
}

impl ControlLoop {
    /// Wire up the loop. Nothing touches hardware until setup.
    pub fn new(
        hw: &Hardware,
        leds: &StatusLeds,
        config: &DaemonConfig,
        shutdown_request: Arc<AtomicBool>,
    ) -> RedrobResult<Self> {
        let alive = CyclicTask::cyclic(
            ALIVE_TASK_NAME,
            ALIVE_FREQUENCY,
            AliveBeacon::new(leds.alive()),
        )?;

        let monitor = BatteryMonitor::new(
            Arc::clone(&hw.adc),
            config.adc.battery_channel,
            config.adc.battery_scale_factor,
        )?;
        let battery_cell = monitor.cell();
        let battery = CyclicTask::cyclic(BATTERY_TASK_NAME, BATTERY_FREQUENCY, monitor)?;

        let now = Instant::now();
        Ok(Self {
            alive,
            switches: HwSwitches::new(
                Arc::clone(&hw.adc),
                config.adc.shutdown_channel,
                config.adc.cont_steer_channel,
            ),
            rf: RfRemote::new(Arc::clone(&hw.gpio), config.pins.rf_pins()),
            net: NetRemote::new(config.net.bind_addr()),
            camera: CameraController::new(Arc::clone(&hw.runner), &config.camera.stream_script),
            motor: MotorController::new(Arc::clone(&hw.gpio), config.pins.motor_pins()),
            battery,
            battery_cell,
            bat_low_led: leds.bat_low(),
            arbiter: Arbiter::new(),
            sys_stat: SysStatSampler::new(),
            forced_mode: config.steering.forced_mode.map(SteerMode::from),
            min_voltage: config.battery.min_voltage,
            verbose: config.verbose,
            shutdown_request,
            shutdown_signalled: false,
            battery_low: false,
            last_steer: SteerCode::None,
            battery_due: now,
            sys_stat_due: now,
            stage: Stage::None,
        })
    }

    /// Shutdown handle and bound address of the net server.
    pub fn server_control(&self) -> Arc<ServerControl> {
        self.net.control()
    }

    /// Replace the `/proc` sampler, e.g. with one reading a fixture
    /// directory.
    pub fn with_sys_stat_sampler(mut self, sampler: SysStatSampler) -> Self {
        self.sys_stat = sampler;
        self
    }

    fn select_mode(&self) -> RedrobResult<SteerMode> {
        if let Some(mode) = self.forced_mode {
            tlog!(info, "Steering mode {:?} forced by configuration", mode);
            return Ok(mode);
        }
        let mode = if self.switches.select_continuous_steering()? {
            SteerMode::Continuous
        } else {
            SteerMode::Memory
        };
        tlog!(info, "Steering mode {:?} selected by switch", mode);
        Ok(mode)
    }

    fn check_shutdown_switch(&mut self) -> RedrobResult<()> {
        if !self.shutdown_signalled && self.switches.select_shutdown()? {
            tlog!(warn, "Shutdown switch active, requesting shutdown");
            self.shutdown_request.store(true, Ordering::SeqCst);
            self.shutdown_signalled = true;
        }
        Ok(())
    }

    fn check_battery(&mut self, now: Instant) -> RedrobResult<()> {
        if now < self.battery_due {
            return Ok(());
        }
        let reading = self.battery_cell.get();
        let low = reading.v_in < self.min_voltage;
        if low != self.battery_low {
            if low {
                tlog!(warn, "Battery low: {:.2} V (min {:.2} V)", reading.v_in, self.min_voltage);
            } else {
                tlog!(info, "Battery ok: {:.2} V", reading.v_in);
            }
            self.battery_low = low;
        }
        self.bat_low_led.set(low)?;
        self.net.set_voltage(reading.v_in);
        Ok(())
    }

    fn update_sys_stats(&mut self, now: Instant) {
        if now < self.sys_stat_due {
            return;
        }
        self.net.set_sys_stats(self.sys_stat.sample());
        if let Err(e) = self.sys_stat.reset_interval() {
            tlog!(warn, "System stats interval reset failed: {}", e);
        }
        self.sys_stat_due = now + SYS_STAT_PERIOD;
    }

    fn check_workers(&self) -> RedrobResult<()> {
        check_task(&self.alive)?;
        self.net.check()?;
        check_task(&self.battery)
    }

    fn steer(&mut self) -> RedrobResult<()> {
        let (source, steering) = self.arbiter.select(&mut self.rf, &mut self.net)?;
        let code = match steering.to_steer_code() {
            SteerCode::Unknown(raw) => {
                tlog!(warn, "Undefined steering 0x{:02x} from {}, stopping", raw, source);
                SteerCode::Stop
            }
            code => code,
        };
        if self.verbose && code != self.last_steer {
            tlog!(info, "Steering {} -> {} ({})", self.last_steer, code, source);
        }
        self.last_steer = code;
        self.motor.steer(code)
    }

    fn setup_steps(&mut self) -> RedrobResult<()> {
        initialize_task(
            &mut self.alive,
            (),
            ALIVE_TIMEOUTS.start,
            ALIVE_TIMEOUTS.execute,
        )
        .map_err(|e| {
            if let Err(abort) = abort_task(&mut self.alive, ALIVE_TIMEOUTS.stop) {
                tlog!(warn, "Alive task did not come down: {}", abort);
            }
            e
        })?;
        self.stage = Stage::Alive;

        let mode = self.select_mode()?;

        self.rf.initialize()?;
        self.stage = Stage::Rf;

        self.net.initialize()?;
        self.net.set_voltage(0.0);
        self.stage = Stage::Net;

        self.camera.initialize()?;
        self.stage = Stage::Camera;

        self.motor.initialize(mode)?;
        self.stage = Stage::Motor;

        // The body moves into the thread on start
        let battery_period = self
            .battery
            .frequency()
            .map(|f| Duration::from_secs_f64(1.0 / f))
            .unwrap_or_default();
        initialize_task(
            &mut self.battery,
            (),
            BATTERY_TIMEOUTS.start,
            BATTERY_TIMEOUTS.execute,
        )
        .map_err(|e| {
            if let Err(abort) = abort_task(&mut self.battery, BATTERY_TIMEOUTS.stop) {
                tlog!(warn, "Battery monitor did not come down: {}", abort);
            }
            e
        })?;
        self.stage = Stage::Battery;

        let now = Instant::now();
        self.battery_due = now + battery_period;
        self.sys_stat_due = now;
        if let Err(e) = self.sys_stat.reset_interval() {
            tlog!(warn, "System stats unavailable: {}", e);
        }
        self.shutdown_signalled = false;
        self.battery_low = false;
        self.last_steer = SteerCode::None;
        self.stage = Stage::Ready;
        Ok(())
    }
}

/// Keep the first failure, log the rest.
fn note(first: &mut Option<RedrobError>, step: &str, result: RedrobResult<()>) {
    if let Err(e) = result {
        tlog!(error, "Cleanup of {} failed: {}", step, e);
        first.get_or_insert(e);
    }
}

impl CyclicBody for ControlLoop {
    fn setup(&mut self) -> RedrobResult<()> {
        self.stage = Stage::None;
        self.setup_steps()?;
        tlog!(info, "Control loop ready");
        Ok(())
    }

    fn cyclic_step(&mut self) -> RedrobResult<()> {
        let now = Instant::now();

        self.check_shutdown_switch()?;
        self.check_battery(now)?;
        self.update_sys_stats(now);
        self.check_workers()?;

        self.steer()?;

        let camera = self.net.get_camera_code();
        self.camera.command(camera)
    }

    fn cleanup(&mut self) -> RedrobResult<()> {
        let mut first = None;

        if self.stage >= Stage::Battery {
            note(
                &mut first,
                "battery monitor",
                finalize_task(&mut self.battery, BATTERY_TIMEOUTS.stop),
            );
        }
        if self.stage >= Stage::Motor {
            note(&mut first, "motor", self.motor.finalize());
        }
        if self.stage >= Stage::Camera {
            note(&mut first, "camera", self.camera.finalize());
        }
        if self.stage >= Stage::Net {
            note(&mut first, "net remote", self.net.finalize());
        }
        if self.stage >= Stage::Rf {
            note(&mut first, "rf remote", self.rf.finalize());
        }
        if self.stage >= Stage::Alive {
            note(
                &mut first,
                "alive task",
                finalize_task(&mut self.alive, ALIVE_TIMEOUTS.stop),
            );
        }
        self.stage = Stage::None;

        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
