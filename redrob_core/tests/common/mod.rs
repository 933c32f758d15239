//! Shared test utilities for redrob_core integration tests
#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use redrob_core::hardware::{ProcessRunner, SimAdc, SimGpio};
use redrob_core::{DaemonConfig, Hardware, RedrobResult, Task, TaskBody, TaskState};

/// Route library logs to the test harness once per test binary.
pub fn init_logging() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Default config bound to loopback on an ephemeral port.
pub fn test_config() -> DaemonConfig {
    let mut config = DaemonConfig {
        ctrl_thread_freq: 50.0,
        verbose: true,
        ..Default::default()
    };
    config.net.address = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config.net.port = 0;
    config.camera.stream_script = "/opt/test/stream.sh".into();
    config
}

/// Records every command instead of running it.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl ProcessRunner for RecordingRunner {
    fn run(&self, program: &str, args: &[&str]) -> RedrobResult<Option<i32>> {
        self.calls
            .lock()
            .push(format!("{} {}", program, args.join(" ")));
        Ok(Some(0))
    }
}

/// Simulated robot: GPIO, ADC and process runner the test can poke.
pub struct SimRig {
    pub gpio: Arc<SimGpio>,
    pub adc: Arc<SimAdc>,
    pub runner: Arc<RecordingRunner>,
    pub hw: Hardware,
}

impl SimRig {
    /// Shutdown switch in run position, healthy 7.4 V battery.
    pub fn new(config: &DaemonConfig) -> Self {
        let gpio = Arc::new(SimGpio::new());
        let adc = Arc::new(SimAdc::new(config.adc.reference_voltage));
        let runner = Arc::new(RecordingRunner::default());
        let hw = Hardware::new(gpio.clone(), adc.clone(), runner.clone());

        let rig = Self {
            gpio,
            adc,
            runner,
            hw,
        };
        rig.set_shutdown_switch(false, config);
        rig.set_battery(7.4, config);
        rig
    }

    pub fn set_shutdown_switch(&self, requested: bool, config: &DaemonConfig) {
        let volts = if requested {
            0.0
        } else {
            config.adc.reference_voltage
        };
        self.adc.set_voltage(config.adc.shutdown_channel, volts);
    }

    pub fn set_battery(&self, v_in: f32, config: &DaemonConfig) {
        self.adc.set_voltage(
            config.adc.battery_channel,
            v_in * config.adc.battery_scale_factor,
        );
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

pub fn wait_for_state<B: TaskBody>(task: &Task<B>, state: TaskState, timeout: Duration) -> bool {
    wait_until(timeout, || task.state() == state)
}
