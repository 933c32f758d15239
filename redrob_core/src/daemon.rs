//! Daemon core: brings the control loop up and down and reports its health.
//!
//! Every public operation that fails logs the error, latches it as the last
//! error (the first unread error wins) and lights the sysfail LED.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::DaemonConfig;
use crate::control_loop::{ControlLoop, CTRL_TASK_NAME, CTRL_TIMEOUTS};
use crate::error::{ErrorRecord, LastError, RedrobError, RedrobResult};
use crate::hardware::leds::StatusLeds;
use crate::hardware::Hardware;
use crate::net::server::ServerControl;
use crate::task::{abort_task, check_task, finalize_task, initialize_task, CyclicTask};

pub const PROD_NUM: &str = "REDROBD";
pub const RSTATE: &str = "R1A02";

/// Product number and revision state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProdInfo {
    pub prod_num: &'static str,
    pub rstate: &'static str,
}

pub fn prod_info() -> ProdInfo {
    ProdInfo {
        prod_num: PROD_NUM,
        rstate: RSTATE,
    }
}

pub struct RedrobCore {
    hw: Hardware,
    leds: Mutex<Option<StatusLeds>>,
    last_error: LastError,
    shutdown_request: Arc<AtomicBool>,
    ctrl: Mutex<Option<CyclicTask<ControlLoop>>>,
    server_control: Mutex<Option<Arc<ServerControl>>>,
}

impl RedrobCore {
    pub fn new(hw: Hardware) -> Self {
        Self {
            hw,
            leds: Mutex::new(None),
            last_error: LastError::new(),
            shutdown_request: Arc::new(AtomicBool::new(false)),
            ctrl: Mutex::new(None),
            server_control: Mutex::new(None),
        }
    }

    pub fn prod_info(&self) -> ProdInfo {
        prod_info()
    }

    /// Start the control loop and, through it, every worker.
    pub fn initialize(&self, config: &DaemonConfig) -> RedrobResult<()> {
        let result = self.do_initialize(config);
        self.report("initialize", result)
    }

    /// Stop the control loop and release the LEDs.
    pub fn finalize(&self) -> RedrobResult<()> {
        let result = self.do_finalize();
        self.report("finalize", result)
    }

    /// Fails unless the control loop is executing with an OK status.
    pub fn check_run_status(&self) -> RedrobResult<()> {
        let result = match self.ctrl.lock().as_ref() {
            Some(task) => check_task(task),
            None => Err(RedrobError::NotInitialized),
        };
        self.report("check_run_status", result)
    }

    /// True once the shutdown switch has been seen.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_request.load(Ordering::SeqCst)
    }

    /// Read and clear the last error.
    pub fn get_last_error(&self) -> Option<ErrorRecord> {
        self.last_error.take()
    }

    /// Address the remote control server is listening on, while running.
    pub fn net_server_addr(&self) -> Option<SocketAddr> {
        self.server_control
            .lock()
            .as_ref()
            .and_then(|control| control.local_addr())
    }

    fn do_initialize(&self, config: &DaemonConfig) -> RedrobResult<()> {
        let mut ctrl = self.ctrl.lock();
        if ctrl.is_some() {
            return Err(RedrobError::AlreadyInitialized);
        }
        config.validate()?;

        log::info!(
            "Initializing {} {}, control loop at {} Hz",
            PROD_NUM,
            RSTATE,
            config.ctrl_thread_freq
        );
        self.shutdown_request.store(false, Ordering::SeqCst);

        let mut leds_slot = self.leds.lock();
        let leds = leds_slot.insert(StatusLeds::new(
            Arc::clone(&self.hw.gpio),
            config.pins.led_pins(),
        ));
        leds.initialize()?;

        let started = ControlLoop::new(&self.hw, leds, config, Arc::clone(&self.shutdown_request))
            .and_then(|body| {
                let server_control = body.server_control();
                let task = CyclicTask::cyclic(CTRL_TASK_NAME, config.ctrl_thread_freq, body)?;
                Ok((task, server_control))
            })
            .and_then(|(mut task, server_control)| {
                match initialize_task(&mut task, (), CTRL_TIMEOUTS.start, CTRL_TIMEOUTS.execute) {
                    Ok(()) => Ok((task, server_control)),
                    Err(e) => {
                        if let Err(abort) = abort_task(&mut task, CTRL_TIMEOUTS.stop) {
                            log::warn!("Control loop did not come down: {}", abort);
                        }
                        Err(e)
                    }
                }
            });

        let (task, server_control) = match started {
            Ok(started) => started,
            Err(e) => {
                // Give the LED pins back, sysfail stays claimed to show the error
                if let Err(led) = leds.finalize() {
                    log::warn!("Releasing LEDs failed: {}", led);
                }
                return Err(e);
            }
        };

        *self.server_control.lock() = Some(server_control);
        *ctrl = Some(task);
        log::info!("Initialized");
        Ok(())
    }

    fn do_finalize(&self) -> RedrobResult<()> {
        let mut task = self.ctrl.lock().take().ok_or(RedrobError::NotInitialized)?;
        *self.server_control.lock() = None;

        let stopped = finalize_task(&mut task, CTRL_TIMEOUTS.stop);
        let released = match self.leds.lock().as_mut() {
            Some(leds) => leds.finalize(),
            None => Ok(()),
        };
        stopped?;
        released?;
        log::info!("Finalized");
        Ok(())
    }

    fn report<T>(&self, operation: &str, result: RedrobResult<T>) -> RedrobResult<T> {
        if let Err(e) = &result {
            log::error!("{} failed: {}", operation, e);
            self.last_error.latch(ErrorRecord::from(e));
            if let Some(leds) = self.leds.lock().as_ref() {
                if let Err(led) = leds.sysfail().set(true) {
                    log::warn!("Setting sysfail LED failed: {}", led);
                }
            }
        }
        result
    }
}
