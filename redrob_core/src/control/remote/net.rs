use std::net::SocketAddr;
use std::sync::Arc;

use crate::control::codes::{CameraCode, RcSteering};
use crate::control::remote::{ActiveLatch, RemoteControl};
use crate::error::{RedrobError, RedrobResult};
use crate::hardware::sys_stat::SysStats;
use crate::net::server::{NetCells, NetControlServer, ServerControl};
use crate::task::{
    abort_task, check_task, finalize_task, initialize_task, SupervisionTimeouts, Task,
};
use crate::tlog;

pub const NET_SERVER_TASK_NAME: &str = "REDROBD_RC_NET_SERVER";
pub const NET_SERVER_TIMEOUTS: SupervisionTimeouts =
    SupervisionTimeouts::from_millis(1000, 500, 1500);

/// Network remote control. Owns the server task and its shared cells.
pub struct NetRemote {
    bind_addr: SocketAddr,
    timeouts: SupervisionTimeouts,
    cells: Arc<NetCells>,
    control: Arc<ServerControl>,
    server: Option<Task<NetControlServer>>,
    latch: ActiveLatch,
}

impl NetRemote {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            timeouts: NET_SERVER_TIMEOUTS,
            cells: Arc::new(NetCells::new()),
            control: Arc::new(ServerControl::new()),
            server: None,
            latch: ActiveLatch::default(),
        }
    }

    /// Handle for shutdown requests and the bound address.
    pub fn control(&self) -> Arc<ServerControl> {
        Arc::clone(&self.control)
    }

    pub fn cells(&self) -> Arc<NetCells> {
        Arc::clone(&self.cells)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.control.local_addr()
    }

    /// Supervision check of the server task.
    pub fn check(&self) -> RedrobResult<()> {
        match &self.server {
            Some(task) => check_task(task),
            None => Err(RedrobError::NotInitialized),
        }
    }

    /// Read and clear the last camera command.
    pub fn get_camera_code(&self) -> CameraCode {
        CameraCode::from_raw(self.cells.take_camera_code())
    }

    pub fn set_voltage(&self, volts: f32) {
        self.cells.set_voltage(volts);
    }

    pub fn set_sys_stats(&self, stats: SysStats) {
        self.cells.set_sys_stats(stats);
    }
}

impl RemoteControl for NetRemote {
    fn initialize(&mut self) -> RedrobResult<()> {
        if self.server.is_some() {
            return Err(RedrobError::AlreadyInitialized);
        }
        self.latch.reset();
        self.cells.reset();
        self.control.reset();

        let mut task = Task::new(
            NET_SERVER_TASK_NAME,
            NetControlServer::new(self.bind_addr, self.cells(), self.control()),
        );
        if let Err(e) = initialize_task(&mut task, (), self.timeouts.start, self.timeouts.execute) {
            // Unblock the thread if it got as far as accept
            let _ = self.control.shutdown_server();
            if let Err(abort) = abort_task(&mut task, self.timeouts.stop) {
                tlog!(warn, "Net server did not come down: {}", abort);
            }
            return Err(e);
        }
        self.server = Some(task);
        Ok(())
    }

    fn finalize(&mut self) -> RedrobResult<()> {
        self.latch.reset();
        let mut task = self.server.take().ok_or(RedrobError::NotInitialized)?;
        self.control.shutdown_server()?;
        finalize_task(&mut task, self.timeouts.stop)
    }

    fn get_steering(&mut self) -> RedrobResult<RcSteering> {
        let steering = RcSteering::from_bits(self.cells.take_steer_code());
        self.latch.observe(steering);
        Ok(steering)
    }

    fn is_active(&self) -> bool {
        self.latch.is_active()
    }
}
