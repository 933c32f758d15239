//! Remote control TCP server task.
//!
//! Serves one client at a time. Commands and telemetry are exchanged with
//! the control loop through [`NetCells`], each value behind its own lock.
//!
//! Stopping works by racing the blocked socket call: [`ServerControl::shutdown_server`]
//! raises a flag and shuts the sockets down, the pending `accept` or `recv`
//! fails, and the loop treats the failure as a clean exit because the flag
//! is set. The same failure without the flag is fatal.

use std::io::{self, Write};
use std::mem;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{RedrobError, RedrobResult};
use crate::hardware::sys_stat::SysStats;
use crate::net::protocol::{
    encode_sys_stats, read_command, volts_to_millivolts, ClientCommand, ProtocolError,
};
use crate::task::{TaskBody, TaskContext};
use crate::tlog;

/// Values shared between the server task and the control loop.
#[derive(Debug, Default)]
pub struct NetCells {
    steer: Mutex<u8>,
    camera: Mutex<u8>,
    voltage_mv: Mutex<u16>,
    sys_stats: Mutex<SysStats>,
}

impl NetCells {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to neutral values.
    pub fn reset(&self) {
        *self.steer.lock() = 0;
        *self.camera.lock() = 0;
        *self.voltage_mv.lock() = 0;
        *self.sys_stats.lock() = SysStats::default();
    }

    pub fn set_steer_code(&self, code: u8) {
        *self.steer.lock() = code;
    }

    /// Read and clear.
    pub fn take_steer_code(&self) -> u8 {
        mem::take(&mut *self.steer.lock())
    }

    pub fn set_camera_code(&self, code: u8) {
        *self.camera.lock() = code;
    }

    /// Read and clear.
    pub fn take_camera_code(&self) -> u8 {
        mem::take(&mut *self.camera.lock())
    }

    pub fn set_voltage(&self, volts: f32) {
        *self.voltage_mv.lock() = volts_to_millivolts(volts);
    }

    pub fn voltage_mv(&self) -> u16 {
        *self.voltage_mv.lock()
    }

    pub fn set_sys_stats(&self, stats: SysStats) {
        *self.sys_stats.lock() = stats;
    }

    pub fn sys_stats(&self) -> SysStats {
        *self.sys_stats.lock()
    }
}

/// Shutdown and address handle of a server task.
#[derive(Debug, Default)]
pub struct ServerControl {
    shutdown_requested: AtomicBool,
    listener: Mutex<Option<TcpListener>>,
    client: Mutex<Option<TcpStream>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl ServerControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Address the listener is bound to, once setup has run.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Prepare for a new server run.
    pub fn reset(&self) {
        self.shutdown_requested.store(false, Ordering::SeqCst);
        *self.listener.lock() = None;
        *self.client.lock() = None;
        *self.local_addr.lock() = None;
    }

    /// Request a controlled stop. Unblocks a pending `accept` or `recv`.
    pub fn shutdown_server(&self) -> RedrobResult<()> {
        self.shutdown_requested.store(true, Ordering::SeqCst);

        if let Some(listener) = self.listener.lock().take() {
            shutdown_listener(&listener)
                .map_err(|e| RedrobError::socket(format!("shutdown listener: {}", e)))?;
        }
        if let Some(client) = self.client.lock().take() {
            match client.shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
                Err(e) => return Err(RedrobError::socket(format!("shutdown client: {}", e))),
            }
        }
        Ok(())
    }

    fn register_listener(&self, listener: &TcpListener) -> RedrobResult<()> {
        *self.local_addr.lock() = Some(listener.local_addr()?);
        *self.listener.lock() = Some(listener.try_clone()?);
        Ok(())
    }

    fn register_client(&self, stream: &TcpStream) -> RedrobResult<()> {
        *self.client.lock() = Some(stream.try_clone()?);
        Ok(())
    }

    fn clear_client(&self) {
        *self.client.lock() = None;
    }
}

/// `std` has no shutdown for listening sockets.
fn shutdown_listener(listener: &TcpListener) -> io::Result<()> {
    // SAFETY: the descriptor is owned by `listener`, which outlives the call.
    let rc = unsafe { libc::shutdown(listener.as_raw_fd(), libc::SHUT_RDWR) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ENOTCONN) {
        Ok(())
    } else {
        Err(err)
    }
}

/// The server task body.
pub struct NetControlServer {
    bind_addr: SocketAddr,
    cells: Arc<NetCells>,
    control: Arc<ServerControl>,
    listener: Option<TcpListener>,
}

impl NetControlServer {
    pub fn new(bind_addr: SocketAddr, cells: Arc<NetCells>, control: Arc<ServerControl>) -> Self {
        Self {
            bind_addr,
            cells,
            control,
            listener: None,
        }
    }

    fn serve_client(&self, mut stream: TcpStream, peer: SocketAddr) {
        loop {
            let command = match read_command(&mut stream) {
                Ok(command) => command,
                Err(ProtocolError::UnknownCommand(tag)) => {
                    tlog!(warn, "Unknown command {} from {}, closing", tag, peer);
                    break;
                }
                Err(ProtocolError::Disconnected) => {
                    tlog!(info, "Client {} disconnected", peer);
                    break;
                }
                Err(ProtocolError::Io(e)) => {
                    if !self.control.shutdown_requested() {
                        tlog!(warn, "Client {} receive failed: {}", peer, e);
                    }
                    break;
                }
            };

            if let Err(e) = self.handle(command, &mut stream) {
                if !self.control.shutdown_requested() {
                    tlog!(warn, "Client {} send failed: {}", peer, e);
                }
                break;
            }
        }

        self.control.clear_client();
        let _ = stream.shutdown(Shutdown::Both);
    }

    fn handle(&self, command: ClientCommand, stream: &mut TcpStream) -> io::Result<()> {
        match command {
            ClientCommand::Steer(code) => self.cells.set_steer_code(code),
            ClientCommand::Camera(code) => self.cells.set_camera_code(code),
            ClientCommand::GetVoltage => {
                stream.write_all(&self.cells.voltage_mv().to_be_bytes())?;
            }
            ClientCommand::GetSysStats => {
                stream.write_all(&encode_sys_stats(&self.cells.sys_stats()))?;
            }
        }
        Ok(())
    }
}

impl TaskBody for NetControlServer {
    type Arg = ();

    fn setup(&mut self) -> RedrobResult<()> {
        let listener = TcpListener::bind(self.bind_addr)
            .map_err(|e| RedrobError::socket(format!("bind {}: {}", self.bind_addr, e)))?;
        self.control.register_listener(&listener)?;
        tlog!(info, "Listening on {}", listener.local_addr()?);
        self.listener = Some(listener);
        Ok(())
    }

    fn execute(&mut self, _arg: (), ctx: &TaskContext) -> RedrobResult<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| RedrobError::socket("no listening socket"))?;

        while !ctx.is_stopped() {
            let (stream, peer) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(e) => {
                    if self.control.shutdown_requested() {
                        tlog!(info, "Shutdown requested, leaving accept");
                        return Ok(());
                    }
                    return Err(RedrobError::socket(format!("accept: {}", e)));
                }
            };

            self.control.register_client(&stream)?;
            if self.control.shutdown_requested() {
                return Ok(());
            }

            tlog!(info, "Client {} connected", peer);
            self.serve_client(stream, peer);
            ctx.update_exe_cnt();

            if self.control.shutdown_requested() {
                return Ok(());
            }
        }
        Ok(())
    }

    fn cleanup(&mut self) -> RedrobResult<()> {
        // Dropping the listener closes it
        if self.listener.take().is_some() && !self.control.shutdown_requested() {
            tlog!(info, "Closing listener");
        }
        *self.control.listener.lock() = None;
        self.control.clear_client();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_and_clear_cells() {
        let cells = NetCells::new();
        cells.set_steer_code(0x01);
        assert_eq!(cells.take_steer_code(), 0x01);
        assert_eq!(cells.take_steer_code(), 0x00);

        cells.set_camera_code(2);
        cells.set_camera_code(1);
        assert_eq!(cells.take_camera_code(), 1);
        assert_eq!(cells.take_camera_code(), 0);
    }

    #[test]
    fn test_telemetry_cells_are_not_cleared() {
        let cells = NetCells::new();
        cells.set_voltage(7.4);
        assert_eq!(cells.voltage_mv(), 7400);
        assert_eq!(cells.voltage_mv(), 7400);

        let stats = SysStats {
            cpu_load: 12,
            mem_used_kb: 1024,
            irq_count: 5,
            uptime_s: 60,
        };
        cells.set_sys_stats(stats);
        assert_eq!(cells.sys_stats(), stats);
        assert_eq!(cells.sys_stats(), stats);

        cells.reset();
        assert_eq!(cells.voltage_mv(), 0);
        assert_eq!(cells.sys_stats(), SysStats::default());
    }

    #[test]
    fn test_shutdown_without_sockets_is_ok() {
        let control = ServerControl::new();
        control.shutdown_server().unwrap();
        assert!(control.shutdown_requested());
        control.reset();
        assert!(!control.shutdown_requested());
        assert!(control.local_addr().is_none());
    }
}
