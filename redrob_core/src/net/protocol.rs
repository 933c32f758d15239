//! Remote control wire protocol.
//!
//! Every request starts with a big-endian u16 command tag:
//!
//! | Tag | Command     | Payload | Reply                                   |
//! |-----|-------------|---------|-----------------------------------------|
//! | 1   | Steer       | u8      | none                                    |
//! | 2   | GetVoltage  | none    | u16 millivolts                          |
//! | 3   | Camera      | u8      | none                                    |
//! | 4   | GetSysStats | none    | u8 cpu, u32 mem kB, u16 irq, u32 uptime |
//!
//! All multi-byte fields are big-endian.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;

use crate::control::codes::{CameraCode, RcSteering};
use crate::error::RedrobResult;
use crate::hardware::sys_stat::SysStats;

pub const CMD_STEER: u16 = 1;
pub const CMD_GET_VOLTAGE: u16 = 2;
pub const CMD_CAMERA: u16 = 3;
pub const CMD_GET_SYS_STATS: u16 = 4;

/// Encoded size of a [`SysStats`] reply.
pub const SYS_STATS_WIRE_SIZE: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    Steer(u8),
    GetVoltage,
    Camera(u8),
    GetSysStats,
}

/// Reasons a client session ends.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Peer disconnected")]
    Disconnected,

    #[error("Unknown command tag {0}")]
    UnknownCommand(u16),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), ProtocolError> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(ProtocolError::Disconnected),
        Err(e) => Err(ProtocolError::Io(e)),
    }
}

/// Read one request. Blocks until a full request arrived.
pub fn read_command<R: Read>(reader: &mut R) -> Result<ClientCommand, ProtocolError> {
    let mut tag = [0u8; 2];
    read_exact(reader, &mut tag)?;

    match u16::from_be_bytes(tag) {
        CMD_STEER => {
            let mut code = [0u8; 1];
            read_exact(reader, &mut code)?;
            Ok(ClientCommand::Steer(code[0]))
        }
        CMD_GET_VOLTAGE => Ok(ClientCommand::GetVoltage),
        CMD_CAMERA => {
            let mut code = [0u8; 1];
            read_exact(reader, &mut code)?;
            Ok(ClientCommand::Camera(code[0]))
        }
        CMD_GET_SYS_STATS => Ok(ClientCommand::GetSysStats),
        other => Err(ProtocolError::UnknownCommand(other)),
    }
}

/// Encode a request.
pub fn encode_command(command: ClientCommand) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(3);
    match command {
        ClientCommand::Steer(code) => {
            bytes.extend_from_slice(&CMD_STEER.to_be_bytes());
            bytes.push(code);
        }
        ClientCommand::GetVoltage => bytes.extend_from_slice(&CMD_GET_VOLTAGE.to_be_bytes()),
        ClientCommand::Camera(code) => {
            bytes.extend_from_slice(&CMD_CAMERA.to_be_bytes());
            bytes.push(code);
        }
        ClientCommand::GetSysStats => bytes.extend_from_slice(&CMD_GET_SYS_STATS.to_be_bytes()),
    }
    bytes
}

pub fn encode_sys_stats(stats: &SysStats) -> [u8; SYS_STATS_WIRE_SIZE] {
    let mut out = [0u8; SYS_STATS_WIRE_SIZE];
    out[0] = stats.cpu_load;
    out[1..5].copy_from_slice(&stats.mem_used_kb.to_be_bytes());
    out[5..7].copy_from_slice(&stats.irq_count.to_be_bytes());
    out[7..11].copy_from_slice(&stats.uptime_s.to_be_bytes());
    out
}

pub fn decode_sys_stats(bytes: &[u8; SYS_STATS_WIRE_SIZE]) -> SysStats {
    SysStats {
        cpu_load: bytes[0],
        mem_used_kb: u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
        irq_count: u16::from_be_bytes([bytes[5], bytes[6]]),
        uptime_s: u32::from_be_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]),
    }
}

/// Volts to the millivolt value sent on the wire.
pub fn volts_to_millivolts(volts: f32) -> u16 {
    (volts * 1000.0) as u16
}

/// Blocking client speaking the remote control protocol.
pub struct RemoteClient {
    stream: TcpStream,
}

impl RemoteClient {
    pub fn connect(addr: impl ToSocketAddrs) -> RedrobResult<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Bound every reply wait by `timeout`.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> RedrobResult<()> {
        Ok(self.stream.set_read_timeout(timeout)?)
    }

    pub fn steer(&mut self, steering: RcSteering) -> RedrobResult<()> {
        self.send(ClientCommand::Steer(steering.bits()))
    }

    pub fn camera(&mut self, code: CameraCode) -> RedrobResult<()> {
        self.send(ClientCommand::Camera(code.raw()))
    }

    /// Battery voltage in millivolts.
    pub fn get_voltage(&mut self) -> RedrobResult<u16> {
        self.send(ClientCommand::GetVoltage)?;
        let mut reply = [0u8; 2];
        self.stream.read_exact(&mut reply)?;
        Ok(u16::from_be_bytes(reply))
    }

    pub fn get_sys_stats(&mut self) -> RedrobResult<SysStats> {
        self.send(ClientCommand::GetSysStats)?;
        let mut reply = [0u8; SYS_STATS_WIRE_SIZE];
        self.stream.read_exact(&mut reply)?;
        Ok(decode_sys_stats(&reply))
    }

    /// Write raw bytes, for talking to the server off-protocol.
    pub fn send_raw(&mut self, bytes: &[u8]) -> RedrobResult<()> {
        Ok(self.stream.write_all(bytes)?)
    }

    /// Read raw bytes. Returns 0 once the server closed the connection.
    pub fn recv_raw(&mut self, buf: &mut [u8]) -> RedrobResult<usize> {
        Ok(self.stream.read(buf)?)
    }

    pub fn close(self) -> RedrobResult<()> {
        Ok(self.stream.shutdown(Shutdown::Both)?)
    }

    fn send(&mut self, command: ClientCommand) -> RedrobResult<()> {
        self.send_raw(&encode_command(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_commands_from_stream() {
        let mut bytes = Vec::new();
        bytes.extend(encode_command(ClientCommand::Steer(0x05)));
        bytes.extend(encode_command(ClientCommand::GetVoltage));
        bytes.extend(encode_command(ClientCommand::Camera(2)));
        bytes.extend(encode_command(ClientCommand::GetSysStats));
        assert_eq!(&bytes[..3], &[0x00, 0x01, 0x05]);

        let mut reader = Cursor::new(bytes);
        assert_eq!(read_command(&mut reader).unwrap(), ClientCommand::Steer(0x05));
        assert_eq!(read_command(&mut reader).unwrap(), ClientCommand::GetVoltage);
        assert_eq!(read_command(&mut reader).unwrap(), ClientCommand::Camera(2));
        assert_eq!(read_command(&mut reader).unwrap(), ClientCommand::GetSysStats);
        assert!(matches!(
            read_command(&mut reader),
            Err(ProtocolError::Disconnected)
        ));
    }

    #[test]
    fn test_unknown_tag() {
        let mut reader = Cursor::new(vec![0x00, 0x09]);
        assert!(matches!(
            read_command(&mut reader),
            Err(ProtocolError::UnknownCommand(9))
        ));
    }

    #[test]
    fn test_short_reads_are_disconnects() {
        // Half a tag
        let mut reader = Cursor::new(vec![0x00]);
        assert!(matches!(
            read_command(&mut reader),
            Err(ProtocolError::Disconnected)
        ));
        // Steer without its code byte
        let mut reader = Cursor::new(vec![0x00, 0x01]);
        assert!(matches!(
            read_command(&mut reader),
            Err(ProtocolError::Disconnected)
        ));
    }

    #[test]
    fn test_sys_stats_layout() {
        let stats = SysStats {
            cpu_load: 37,
            mem_used_kb: 0x0001_2345,
            irq_count: 0x0102,
            uptime_s: 86_400,
        };
        let bytes = encode_sys_stats(&stats);
        assert_eq!(
            bytes,
            [37, 0x00, 0x01, 0x23, 0x45, 0x01, 0x02, 0x00, 0x01, 0x51, 0x80]
        );
        assert_eq!(decode_sys_stats(&bytes), stats);
    }

    #[test]
    fn test_volts_to_millivolts() {
        assert_eq!(volts_to_millivolts(7.4), 7400);
        assert_eq!(volts_to_millivolts(0.0), 0);
        assert_eq!(volts_to_millivolts(-1.0), 0);
    }
}
