// Remote control server: wire protocol round trips and controlled shutdown.

use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use redrob_core::control::remote::{NetRemote, RemoteControl};
use redrob_core::control::{CameraCode, RcSteering};
use redrob_core::hardware::SysStats;
use redrob_core::net::protocol::{encode_command, ClientCommand};
use redrob_core::net::RemoteClient;

mod common;
use common::init_logging;

fn start_remote() -> (NetRemote, SocketAddr) {
    init_logging();
    let mut net = NetRemote::new("127.0.0.1:0".parse().unwrap());
    net.initialize().unwrap();
    let addr = net.local_addr().expect("server bound");
    (net, addr)
}

fn connect(addr: SocketAddr) -> RemoteClient {
    let client = RemoteClient::connect(addr).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    client
}

#[test]
fn test_voltage_round_trip() {
    let (mut net, addr) = start_remote();
    let mut client = connect(addr);

    assert_eq!(client.get_voltage().unwrap(), 0);
    net.set_voltage(7.4);
    assert_eq!(client.get_voltage().unwrap(), 7400);
    // Read without clear
    assert_eq!(client.get_voltage().unwrap(), 7400);

    client.close().unwrap();
    net.finalize().unwrap();
}

#[test]
fn test_sys_stats_round_trip() {
    let (mut net, addr) = start_remote();
    let mut client = connect(addr);

    let stats = SysStats {
        cpu_load: 42,
        mem_used_kb: 123_456,
        irq_count: 789,
        uptime_s: 3600,
    };
    net.set_sys_stats(stats);
    assert_eq!(client.get_sys_stats().unwrap(), stats);
    assert_eq!(client.get_sys_stats().unwrap(), stats);

    net.finalize().unwrap();
}

#[test]
fn test_steer_code_is_consumed_once() {
    let (mut net, addr) = start_remote();
    let mut client = connect(addr);

    client.steer(RcSteering::FORWARD).unwrap();
    // Replies are served in order, so the steer has been applied
    client.get_voltage().unwrap();

    assert_eq!(net.get_steering().unwrap(), RcSteering::FORWARD);
    assert_eq!(net.get_steering().unwrap(), RcSteering::NONE);
    assert!(net.is_active());

    // Last write wins
    client.steer(RcSteering::LEFT).unwrap();
    client.steer(RcSteering::RIGHT).unwrap();
    client.get_voltage().unwrap();
    assert_eq!(net.get_steering().unwrap(), RcSteering::RIGHT);

    net.finalize().unwrap();
    assert!(!net.is_active());
}

#[test]
fn test_camera_code_is_consumed_once() {
    let (mut net, addr) = start_remote();
    let mut client = connect(addr);

    client.camera(CameraCode::StartStream).unwrap();
    client.get_voltage().unwrap();
    assert_eq!(net.get_camera_code(), CameraCode::StartStream);
    assert_eq!(net.get_camera_code(), CameraCode::None);

    net.finalize().unwrap();
}

#[test]
fn test_unknown_tag_closes_connection_only() {
    let (mut net, addr) = start_remote();

    let mut rogue = connect(addr);
    rogue.send_raw(&[0x00, 0x09, 0xff]).unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(rogue.recv_raw(&mut buf).unwrap(), 0);

    // The server goes back to accepting
    let mut client = connect(addr);
    net.set_voltage(6.9);
    assert_eq!(client.get_voltage().unwrap(), 6900);
    net.check().unwrap();

    net.finalize().unwrap();
}

#[test]
fn test_one_client_at_a_time() {
    let (mut net, addr) = start_remote();
    net.set_voltage(7.0);

    let mut first = connect(addr);
    assert_eq!(first.get_voltage().unwrap(), 7000);

    // Queued in the backlog while the first client is served
    let mut second = connect(addr);
    second
        .send_raw(&encode_command(ClientCommand::GetVoltage))
        .unwrap();
    second
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    let mut reply = [0u8; 2];
    assert!(second.recv_raw(&mut reply).is_err());

    first.close().unwrap();
    second
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    assert_eq!(second.recv_raw(&mut reply).unwrap(), 2);
    assert_eq!(u16::from_be_bytes(reply), 7000);

    net.finalize().unwrap();
}

#[test]
fn test_shutdown_while_blocked_in_accept() {
    let (mut net, _addr) = start_remote();
    // Let the server settle in accept
    thread::sleep(Duration::from_millis(50));
    net.check().unwrap();

    net.finalize().unwrap();
    assert!(net.check().is_err());
}

#[test]
fn test_shutdown_while_client_connected() {
    let (mut net, addr) = start_remote();
    let mut client = connect(addr);
    client.get_voltage().unwrap();

    // Server is now blocked reading the next command
    net.finalize().unwrap();

    let mut buf = [0u8; 2];
    assert!(matches!(client.recv_raw(&mut buf), Ok(0) | Err(_)));
}

#[test]
fn test_restart_after_finalize() {
    let (mut net, first_addr) = start_remote();
    net.finalize().unwrap();
    assert!(TcpStream::connect(first_addr).is_err());

    net.initialize().unwrap();
    let addr = net.local_addr().unwrap();
    let mut client = connect(addr);
    assert_eq!(client.get_voltage().unwrap(), 0);
    net.finalize().unwrap();
}

#[test]
fn test_bind_failure_is_reported() {
    init_logging();
    let (mut holder, addr) = start_remote();

    let mut net = NetRemote::new(addr);
    assert!(net.initialize().is_err());
    assert!(net.check().is_err());

    holder.finalize().unwrap();
}
