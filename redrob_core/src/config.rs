//! Daemon configuration from `redrobd.yaml`.
//!
//! Every key is optional. A missing file, or a missing key, falls back to
//! the defaults for the robot's stock wiring.
//!
//! # Example redrobd.yaml
//!
//! ```yaml
//! log_file: /var/log/redrobd.log
//! ctrl_thread_freq: 66.7
//!
//! net:
//!   address: 0.0.0.0
//!   port: 52022
//!
//! battery:
//!   min_voltage: 6.9
//!
//! # Ignore the DIP switch
//! steering:
//!   forced_mode: continuous
//! ```

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::control::motor::{MotorPins, SteerMode};
use crate::control::remote::RfPins;
use crate::error::{RedrobError, RedrobResult};
use crate::hardware::leds::LedPins;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/redrobd.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub log_file: PathBuf,

    /// Log to stdout instead of `log_file`
    pub log_stdout: bool,

    /// Main loop health-check frequency in Hz
    pub supervision_freq: f64,

    /// Control loop frequency in Hz
    pub ctrl_thread_freq: f64,

    pub verbose: bool,

    pub net: NetConfig,
    pub pins: PinConfig,
    pub adc: AdcConfig,
    pub battery: BatteryConfig,
    pub camera: CameraConfig,
    pub steering: SteeringConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("/var/log/redrobd.log"),
            log_stdout: false,
            supervision_freq: 1.0,
            ctrl_thread_freq: 66.7,
            verbose: false,
            net: NetConfig::default(),
            pins: PinConfig::default(),
            adc: AdcConfig::default(),
            battery: BatteryConfig::default(),
            camera: CameraConfig::default(),
            steering: SteeringConfig::default(),
        }
    }
}

/// Remote control server socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    pub address: IpAddr,
    pub port: u16,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 52022,
        }
    }
}

impl NetConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

/// GPIO wiring, BCM numbering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    pub led_sysfail: u8,
    pub led_alive: u8,
    pub led_bat_low: u8,

    /// Radio receiver outputs
    pub rf_in0: u8,
    pub rf_in1: u8,
    pub rf_in2: u8,
    pub rf_in3: u8,

    /// L293D inputs, 1A/2A drive the right motor, 3A/4A the left
    pub l293d_1a: u8,
    pub l293d_2a: u8,
    pub l293d_3a: u8,
    pub l293d_4a: u8,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            led_sysfail: 18,
            led_alive: 2,
            led_bat_low: 3,
            rf_in0: 4,
            rf_in1: 17,
            rf_in2: 27,
            rf_in3: 22,
            l293d_1a: 23,
            l293d_2a: 24,
            l293d_3a: 25,
            l293d_4a: 8,
        }
    }
}

impl PinConfig {
    pub fn led_pins(&self) -> LedPins {
        LedPins {
            sysfail: self.led_sysfail,
            alive: self.led_alive,
            bat_low: self.led_bat_low,
        }
    }

    pub fn rf_pins(&self) -> RfPins {
        RfPins {
            forward: self.rf_in3,
            reverse: self.rf_in2,
            right: self.rf_in0,
            left: self.rf_in1,
        }
    }

    pub fn motor_pins(&self) -> MotorPins {
        MotorPins {
            right_a: self.l293d_1a,
            right_b: self.l293d_2a,
            left_a: self.l293d_3a,
            left_b: self.l293d_4a,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdcConfig {
    pub reference_voltage: f32,
    pub shutdown_channel: u8,
    pub cont_steer_channel: u8,
    pub battery_channel: u8,

    /// Battery divider ratio
    pub battery_scale_factor: f32,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            reference_voltage: 3.3,
            shutdown_channel: 0,
            cont_steer_channel: 1,
            battery_channel: 7,
            battery_scale_factor: 0.296837,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    /// Below this the bat_low LED is lit
    pub min_voltage: f32,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self { min_voltage: 6.9 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub stream_script: PathBuf,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            stream_script: PathBuf::from("/proj/redrob/video_stream/rpi_video_stream.sh"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForcedSteering {
    Continuous,
    Memory,
}

impl From<ForcedSteering> for SteerMode {
    fn from(forced: ForcedSteering) -> Self {
        match forced {
            ForcedSteering::Continuous => SteerMode::Continuous,
            ForcedSteering::Memory => SteerMode::Memory,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    /// Overrides the continuous-steering switch when set
    pub forced_mode: Option<ForcedSteering>,
}

impl DaemonConfig {
    pub fn from_yaml(content: &str) -> RedrobResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load from `path`. A missing file gives the defaults.
    pub fn load(path: &Path) -> RedrobResult<Self> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| RedrobError::config(format!("{}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> RedrobResult<()> {
        for (key, freq) in [
            ("supervision_freq", self.supervision_freq),
            ("ctrl_thread_freq", self.ctrl_thread_freq),
        ] {
            if !freq.is_finite() || freq <= 0.0 {
                return Err(RedrobError::bad_argument(format!(
                    "{} must be positive, got {}",
                    key, freq
                )));
            }
        }

        let scale = self.adc.battery_scale_factor;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(RedrobError::bad_argument(format!(
                "adc.battery_scale_factor must be positive, got {}",
                scale
            )));
        }

        let motor = self.pins.motor_pins();
        let distinct: HashSet<u8> = [motor.right_a, motor.right_b, motor.left_a, motor.left_b]
            .into_iter()
            .collect();
        if distinct.len() != 4 {
            return Err(RedrobError::config(format!(
                "motor pins must be distinct: {:?}",
                motor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.net.bind_addr(), "0.0.0.0:52022".parse().unwrap());
        assert_eq!(config.ctrl_thread_freq, 66.7);
        assert_eq!(config.pins.rf_pins().forward, 22);
        assert_eq!(config.pins.motor_pins().left_b, 8);
        assert_eq!(config.steering.forced_mode, None);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
verbose: true
net:
  port: 6000
battery:
  min_voltage: 7.2
steering:
  forced_mode: continuous
"#;
        let config = DaemonConfig::from_yaml(yaml).unwrap();
        assert!(config.verbose);
        assert_eq!(config.net.port, 6000);
        assert_eq!(config.net.address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.battery.min_voltage, 7.2);
        assert_eq!(config.adc.battery_channel, 7);
        assert_eq!(
            config.steering.forced_mode.map(SteerMode::from),
            Some(SteerMode::Continuous)
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ctrl_thread_freq: 20.0").unwrap();
        writeln!(file, "log_stdout: true").unwrap();

        let config = DaemonConfig::load(file.path()).unwrap();
        assert_eq!(config.ctrl_thread_freq, 20.0);
        assert!(config.log_stdout);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, DaemonConfig::default());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "net: [not, a, map").unwrap();
        assert!(matches!(
            DaemonConfig::load(file.path()),
            Err(RedrobError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DaemonConfig {
            ctrl_thread_freq: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RedrobError::BadArgument(_))
        ));

        config.ctrl_thread_freq = 50.0;
        config.supervision_freq = f64::INFINITY;
        assert!(config.validate().is_err());

        config.supervision_freq = 1.0;
        config.adc.battery_scale_factor = 0.0;
        assert!(matches!(
            config.validate(),
            Err(RedrobError::BadArgument(_))
        ));
        config.adc.battery_scale_factor = f32::NAN;
        assert!(config.validate().is_err());

        config.adc.battery_scale_factor = 0.3;
        config.pins.l293d_4a = config.pins.l293d_1a;
        assert!(matches!(config.validate(), Err(RedrobError::Config(_))));
    }
}
