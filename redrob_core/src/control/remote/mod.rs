//! Remote control sources and their arbitration.
//!
//! Two sources produce steering: the radio receiver on GPIO and the TCP
//! client. A source becomes active the first time it reports any steering
//! and stays active until it is re-initialized. Radio wins over network
//! whenever it is active.

pub mod net;
pub mod rf;

use std::fmt;

use crate::control::codes::RcSteering;
use crate::error::RedrobResult;
use crate::tlog;

pub use net::NetRemote;
pub use rf::{RfPins, RfRemote};

pub trait RemoteControl: Send {
    fn initialize(&mut self) -> RedrobResult<()>;

    fn finalize(&mut self) -> RedrobResult<()>;

    /// Latest steering bits. Also feeds the activity latch.
    fn get_steering(&mut self) -> RedrobResult<RcSteering>;

    /// True once any non-neutral steering has been seen.
    fn is_active(&self) -> bool;
}

/// Latches true on the first non-neutral steering.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActiveLatch {
    active: bool,
}

impl ActiveLatch {
    pub fn observe(&mut self, steering: RcSteering) {
        if !steering.is_none() {
            self.active = true;
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn reset(&mut self) {
        self.active = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteSource {
    None,
    Radio,
    Network,
}

impl fmt::Display for RemoteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteSource::None => write!(f, "NONE"),
            RemoteSource::Radio => write!(f, "RF"),
            RemoteSource::Network => write!(f, "NET"),
        }
    }
}

/// Fixed-priority selection between radio and network.
#[derive(Debug)]
pub struct Arbiter {
    selected: RemoteSource,
}

impl Default for Arbiter {
    fn default() -> Self {
        Self {
            selected: RemoteSource::None,
        }
    }
}

impl Arbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> RemoteSource {
        self.selected
    }

    /// Sample both sources and pick one.
    ///
    /// Both are read every call so the network command is consumed and
    /// both latches stay current, whichever source wins.
    pub fn select(
        &mut self,
        radio: &mut dyn RemoteControl,
        network: &mut dyn RemoteControl,
    ) -> RedrobResult<(RemoteSource, RcSteering)> {
        let rf = radio.get_steering()?;
        let net = network.get_steering()?;

        let (source, steering) = if radio.is_active() {
            (RemoteSource::Radio, rf)
        } else if network.is_active() {
            (RemoteSource::Network, net)
        } else {
            (RemoteSource::None, RcSteering::NONE)
        };

        if source != self.selected {
            tlog!(info, "Remote control source {} -> {}", self.selected, source);
            self.selected = source;
        }
        Ok((source, steering))
    }
}
