//! Admission context - everything a gate may look at

use chrono::{DateTime, Utc};
use stash_core::{Amount, Direction, EventKind, User};
use stash_policy::DeviceSignals;
use std::net::IpAddr;

/// Input to the admission pipeline
#[derive(Debug, Clone)]
pub struct AdmissionContext {
    /// Actor as currently known to the user directory
    pub actor: User,
    pub origin_ip: IpAddr,
    pub device_signals: DeviceSignals,
    pub kind: EventKind,
    pub direction: Direction,
    pub amount: Amount,
    /// Server clock at evaluation. Limitation expiry and velocity windows are
    /// judged at this instant, never at the client-declared event time.
    pub now: DateTime<Utc>,
}

impl AdmissionContext {
    pub fn new(actor: User, kind: EventKind, direction: Direction, amount: Amount) -> Self {
        Self {
            actor,
            origin_ip: IpAddr::from([127, 0, 0, 1]),
            device_signals: DeviceSignals::browser(),
            kind,
            direction,
            amount,
            now: Utc::now(),
        }
    }

    pub fn with_origin_ip(mut self, ip: IpAddr) -> Self {
        self.origin_ip = ip;
        self
    }

    pub fn with_device_signals(mut self, signals: DeviceSignals) -> Self {
        self.device_signals = signals;
        self
    }

    /// Evaluate at `now` instead of the current clock
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn is_outgoing(&self) -> bool {
        self.direction == Direction::Outgoing
    }
}
