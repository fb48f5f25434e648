//! Egress guard state machine.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::RwLock;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{GuardError, GuardResult};
use crate::lookup::IpLookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EgressIp {
    Undetermined,
    Determined(IpAddr),
}

#[derive(Debug)]
struct GuardState {
    current: EgressIp,
    allowed: HashSet<IpAddr>,
}

impl GuardState {
    fn is_allowed(&self) -> bool {
        match self.current {
            EgressIp::Determined(ip) => self.allowed.contains(&ip),
            EgressIp::Undetermined => false,
        }
    }
}

/// Result of a successful [`EgressGuard::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The lookup succeeded and the stored IP was updated.
    Fresh { ip: IpAddr, allowed: bool },
    /// The lookup failed; the previous IP and verdict are kept.
    Stale {
        ip: IpAddr,
        allowed: bool,
        error: GuardError,
    },
}

impl CheckOutcome {
    pub fn allowed(&self) -> bool {
        match self {
            CheckOutcome::Fresh { allowed, .. } | CheckOutcome::Stale { allowed, .. } => *allowed,
        }
    }

    pub fn ip(&self) -> IpAddr {
        match self {
            CheckOutcome::Fresh { ip, .. } | CheckOutcome::Stale { ip, .. } => *ip,
        }
    }
}

pub struct EgressGuard {
    lookup: Box<dyn IpLookup>,
    state: RwLock<GuardState>,
    /// Serializes lookups so concurrent re-checks do not race on the IP.
    refresh: Mutex<()>,
}

impl EgressGuard {
    /// Create a guard. `allowed` pre-seeds the allow-list; the IP seen by
    /// [`initialize`](Self::initialize) is added to it.
    pub fn new(lookup: Box<dyn IpLookup>, allowed: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            lookup,
            state: RwLock::new(GuardState {
                current: EgressIp::Undetermined,
                allowed: allowed.into_iter().collect(),
            }),
            refresh: Mutex::new(()),
        }
    }

    /// Look up the starting IP and trust it. A failure here is fatal:
    /// there is no baseline to compare against.
    pub async fn initialize(&self) -> GuardResult<IpAddr> {
        let _refresh = self.refresh.lock().await;
        let ip = self.lookup.lookup().await?;
        let mut state = self.state.write().expect("guard state lock");
        state.current = EgressIp::Determined(ip);
        state.allowed.insert(ip);
        info!(%ip, allowed = state.allowed.len(), "egress IP baseline established");
        Ok(ip)
    }

    /// Re-fetch the external IP and report whether it is allowed.
    ///
    /// Fails with [`GuardError::NotInitialized`] until
    /// [`initialize`](Self::initialize) has succeeded. After that, lookup
    /// errors are returned inside [`CheckOutcome::Stale`].
    pub async fn check(&self) -> GuardResult<CheckOutcome> {
        let _refresh = self.refresh.lock().await;
        let previous = match self.state.read().expect("guard state lock").current {
            EgressIp::Determined(ip) => ip,
            EgressIp::Undetermined => return Err(GuardError::NotInitialized),
        };

        match self.lookup.lookup().await {
            Ok(ip) => {
                let mut state = self.state.write().expect("guard state lock");
                state.current = EgressIp::Determined(ip);
                let allowed = state.is_allowed();
                if ip != previous {
                    warn!(%previous, current = %ip, allowed, "egress IP changed");
                }
                if !allowed {
                    warn!(%ip, "egress IP not in allow-list, probing suspended");
                }
                Ok(CheckOutcome::Fresh { ip, allowed })
            }
            Err(error) => {
                let allowed = self.is_currently_allowed();
                warn!(%error, ip = %previous, allowed, "egress IP check failed, keeping last known IP");
                Ok(CheckOutcome::Stale {
                    ip: previous,
                    allowed,
                    error,
                })
            }
        }
    }

    /// Whether the last known IP is on the allow-list. No I/O.
    pub fn is_currently_allowed(&self) -> bool {
        self.state.read().expect("guard state lock").is_allowed()
    }

    pub fn current_ip(&self) -> Option<IpAddr> {
        match self.state.read().expect("guard state lock").current {
            EgressIp::Determined(ip) => Some(ip),
            EgressIp::Undetermined => None,
        }
    }

    pub fn allowed(&self) -> Vec<IpAddr> {
        let mut ips: Vec<IpAddr> = self
            .state
            .read()
            .expect("guard state lock")
            .allowed
            .iter()
            .copied()
            .collect();
        ips.sort();
        ips
    }
}
