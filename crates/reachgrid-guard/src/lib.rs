//! reachgrid-guard: egress IP allow-list gate.
//!
//! The guard learns the process's external IP once at startup and trusts
//! it. Later re-checks compare the current external IP against the
//! allow-list; when it is not listed, probing is suspended until a
//! re-check sees a trusted address again.
//!
//! ```text
//! Undetermined ──initialize()──▶ Determined(ip) ──check()──▶ Determined(ip')
//! ```
//!
//! A lookup failure before initialization is fatal. After it, the last
//! known IP is kept and the failure is only logged.

pub mod error;
pub mod guard;
pub mod lookup;

pub use error::{GuardError, GuardResult};
pub use guard::{CheckOutcome, EgressGuard};
pub use lookup::{HttpIpLookup, IpLookup, parse_ip_body};
