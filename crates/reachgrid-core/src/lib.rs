//! reachgrid-core: shared vocabulary for the ReachGrid probe.
//!
//! Every other crate speaks in terms of [`Target`], [`ProbeOutcome`] and
//! [`ResultCategory`]. Configuration is a single TOML document parsed
//! into [`ReachConfig`].

pub mod config;
pub mod types;

pub use config::{ReachConfig, parse_duration};
pub use types::*;

/// Boxed future used at the crate seams where a trait object is needed.
pub type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
