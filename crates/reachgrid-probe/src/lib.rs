//! reachgrid-probe: the probing loop.
//!
//! A fixed number of workers pull targets from the
//! [`WeightedScheduler`](reachgrid_scheduler::WeightedScheduler), consult
//! the egress guard, issue one HTTP GET per draw under an adaptive
//! deadline, and feed the classified outcome back into the
//! [`StatsAggregator`](reachgrid_stats::StatsAggregator).
//!
//! # Architecture
//!
//! ```text
//! Executor
//!   ├── N workers (tokio tasks), each looping:
//!   │     draw ─▶ guard gate ─▶ ProbePolicy ─▶ ProbeTransport::get
//!   │           ─▶ StatsAggregator::record ─▶ reweight (awaited only)
//!   ├── periodic EgressGuard::check (every K draws)
//!   └── report callback (every M recorded outcomes)
//! ```
//!
//! # Timeouts
//!
//! Most probes are *speculative*: a short deadline that only catches fast
//! successes. Running out of time there yields `Canceled`, which carries no
//! health signal. Every Nth probe of a target is *awaited*: a long deadline
//! whose expiry counts as a timeout failure.

pub mod executor;
pub mod policy;
pub mod transport;

pub use executor::{Executor, ExecutorConfig, ReportCallback};
pub use policy::{ProbeMode, ProbePolicy};
pub use transport::{HttpResponse, HttpTransport, ProbeTransport, TransportError, TransportResult};
