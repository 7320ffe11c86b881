//! Query execution for Tessera.
//!
//! This crate provides:
//! - Per-client handle tables holding positions, values and scalars
//! - Nested-loop, hash and partitioned hash equi-joins
//! - Aggregates and element-wise arithmetic
//! - A batch scheduler that coalesces selects and fetches into shared scans
//! - An engine shared by all clients, driven through per-client sessions

mod aggregate;
mod batch;
mod context;
mod eval;
mod fork;
mod join;
mod ops;
mod print;
mod session;

pub use aggregate::{AggregateValue, add, avg, max, min, sub, sum};
pub use batch::BatchScheduler;
pub use context::{ClientContext, HandleValue};
pub use eval::{Output, evaluate};
pub use fork::fork_join;
pub use join::{JoinInput, JoinOutput, join};
pub use ops::{AggregateOp, JoinKind, Operand, Operator};
pub use print::format_handles;
pub use session::{Engine, Response, Session};
