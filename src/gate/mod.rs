//! Route-level authentication gate.
//!
//! This is the only place a request is rejected for authentication reasons.

mod extract;
mod middleware;
mod policy;


pub use extract::{CurrentUser, MaybeUser};
pub use middleware::{AuthGate, GateRejection, gate_middleware};
pub use policy::{PolicyTable, RouteAuthPolicy};
