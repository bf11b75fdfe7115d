//! AWS unit adapters
//!
//! Each unit module exposes a props struct, a typed outputs struct and a
//! `build(id, target, &props)` function that declares the unit's resources.
//! Units are meant to be wired in this order:
//!
//! ```text
//! network ──> security ──> load_balancer ──> backend
//!    │            │                              ^
//!    │            └──────────────────────────────┘
//!    └──> replication (secondary target, ForeignRef inputs only)
//! ```
//!
//! [`compose`] does that wiring from a parsed deployment file.

pub mod backend;
pub mod cidr;
pub mod compose;
pub mod load_balancer;
pub mod network;
pub mod replication;
pub mod security;
pub mod tags;
pub mod types;

pub use backend::{BackendOutputs, BackendProps, BackendSettings, FunctionCode};
pub use cidr::{CidrError, Ipv4Cidr};
pub use compose::{BuiltOutputs, Composition, UnitKind, compose};
pub use load_balancer::{
    HealthCheck, HealthChecks, ListenerRule, Listeners, LoadBalancerOutputs, LoadBalancerProps,
};
pub use network::{NetworkOutputs, NetworkProps};
pub use replication::{ReplicationOutputs, ReplicationProps};
pub use security::{RolePolicies, RolePolicy, Roles, SecurityOutputs, SecurityProps};
