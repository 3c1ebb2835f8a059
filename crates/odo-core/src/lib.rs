//! # odo-core
//!
//! Core types shared across all Odonto crates.
//!
//! - Authenticated identity projection (`Identity`)
//! - Clinic memberships, roles, and the active clinic scope
//! - Session phase enum with state machine transitions
//! - Error taxonomy surfaced to the UI (`ErrorKind`) and cross-cutting `CoreError`
//!
//! This crate holds data only. No remote calls, no storage.

pub mod clinic;
pub mod errors;
pub mod identity;
pub mod phase;

pub use clinic::{ActiveClinic, ClinicMembership, ClinicRole};
pub use errors::{CoreError, ErrorKind};
pub use identity::Identity;
pub use phase::SessionPhase;
