//! `hms-core` — shared primitives for the record-management backend.
//!
//! Only identifiers and the domain error model live here; everything that
//! touches credentials belongs to `hms-auth`.

pub mod error;
pub mod id;

pub use error::DomainError;
pub use id::TenantId;
