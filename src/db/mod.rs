//! Database layer (PostgREST).

pub mod rest;

pub use rest::RestDb;

/// Table names as constants.
pub mod tables {
    pub const PROFILES: &str = "profiles";
}
