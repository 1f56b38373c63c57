//! idmsvc core — shared domain types, error kinds, and repository traits
//! for the trust fabric between tenants, IdM servers and enrolling hosts.

pub mod error;
pub mod identity;
pub mod models;
pub mod repository;
