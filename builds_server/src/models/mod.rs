//! Builds service data models, fetched fresh from remote APIs and never stored.

pub mod build;
pub mod snap;
pub mod status;
pub mod validation;
