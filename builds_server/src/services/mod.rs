//! Clients for the dashboard, Launchpad and GitHub, and the build logic on top.

pub mod build_service;
pub mod dashboard_service;
pub mod github_service;
pub mod launchpad_service;
pub mod repository_service;
