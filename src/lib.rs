//! Cauldron Assist — AI assistant service for the Cauldron dashboard.

pub mod assistant;
pub mod bridge;
pub mod config;
pub mod deployment;
pub mod error;
pub mod permissions;
pub mod preferences;
pub mod store;
pub mod tenancy;
