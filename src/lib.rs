//! tracker-dash library exports

pub mod config;
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod issues;
pub mod models;
pub mod report;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod tasks;
