pub mod auth;
pub mod backend;
pub mod budget;
pub mod cli;
pub mod config;
pub mod database;
pub mod telemetry;
