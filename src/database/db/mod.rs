pub mod connection;
pub mod fallback;
pub mod queries;
pub mod rest;
