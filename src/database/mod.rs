pub mod db;
pub mod error;
pub mod models;

pub use db::connection::{connect, AccessToken, Connection, HostedConfig};
pub use db::queries::DataService;
pub use error::StoreError;
