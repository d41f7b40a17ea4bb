//! Infrastructure layer
//!
//! I/O implementations: configuration, logging, database access, the
//! marketplace HTTP client, the retry executor, and the HTTP surface.

pub mod config;
pub mod database_connection;
pub mod extension_repository;
pub mod http_server;
pub mod logging;
pub mod marketplace_client;
pub mod retry;

pub use config::AppConfig;
pub use database_connection::DatabaseConnection;
pub use extension_repository::ExtensionRepository;
pub use marketplace_client::{MarketplaceClient, MarketplaceClientConfig};
pub use retry::RetryPolicy;
