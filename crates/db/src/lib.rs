//! SQLite persistence for requests and queues.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_and_migrate, connect_with_settings, ConnectError, DbPool};
pub use repositories::{
    InMemoryQueueRepository, InMemoryRequestRepository, RepositoryError, SqlQueueRepository,
    SqlRequestRepository,
};
