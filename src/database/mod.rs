pub mod connection;
pub mod memory;
pub mod models;
pub mod repository;
pub mod store;

pub use connection::DatabaseConnection;
pub use memory::MemoryOpportunityStore;
pub use models::*;
pub use repository::OpportunityRepository;
pub use store::{append_with_retry, OpportunityStore, RetentionPolicy};
