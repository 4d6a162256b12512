pub mod attribution_repository;

// Re-export all repositories for convenient access
pub use attribution_repository::{AttributionRepository, AttributionStore, InMemoryAttributionStore};
