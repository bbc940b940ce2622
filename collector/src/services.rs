pub mod health;
pub mod ingestion;
pub mod notifier;
pub mod token_authority;
