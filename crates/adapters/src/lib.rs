//! reposter adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `tenants`: Filesystem tenant/theme configuration loader
//! - `state`: SQLite, JSON-file and in-memory working set stores
//! - `wall`: Community wall platform API adapters
//! - `images`: HTTP image fetcher
//! - `outbox`: JSON lines publisher for require-approval mode

mod image_http;
pub mod outbox;
mod state_json;
mod state_memory;
mod state_sqlite;
mod tenants_fs;

pub mod wall_api;

/// Re-exports for tenant configuration adapters
pub mod tenants {
    pub use crate::tenants_fs::{DEFAULT_URL_BASE, FsTenantRepo, validate_config};
}

/// Re-exports for working set stores
pub mod state {
    pub use crate::state_json::JsonWorkingSetStore;
    pub use crate::state_memory::InMemoryWorkingSetStore;
    pub use crate::state_sqlite::SqliteWorkingSetStore;
}

/// Re-exports for wall platform adapters
pub mod wall {
    pub use crate::wall_api::{AccountTokens, DEFAULT_API_VERSION, WallPublisher, WallSource};
}

/// Re-exports for image adapters
pub mod images {
    pub use crate::image_http::HttpImageFetcher;
}
