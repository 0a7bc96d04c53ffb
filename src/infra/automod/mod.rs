pub mod memory_kv_store;
pub mod sqlite_config_store;

pub use memory_kv_store::InMemoryKvStore;
pub use sqlite_config_store::SqliteAutomodStore;
