pub mod config_file;
pub mod lock;
pub mod memory;
pub mod paths;
pub mod sqlite_store;
pub mod store;

pub use lock::WorkspaceLock;
pub use memory::MemoryStore;
pub use paths::SagaPaths;
pub use sqlite_store::SqliteStore;
pub use store::{LedgerRead, LedgerWrite, Store};
