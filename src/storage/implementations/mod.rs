pub mod memory_storage;
pub mod sqlite_queue;
pub mod sqlite_storage;
pub use memory_storage::MemoryStorage;
pub use sqlite_storage::SqliteStorage;

#[cfg(test)]
mod tests;
