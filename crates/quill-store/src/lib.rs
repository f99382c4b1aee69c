mod error;
mod file;
mod memory;
mod storage;

pub use error::StoreError;
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use storage::{temp_sibling, Storage};
