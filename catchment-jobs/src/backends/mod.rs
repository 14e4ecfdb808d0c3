mod directory;
mod memory;

pub use directory::DirectoryDispatcher;
pub use memory::MemoryDispatcher;
