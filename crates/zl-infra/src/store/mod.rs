pub mod memory;

pub use memory::MemoryConnectionStore;
