pub mod memory_storage;
pub mod storage;
pub mod transfer;
