pub mod hash;
pub mod memory;
pub mod store;
