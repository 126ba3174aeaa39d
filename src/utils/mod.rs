pub mod archive;
pub mod error;
pub mod slot_cache;

pub use archive::*;
pub use error::*;
pub use slot_cache::*;
