pub mod decoder;
pub mod hues;
pub mod index;
pub mod overrides;

#[cfg(test)]
pub(crate) mod test_support;

pub use decoder::*;
pub use hues::*;
pub use index::*;
pub use overrides::*;

/// Position of an asset in its archive's index table.
pub type AssetId = u32;
