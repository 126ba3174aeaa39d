pub mod cache;
pub mod device;
pub mod packer;
pub mod surface;

pub use cache::*;
pub use device::*;
pub use hit_test::*;
pub use packer::*;
pub use surface::*;
