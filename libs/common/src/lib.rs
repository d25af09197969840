pub mod id;
pub mod protocol;

pub use id::Identity;
