pub mod connection;
pub mod registry;

pub use registry::ChatRegistry;
