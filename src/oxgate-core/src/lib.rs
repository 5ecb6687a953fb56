pub mod models;
pub mod registry;
pub mod store;

pub use models::*;
pub use registry::*;
pub use store::*;
