pub mod headers;
pub mod request;
pub mod response;
pub mod service;

pub use headers::*;
pub use request::*;
pub use response::*;
pub use service::*;
