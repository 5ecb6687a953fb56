pub mod cache;
pub mod forward;
pub mod limiter;
pub mod pipeline;
pub mod server;
pub mod transform;

pub use cache::ResponseCache;
pub use forward::{Forwarder, HttpForwarder};
pub use limiter::TokenBucketLimiter;
pub use pipeline::ProxyPipeline;
pub use server::GatewayServer;
