//
// src/proxy/mod.rs
//
mod backend;
mod proxy;
mod registry;
mod relay;

pub use backend::{Backend, BackendMetrics};
pub use proxy::{ConnectionState, Proxy, ProxyError};
pub use registry::BackendRegistry;
pub use relay::{relay, RelayStats};
