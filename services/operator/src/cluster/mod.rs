//! Cluster client implementations.

mod http;
mod mock;

pub use http::HttpClusterClient;
pub use mock::MockCluster;
