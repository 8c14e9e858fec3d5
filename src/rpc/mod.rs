pub mod circuit_breaker;
pub mod client;
pub mod response;
pub mod retry;

pub use client::{RpcClient, RpcClientConfig, SharedRpcClient};
pub use response::RpcError;
