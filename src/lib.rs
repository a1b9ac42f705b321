#![forbid(unsafe_code)]

pub mod client;
pub mod codec;
pub mod config;
pub mod errors;
pub mod protocol;
pub mod registry;
pub mod supervisor;

pub use client::RpcClient;
pub use config::ClientConfig;
pub use errors::{ClientError, Result, RpcError};
