//! # Service Control Filter Library
//!
//! 代理请求路径上的 API 密钥提取、Check 准入和 Report 遥测

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod service_control;
pub mod testing;

// Re-export commonly used types
pub use config::{FilterConfig, ServiceControlConfig};
pub use error::{Result, ServiceControlError};
pub use proxy::{
    CheckDecision, ServiceControlFilter, ServiceControlHandler, ServiceControlHandlerFactory,
    StreamInfo,
};
pub use service_control::{Code, ServiceControlCall, Status};
