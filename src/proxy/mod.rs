//! # 代理过滤器模块
//!
//! 每个请求的 Service Control 处理器、处理器工厂以及异步过滤链适配

pub mod filter;
pub mod handler;
pub mod stream_info;

pub use filter::{ServiceControlFilter, ServiceControlStream};
pub use handler::{
    CheckDecision, CheckDoneCallback, CheckState, PendingCheck, ServiceControlHandler,
    ServiceControlHandlerFactory, ServiceControlHandlerFactoryImpl, ServiceControlHandlerImpl,
};
pub use stream_info::StreamInfo;
