//! # Service Control 调用模块
//!
//! 状态码、逻辑请求类型、线上格式、HTTP 传输以及面向请求处理器的回调式调用接口

pub mod call;
pub mod request_info;
pub mod status;
pub mod transport;
pub mod types;
pub mod wire;

pub use call::{
    CallStats, CallStatsSnapshot, CheckDoneFunc, ServiceControlCall, ServiceControlCallImpl,
};
pub use status::{Code, Status};
pub use transport::{HttpTransport, ServiceControlTransport};
pub use types::{
    ApiKeyState, CheckRequestInfo, CheckResponse, CheckResponseInfo, OperationInfo,
    ReportRequestInfo,
};
