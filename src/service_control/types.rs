//! # Check / Report 逻辑请求类型
//!
//! 远端调用的线上格式由传输层负责，这里只描述需要填充的逻辑字段。

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::status::Status;
use crate::config::{BackendProtocol, ComputePlatform};

/// API 密钥校验状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApiKeyState {
    /// 没有经过 Check
    #[default]
    NotChecked,
    /// 密钥有效
    Verified,
    /// 密钥无效、过期或不存在
    Invalid,
    /// 密钥所属项目未启用该服务
    NotEnabled,
}

/// Check 调用返回的元数据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckResponseInfo {
    /// 调用方项目编号
    pub consumer_project_number: Option<String>,
    /// API 密钥状态
    pub api_key_state: ApiKeyState,
    /// 服务是否在调用方项目中启用
    pub service_is_activated: bool,
}

/// 传输层返回的完整 Check 结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckResponse {
    /// 解码后的状态
    pub status: Status,
    /// 响应元数据
    pub info: CheckResponseInfo,
}

/// 标识一次请求的操作信息，构建后不再修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationInfo {
    /// 操作 ID（UUID v4）
    pub operation_id: String,
    /// 操作名称
    pub operation_name: String,
    /// 服务名称
    pub service_name: String,
    /// 服务配置版本
    pub service_config_id: String,
    /// 生产者项目
    pub producer_project_id: String,
    /// 调用方 API 密钥（可能为空）
    pub api_key: String,
    /// 客户端 IP
    pub client_ip: Option<String>,
    /// Referer
    pub referer: Option<String>,
    /// 请求开始时间
    pub request_start_time: DateTime<Utc>,
}

impl OperationInfo {
    /// 是否携带了 API 密钥
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Check 请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequestInfo {
    /// 操作信息（含 API 密钥）
    pub operation: OperationInfo,
    /// 请求时间
    pub current_time: DateTime<Utc>,
}

/// Report 请求：操作信息 + 响应阶段数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequestInfo {
    /// 操作信息
    pub operation: OperationInfo,
    /// Check 结果；没有调用 Check 时为 OK
    pub check_status: Status,
    /// Check 元数据；没有调用 Check 时为默认值
    pub check_response_info: CheckResponseInfo,
    /// 请求路径
    pub url: String,
    /// HTTP 方法
    pub method: String,
    /// API 名称
    pub api_name: String,
    /// API 版本
    pub api_version: String,
    /// API 方法（操作名称）
    pub api_method: String,
    /// 日志消息
    pub log_message: String,
    /// 响应状态码
    pub response_code: u16,
    /// 请求字节数
    pub request_size: u64,
    /// 响应字节数
    pub response_size: u64,
    /// 请求头字节数
    pub request_headers_size: u64,
    /// 响应头字节数
    pub response_headers_size: u64,
    /// 记录的请求头，格式 `name=value;`
    pub request_headers: String,
    /// 记录的响应头，格式 `name=value;`
    pub response_headers: String,
    /// 请求耗时
    pub latency: Option<Duration>,
    /// 前端协议
    pub frontend_protocol: Option<String>,
    /// 后端协议
    pub backend_protocol: BackendProtocol,
    /// 运行平台
    pub compute_platform: ComputePlatform,
    /// 部署位置
    pub location: Option<String>,
    /// 部署所在项目
    pub project_id: Option<String>,
    /// 请求结束时间
    pub end_time: DateTime<Utc>,
}

impl ReportRequestInfo {
    /// 以请求阶段信息初始化，响应阶段字段留空
    #[must_use]
    pub fn new(operation: OperationInfo) -> Self {
        let end_time = Utc::now();
        Self {
            operation,
            check_status: Status::ok(),
            check_response_info: CheckResponseInfo::default(),
            url: String::new(),
            method: String::new(),
            api_name: String::new(),
            api_version: String::new(),
            api_method: String::new(),
            log_message: String::new(),
            response_code: 0,
            request_size: 0,
            response_size: 0,
            request_headers_size: 0,
            response_headers_size: 0,
            request_headers: String::new(),
            response_headers: String::new(),
            latency: None,
            frontend_protocol: None,
            backend_protocol: BackendProtocol::default(),
            compute_platform: ComputePlatform::default(),
            location: None,
            project_id: None,
            end_time,
        }
    }
}
