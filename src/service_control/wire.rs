//! # Service Control JSON 线上格式
//!
//! 把逻辑请求转换为 `services.check` / `services.report` 的 JSON 请求体，
//! 并把 Check 响应解码为 [`CheckResponse`]。

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::status::{Code, Status};
use super::types::{
    ApiKeyState, CheckRequestInfo, CheckResponse, CheckResponseInfo, OperationInfo,
    ReportRequestInfo,
};

const SERVICE_AGENT: &str = concat!("service-control-filter/", env!("CARGO_PKG_VERSION"));

/// 控制面识别的标签键
pub mod labels {
    /// 调用方 IP
    pub const CALLER_IP: &str = "servicecontrol.googleapis.com/caller_ip";
    /// Referer
    pub const REFERER: &str = "servicecontrol.googleapis.com/referer";
    /// 代理标识
    pub const SERVICE_AGENT: &str = "servicecontrol.googleapis.com/service_agent";
    /// 运行平台
    pub const PLATFORM: &str = "servicecontrol.googleapis.com/platform";
    /// 部署位置
    pub const LOCATION: &str = "cloud.googleapis.com/location";
    /// 前端协议
    pub const PROTOCOL: &str = "/protocol";
    /// 响应码
    pub const RESPONSE_CODE: &str = "/response_code";
    /// 响应码分类（2xx/4xx...）
    pub const RESPONSE_CODE_CLASS: &str = "/response_code_class";
    /// Check 状态码
    pub const STATUS_CODE: &str = "/status_code";
    /// API 方法
    pub const API_METHOD: &str = "serviceruntime.googleapis.com/api_method";
    /// API 版本
    pub const API_VERSION: &str = "serviceruntime.googleapis.com/api_version";
    /// 后端协议
    pub const BACKEND_PROTOCOL: &str = "serviceruntime.googleapis.com/backend_protocol";
}

/// 单个操作
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// 操作 ID
    pub operation_id: String,
    /// 操作名称
    pub operation_name: String,
    /// `api_key:<key>`；没有密钥时省略
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer_id: Option<String>,
    /// 开始时间（RFC3339）
    pub start_time: String,
    /// 结束时间（RFC3339）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    /// 标签
    pub labels: BTreeMap<String, String>,
    /// 日志条目
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub log_entries: Vec<LogEntry>,
}

/// 日志条目
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// 日志名称
    pub name: String,
    /// 级别
    pub severity: String,
    /// 时间戳
    pub timestamp: String,
    /// 结构化内容
    pub struct_payload: Map<String, Value>,
}

/// `services.check` 请求体
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequestBody {
    /// 待检查的操作
    pub operation: Operation,
    /// 服务配置版本
    #[serde(skip_serializing_if = "String::is_empty")]
    pub service_config_id: String,
}

/// `services.report` 请求体
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequestBody {
    /// 上报的操作
    pub operations: Vec<Operation>,
    /// 服务配置版本
    #[serde(skip_serializing_if = "String::is_empty")]
    pub service_config_id: String,
}

/// `services.check` 响应体
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponseBody {
    /// 操作 ID
    #[serde(default)]
    pub operation_id: Option<String>,
    /// 检查错误；为空表示通过
    #[serde(default)]
    pub check_errors: Vec<CheckErrorBody>,
    /// 附加信息
    #[serde(default)]
    pub check_info: Option<CheckInfoBody>,
}

/// 单个检查错误
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckErrorBody {
    /// 错误代码，例如 `API_KEY_INVALID`
    pub code: String,
    /// 错误详情
    #[serde(default)]
    pub detail: String,
}

/// Check 附加信息
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInfoBody {
    /// 调用方信息
    #[serde(default)]
    pub consumer_info: Option<ConsumerInfoBody>,
}

/// 调用方信息
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerInfoBody {
    /// 项目编号；int64 在 JSON 中可能是字符串也可能是数字
    #[serde(default)]
    pub project_number: Option<Value>,
}

fn timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn base_operation(info: &OperationInfo) -> Operation {
    let mut tags = BTreeMap::new();
    tags.insert(labels::SERVICE_AGENT.to_string(), SERVICE_AGENT.to_string());
    if let Some(ip) = info.client_ip.as_ref().filter(|ip| !ip.is_empty()) {
        tags.insert(labels::CALLER_IP.to_string(), ip.clone());
    }
    if let Some(referer) = info.referer.as_ref().filter(|r| !r.is_empty()) {
        tags.insert(labels::REFERER.to_string(), referer.clone());
    }

    Operation {
        operation_id: info.operation_id.clone(),
        operation_name: info.operation_name.clone(),
        consumer_id: info
            .has_api_key()
            .then(|| format!("api_key:{}", info.api_key)),
        start_time: timestamp(info.request_start_time),
        end_time: None,
        labels: tags,
        log_entries: Vec::new(),
    }
}

/// 构建 Check 请求体
#[must_use]
pub fn build_check_request(info: &CheckRequestInfo) -> CheckRequestBody {
    let mut operation = base_operation(&info.operation);
    operation.end_time = Some(timestamp(info.current_time));
    CheckRequestBody {
        operation,
        service_config_id: info.operation.service_config_id.clone(),
    }
}

/// 构建 Report 请求体
#[must_use]
pub fn build_report_request(info: &ReportRequestInfo) -> ReportRequestBody {
    let mut operation = base_operation(&info.operation);
    operation.end_time = Some(timestamp(info.end_time));

    let tags = &mut operation.labels;
    tags.insert(
        labels::RESPONSE_CODE.to_string(),
        info.response_code.to_string(),
    );
    tags.insert(
        labels::RESPONSE_CODE_CLASS.to_string(),
        format!("{}xx", info.response_code / 100),
    );
    tags.insert(
        labels::STATUS_CODE.to_string(),
        info.check_status.code().as_str().to_string(),
    );
    tags.insert(
        labels::PLATFORM.to_string(),
        info.compute_platform.as_str().to_string(),
    );
    tags.insert(
        labels::BACKEND_PROTOCOL.to_string(),
        info.backend_protocol.as_str().to_string(),
    );
    if let Some(location) = &info.location {
        tags.insert(labels::LOCATION.to_string(), location.clone());
    }
    if let Some(protocol) = &info.frontend_protocol {
        tags.insert(labels::PROTOCOL.to_string(), protocol.clone());
    }
    if !info.api_method.is_empty() {
        tags.insert(labels::API_METHOD.to_string(), info.api_method.clone());
    }
    if !info.api_version.is_empty() {
        tags.insert(labels::API_VERSION.to_string(), info.api_version.clone());
    }

    operation.log_entries.push(LogEntry {
        name: "endpoints_log".to_string(),
        severity: if info.response_code >= 400 {
            "ERROR".to_string()
        } else {
            "INFO".to_string()
        },
        timestamp: timestamp(info.end_time),
        struct_payload: log_payload(info),
    });

    ReportRequestBody {
        operations: vec![operation],
        service_config_id: info.operation.service_config_id.clone(),
    }
}

fn log_payload(info: &ReportRequestInfo) -> Map<String, Value> {
    let mut payload = Map::new();
    let mut put = |key: &str, value: Value| {
        payload.insert(key.to_string(), value);
    };

    put("producer_project_id", info.operation.producer_project_id.clone().into());
    put("api_name", info.api_name.clone().into());
    put("api_version", info.api_version.clone().into());
    put("api_method", info.api_method.clone().into());
    put("http_method", info.method.clone().into());
    put("url", info.url.clone().into());
    put("http_response_code", info.response_code.into());
    put("request_size_in_bytes", info.request_size.into());
    put("response_size_in_bytes", info.response_size.into());
    put("request_headers_size_in_bytes", info.request_headers_size.into());
    put("response_headers_size_in_bytes", info.response_headers_size.into());
    put("log_message", info.log_message.clone().into());
    if info.operation.has_api_key() {
        put("api_key", info.operation.api_key.clone().into());
    }
    if let Some(ip) = &info.operation.client_ip {
        put("client_ip", ip.clone().into());
    }
    if let Some(location) = &info.location {
        put("location", location.clone().into());
    }
    if let Some(project) = &info.project_id {
        put("gcp_project_id", project.clone().into());
    }
    if let Some(latency) = info.latency {
        put("request_latency_in_ms", u64::try_from(latency.as_millis()).unwrap_or(u64::MAX).into());
    }
    if !info.request_headers.is_empty() {
        put("request_headers", info.request_headers.clone().into());
    }
    if !info.response_headers.is_empty() {
        put("response_headers", info.response_headers.clone().into());
    }
    if !info.check_status.is_ok() {
        put("error_cause", info.check_status.to_string().into());
    }
    payload
}

/// 将检查错误代码映射为状态码和密钥状态
#[must_use]
pub fn check_error_code(code: &str) -> (Code, Option<ApiKeyState>) {
    match code {
        "API_KEY_INVALID" | "API_KEY_EXPIRED" | "API_KEY_NOT_FOUND" => {
            (Code::InvalidArgument, Some(ApiKeyState::Invalid))
        }
        "SERVICE_NOT_ACTIVATED" => (Code::PermissionDenied, Some(ApiKeyState::NotEnabled)),
        "PERMISSION_DENIED"
        | "CONSUMER_INVALID"
        | "BILLING_DISABLED"
        | "CLIENT_APP_BLOCKED"
        | "API_TARGET_BLOCKED"
        | "API_KEY_IP_ADDRESS_BLOCKED"
        | "API_KEY_REFERRER_BLOCKED"
        | "API_KEY_ANDROID_APP_BLOCKED"
        | "API_KEY_IOS_APP_BLOCKED" => (Code::PermissionDenied, None),
        "PROJECT_DELETED" | "PROJECT_INVALID" | "IP_ADDRESS_BLOCKED" | "REFERER_BLOCKED" => {
            (Code::InvalidArgument, None)
        }
        "RESOURCE_EXHAUSTED" => (Code::ResourceExhausted, None),
        "NAMESPACE_LOOKUP_UNAVAILABLE"
        | "SERVICE_STATUS_UNAVAILABLE"
        | "BILLING_STATUS_UNAVAILABLE"
        | "CLOUD_RESOURCE_MANAGER_BACKEND_UNAVAILABLE" => (Code::Unavailable, None),
        _ => (Code::Internal, None),
    }
}

/// 解码 Check 响应
#[must_use]
pub fn convert_check_response(body: CheckResponseBody, has_api_key: bool) -> CheckResponse {
    let consumer_project_number = body
        .check_info
        .and_then(|info| info.consumer_info)
        .and_then(|consumer| consumer.project_number)
        .and_then(|number| match number {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    let Some(error) = body.check_errors.into_iter().next() else {
        return CheckResponse {
            status: Status::ok(),
            info: CheckResponseInfo {
                consumer_project_number,
                api_key_state: if has_api_key {
                    ApiKeyState::Verified
                } else {
                    ApiKeyState::NotChecked
                },
                service_is_activated: true,
            },
        };
    };

    let (code, key_state) = check_error_code(&error.code);
    let message = if error.detail.is_empty() {
        error.code.clone()
    } else {
        format!("{}: {}", error.code, error.detail)
    };

    CheckResponse {
        status: Status::new(code, message),
        info: CheckResponseInfo {
            consumer_project_number,
            api_key_state: key_state.unwrap_or(if has_api_key {
                ApiKeyState::Verified
            } else {
                ApiKeyState::NotChecked
            }),
            service_is_activated: error.code != "SERVICE_NOT_ACTIVATED",
        },
    }
}
