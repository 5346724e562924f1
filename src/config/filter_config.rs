//! # 过滤器配置结构定义
//!
//! 与 TOML 配置文件一一对应的只读数据结构

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{Context, Result, ServiceControlError};

/// 默认 Service Control 地址
pub const DEFAULT_SERVICE_CONTROL_URI: &str = "https://servicecontrol.googleapis.com";

/// API 密钥所在位置
///
/// 在 TOML 中写作 `{ query = "key" }`、`{ header = "x-api-key" }` 或 `{ cookie = "apikey" }`。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    /// URL 查询参数
    Query(String),
    /// HTTP 请求头
    Header(String),
    /// Cookie 名称
    Cookie(String),
}

impl ApiKeyLocation {
    /// 位置中配置的名称
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Query(name) | Self::Header(name) | Self::Cookie(name) => name,
        }
    }
}

/// 运行平台
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComputePlatform {
    /// Compute Engine
    Gce,
    /// Kubernetes Engine
    Gke,
    /// App Engine flexible environment
    GaeFlex,
    /// 未知平台
    #[default]
    #[serde(other)]
    Unknown,
}

impl ComputePlatform {
    /// Report 负载中使用的标签值
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gce => "GCE",
            Self::Gke => "GKE",
            Self::GaeFlex => "GAE_FLEX",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// 后端协议
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendProtocol {
    /// HTTP/1.1
    #[default]
    Http1,
    /// HTTP/2
    Http2,
    /// gRPC
    Grpc,
}

impl BackendProtocol {
    /// Report 负载中使用的标签值
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http1 => "http1",
            Self::Http2 => "http2",
            Self::Grpc => "grpc",
        }
    }
}

/// 平台元数据（部署位置、项目等）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcpAttributes {
    /// 运行平台
    #[serde(default)]
    pub platform: ComputePlatform,
    /// 部署所在可用区
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// 部署所在项目
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// 单个受管服务的配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// 服务名称
    pub service_name: String,
    /// 服务配置版本
    #[serde(default)]
    pub service_config_id: String,
    /// 生产者项目
    #[serde(default)]
    pub producer_project_id: String,
    /// 后端协议
    #[serde(default)]
    pub backend_protocol: BackendProtocol,
    /// 需要写入日志的请求头
    #[serde(default)]
    pub log_request_headers: Vec<String>,
    /// 需要写入日志的响应头
    #[serde(default)]
    pub log_response_headers: Vec<String>,
}

/// 单个操作的调用要求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementSpec {
    /// 操作名称（由路由匹配得到）
    pub operation_name: String,
    /// 所属服务名称
    pub service_name: String,
    /// API 名称
    #[serde(default)]
    pub api_name: String,
    /// API 版本
    #[serde(default)]
    pub api_version: String,
    /// 没有 API 密钥时是否放行且不调用 Check
    #[serde(default)]
    pub allow_without_api_key: bool,
    /// 有序的 API 密钥位置；为空时使用全局默认位置
    #[serde(default)]
    pub api_key_locations: Vec<ApiKeyLocation>,
}

/// 过滤器主配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceControlConfig {
    /// Service Control 服务地址
    #[serde(default = "default_service_control_uri")]
    pub service_control_uri: String,
    /// Check 调用超时（毫秒）
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,
    /// Report 调用超时（毫秒）
    #[serde(default = "default_report_timeout_ms")]
    pub report_timeout_ms: u64,
    /// Check 网络失败时是否放行
    #[serde(default)]
    pub network_fail_open: bool,
    /// 调用 Service Control 使用的访问令牌
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// 平台元数据
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp_attributes: Option<GcpAttributes>,
    /// 操作未配置密钥位置时使用的默认位置
    #[serde(default = "default_api_key_locations")]
    pub default_api_key_locations: Vec<ApiKeyLocation>,
    /// 受管服务
    pub services: Vec<ServiceSpec>,
    /// 操作要求
    #[serde(default)]
    pub requirements: Vec<RequirementSpec>,
}

fn default_service_control_uri() -> String {
    DEFAULT_SERVICE_CONTROL_URI.to_string()
}

const fn default_check_timeout_ms() -> u64 {
    1000
}

const fn default_report_timeout_ms() -> u64 {
    2000
}

/// 默认的 API 密钥位置：`?key=`、`?api_key=`、`x-api-key` 头
#[must_use]
pub fn default_api_key_locations() -> Vec<ApiKeyLocation> {
    vec![
        ApiKeyLocation::Query("key".to_string()),
        ApiKeyLocation::Query("api_key".to_string()),
        ApiKeyLocation::Header("x-api-key".to_string()),
    ]
}

impl ServiceControlConfig {
    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载并校验
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ServiceControlError::config(format!(
                "配置文件不存在: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ServiceControlError::config_with_source(
                format!("读取配置文件失败: {}", path.display()),
                e,
            )
        })?;

        Self::from_toml_str(&content)
            .with_context(|| format!("加载配置文件失败: {}", path.display()))
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if self.service_control_uri.trim().is_empty() {
            return Err(ServiceControlError::config("service_control_uri 不能为空"));
        }
        url::Url::parse(&self.service_control_uri).map_err(|e| {
            ServiceControlError::config_with_source(
                format!("无效的 service_control_uri: {}", self.service_control_uri),
                e,
            )
        })?;

        if self.check_timeout_ms == 0 || self.report_timeout_ms == 0 {
            return Err(ServiceControlError::config("调用超时必须大于0"));
        }

        let mut services = HashSet::new();
        for service in &self.services {
            if service.service_name.trim().is_empty() {
                return Err(ServiceControlError::config("服务名称不能为空"));
            }
            if !services.insert(service.service_name.as_str()) {
                return Err(ServiceControlError::config(format!(
                    "重复的服务: {}",
                    service.service_name
                )));
            }
        }

        let mut operations = HashSet::new();
        for requirement in &self.requirements {
            if requirement.operation_name.trim().is_empty() {
                return Err(ServiceControlError::config("操作名称不能为空"));
            }
            if !operations.insert(requirement.operation_name.as_str()) {
                return Err(ServiceControlError::config(format!(
                    "重复的操作: {}",
                    requirement.operation_name
                )));
            }
            if !services.contains(requirement.service_name.as_str()) {
                return Err(ServiceControlError::config(format!(
                    "操作 {} 引用了未知服务: {}",
                    requirement.operation_name, requirement.service_name
                )));
            }
            if let Some(location) = requirement
                .api_key_locations
                .iter()
                .find(|location| location.name().is_empty())
            {
                return Err(ServiceControlError::config(format!(
                    "操作 {} 的密钥位置名称为空: {location:?}",
                    requirement.operation_name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
check_timeout_ms = 500

[gcp_attributes]
platform = "GKE"
zone = "us-central1-a"

[[services]]
service_name = "bookstore.endpoints.example.cloud.goog"
service_config_id = "2018-10-01r0"
producer_project_id = "example-project"
backend_protocol = "grpc"
log_request_headers = ["x-request-id"]

[[requirements]]
operation_name = "ListShelves"
service_name = "bookstore.endpoints.example.cloud.goog"
api_key_locations = [{ query = "key" }, { header = "x-api-key" }, { cookie = "apikey" }]

[[requirements]]
operation_name = "GetShelf"
service_name = "bookstore.endpoints.example.cloud.goog"
allow_without_api_key = true
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = ServiceControlConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.service_control_uri, DEFAULT_SERVICE_CONTROL_URI);
        assert_eq!(config.check_timeout_ms, 500);
        assert_eq!(config.report_timeout_ms, 2000);
        assert!(!config.network_fail_open);
        assert_eq!(config.default_api_key_locations, default_api_key_locations());

        let gcp = config.gcp_attributes.as_ref().unwrap();
        assert_eq!(gcp.platform, ComputePlatform::Gke);
        assert_eq!(gcp.zone.as_deref(), Some("us-central1-a"));

        assert_eq!(config.services[0].backend_protocol, BackendProtocol::Grpc);
        assert_eq!(
            config.requirements[0].api_key_locations,
            vec![
                ApiKeyLocation::Query("key".to_string()),
                ApiKeyLocation::Header("x-api-key".to_string()),
                ApiKeyLocation::Cookie("apikey".to_string()),
            ]
        );
        assert!(!config.requirements[0].allow_without_api_key);
        assert!(config.requirements[1].allow_without_api_key);
        assert!(config.requirements[1].api_key_locations.is_empty());
    }

    #[test]
    fn test_unknown_platform_falls_back() {
        let config = ServiceControlConfig::from_toml_str(
            r#"
services = []
[gcp_attributes]
platform = "ON_PREM"
"#,
        )
        .unwrap();
        assert_eq!(
            config.gcp_attributes.unwrap().platform,
            ComputePlatform::Unknown
        );
    }

    #[test]
    fn test_requirement_with_unknown_service_rejected() {
        let err = ServiceControlConfig::from_toml_str(
            r#"
services = []
[[requirements]]
operation_name = "ListShelves"
service_name = "missing"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("未知服务"));
    }

    #[test]
    fn test_duplicate_operation_rejected() {
        let err = ServiceControlConfig::from_toml_str(
            r#"
[[services]]
service_name = "a"
[[requirements]]
operation_name = "Op"
service_name = "a"
[[requirements]]
operation_name = "Op"
service_name = "a"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("重复的操作"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = ServiceControlConfig::from_toml_str("services = []\ncheck_timeout_ms = 0")
            .unwrap_err();
        assert!(matches!(err, ServiceControlError::Config { .. }));
    }

    #[test]
    fn test_invalid_uri_rejected() {
        let err = ServiceControlConfig::from_toml_str(
            "services = []\nservice_control_uri = \"not a uri\"",
        )
        .unwrap_err();
        assert!(err.to_string().contains("service_control_uri"));
    }

    #[test]
    fn test_empty_location_name_rejected() {
        let err = ServiceControlConfig::from_toml_str(
            r#"
[[services]]
service_name = "a"
[[requirements]]
operation_name = "Op"
service_name = "a"
api_key_locations = [{ header = "" }]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("密钥位置名称为空"));
    }

    #[test]
    fn test_from_file_missing() {
        let err = ServiceControlConfig::from_file("/nonexistent/service_control.toml").unwrap_err();
        assert!(err.to_string().contains("配置文件不存在"));
    }
}
