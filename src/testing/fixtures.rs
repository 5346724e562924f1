//! # 测试数据 Fixtures
//!
//! 提供测试用的配置和预设请求数据

use chrono::Utc;
use std::sync::Arc;

use crate::config::{
    ApiKeyLocation, BackendProtocol, ComputePlatform, DEFAULT_SERVICE_CONTROL_URI, FilterConfig,
    GcpAttributes, RequirementSpec, ServiceControlConfig, ServiceSpec, default_api_key_locations,
};
use crate::service_control::{CheckRequestInfo, OperationInfo, ServiceControlCall};

/// 示例服务名称
pub const BOOKSTORE_SERVICE: &str = "bookstore.endpoints.example.cloud.goog";
/// 示例服务配置版本
pub const BOOKSTORE_CONFIG_ID: &str = "2018-10-01r0";

/// 操作要求构建器
#[derive(Debug, Clone)]
pub struct RequirementFixture {
    spec: RequirementSpec,
}

impl RequirementFixture {
    /// 以操作名称创建，归属示例服务
    #[must_use]
    pub fn new(operation_name: &str) -> Self {
        Self {
            spec: RequirementSpec {
                operation_name: operation_name.to_string(),
                service_name: BOOKSTORE_SERVICE.to_string(),
                api_name: "endpoints.examples.bookstore.Bookstore".to_string(),
                api_version: "1.0.0".to_string(),
                allow_without_api_key: false,
                api_key_locations: Vec::new(),
            },
        }
    }

    /// 设置无密钥放行
    #[must_use]
    pub const fn allow_without_api_key(mut self, allow: bool) -> Self {
        self.spec.allow_without_api_key = allow;
        self
    }

    /// 设置密钥位置
    #[must_use]
    pub fn locations(mut self, locations: Vec<ApiKeyLocation>) -> Self {
        self.spec.api_key_locations = locations;
        self
    }

    /// 构建
    #[must_use]
    pub fn build(self) -> RequirementSpec {
        self.spec
    }
}

/// 示例配置
///
/// - `ListShelves`：`?key=`、`x-api-key` 头、`apikey` Cookie，必须 Check
/// - `GetShelf`：允许无密钥访问，使用默认位置
/// - `CreateShelf`：必须 Check，使用默认位置
#[must_use]
pub fn sample_config() -> ServiceControlConfig {
    ServiceControlConfig {
        service_control_uri: DEFAULT_SERVICE_CONTROL_URI.to_string(),
        check_timeout_ms: 1000,
        report_timeout_ms: 2000,
        network_fail_open: false,
        access_token: None,
        gcp_attributes: Some(GcpAttributes {
            platform: ComputePlatform::Gke,
            zone: Some("us-central1-a".to_string()),
            project_id: Some("example-project".to_string()),
        }),
        default_api_key_locations: default_api_key_locations(),
        services: vec![ServiceSpec {
            service_name: BOOKSTORE_SERVICE.to_string(),
            service_config_id: BOOKSTORE_CONFIG_ID.to_string(),
            producer_project_id: "example-project".to_string(),
            backend_protocol: BackendProtocol::Grpc,
            log_request_headers: vec!["x-request-id".to_string(), "user-agent".to_string()],
            log_response_headers: vec!["content-type".to_string()],
        }],
        requirements: vec![
            RequirementFixture::new("ListShelves")
                .locations(vec![
                    ApiKeyLocation::Query("key".to_string()),
                    ApiKeyLocation::Header("x-api-key".to_string()),
                    ApiKeyLocation::Cookie("apikey".to_string()),
                ])
                .build(),
            RequirementFixture::new("GetShelf")
                .allow_without_api_key(true)
                .build(),
            RequirementFixture::new("CreateShelf").build(),
        ],
    }
}

/// 以示例配置构建过滤器配置
#[must_use]
pub fn filter_config(call: Arc<dyn ServiceControlCall>) -> Arc<FilterConfig> {
    Arc::new(FilterConfig::new(sample_config(), call).expect("示例配置应当有效"))
}

/// 示例操作信息（不含 API 密钥）
#[must_use]
pub fn operation_info() -> OperationInfo {
    OperationInfo {
        operation_id: "4f6a3c1e-5b2d-4e8f-9a7b-0c1d2e3f4a5b".to_string(),
        operation_name: "ListShelves".to_string(),
        service_name: BOOKSTORE_SERVICE.to_string(),
        service_config_id: BOOKSTORE_CONFIG_ID.to_string(),
        producer_project_id: "example-project".to_string(),
        api_key: String::new(),
        client_ip: Some("10.0.0.1".to_string()),
        referer: None,
        request_start_time: Utc::now(),
    }
}

/// 示例 Check 请求
#[must_use]
pub fn check_request_info() -> CheckRequestInfo {
    CheckRequestInfo {
        operation: operation_info(),
        current_time: Utc::now(),
    }
}
