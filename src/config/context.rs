//! # 运行时配置上下文
//!
//! 在路由匹配阶段使用的不可变查找表，构建一次后以 `Arc` 共享给每个请求

use std::collections::HashMap;
use std::sync::Arc;

use super::filter_config::{
    ApiKeyLocation, BackendProtocol, GcpAttributes, RequirementSpec, ServiceControlConfig,
    ServiceSpec,
};
use crate::error::{Result, ServiceControlError};
use crate::service_control::ServiceControlCall;

/// 单个服务的运行时上下文
#[derive(Debug)]
pub struct ServiceContext {
    spec: ServiceSpec,
}

impl ServiceContext {
    /// 创建服务上下文
    #[must_use]
    pub const fn new(spec: ServiceSpec) -> Self {
        Self { spec }
    }

    /// 服务名称
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.spec.service_name
    }

    /// 服务配置版本
    #[must_use]
    pub fn service_config_id(&self) -> &str {
        &self.spec.service_config_id
    }

    /// 生产者项目
    #[must_use]
    pub fn producer_project_id(&self) -> &str {
        &self.spec.producer_project_id
    }

    /// 后端协议
    #[must_use]
    pub const fn backend_protocol(&self) -> BackendProtocol {
        self.spec.backend_protocol
    }

    /// 需要写入日志的请求头
    #[must_use]
    pub fn log_request_headers(&self) -> &[String] {
        &self.spec.log_request_headers
    }

    /// 需要写入日志的响应头
    #[must_use]
    pub fn log_response_headers(&self) -> &[String] {
        &self.spec.log_response_headers
    }
}

/// 匹配到的操作要求
#[derive(Debug)]
pub struct RequirementContext {
    spec: RequirementSpec,
    service: Arc<ServiceContext>,
}

impl RequirementContext {
    /// 创建操作要求上下文
    #[must_use]
    pub const fn new(spec: RequirementSpec, service: Arc<ServiceContext>) -> Self {
        Self { spec, service }
    }

    /// 操作名称
    #[must_use]
    pub fn operation_name(&self) -> &str {
        &self.spec.operation_name
    }

    /// API 名称
    #[must_use]
    pub fn api_name(&self) -> &str {
        &self.spec.api_name
    }

    /// API 版本
    #[must_use]
    pub fn api_version(&self) -> &str {
        &self.spec.api_version
    }

    /// 没有密钥时是否允许跳过 Check
    #[must_use]
    pub const fn allow_without_api_key(&self) -> bool {
        self.spec.allow_without_api_key
    }

    /// 操作自身配置的密钥位置（可能为空）
    #[must_use]
    pub fn api_key_locations(&self) -> &[ApiKeyLocation] {
        &self.spec.api_key_locations
    }

    /// 所属服务
    #[must_use]
    pub fn service_ctx(&self) -> &ServiceContext {
        &self.service
    }
}

/// 过滤器级别的运行时配置
pub struct FilterConfig {
    config: ServiceControlConfig,
    requirements: HashMap<String, Arc<RequirementContext>>,
    call: Arc<dyn ServiceControlCall>,
}

impl std::fmt::Debug for FilterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterConfig")
            .field("service_control_uri", &self.config.service_control_uri)
            .field("services", &self.config.services.len())
            .field("requirements", &self.requirements.len())
            .finish_non_exhaustive()
    }
}

impl FilterConfig {
    /// 根据已解析的配置构建查找表
    pub fn new(config: ServiceControlConfig, call: Arc<dyn ServiceControlCall>) -> Result<Self> {
        config.validate()?;

        let services: HashMap<String, Arc<ServiceContext>> = config
            .services
            .iter()
            .map(|spec| {
                (
                    spec.service_name.clone(),
                    Arc::new(ServiceContext::new(spec.clone())),
                )
            })
            .collect();

        let mut requirements = HashMap::with_capacity(config.requirements.len());
        for spec in &config.requirements {
            let service = services.get(&spec.service_name).ok_or_else(|| {
                ServiceControlError::config(format!("未知服务: {}", spec.service_name))
            })?;
            requirements.insert(
                spec.operation_name.clone(),
                Arc::new(RequirementContext::new(spec.clone(), Arc::clone(service))),
            );
        }

        tracing::debug!(
            component = "service_control.config",
            services = services.len(),
            requirements = requirements.len(),
            "Filter config built"
        );

        Ok(Self {
            config,
            requirements,
            call,
        })
    }

    /// 按操作名称查找要求
    #[must_use]
    pub fn find_requirement(&self, operation: &str) -> Option<Arc<RequirementContext>> {
        self.requirements.get(operation).cloned()
    }

    /// 操作未配置位置时的默认密钥位置
    #[must_use]
    pub fn default_api_key_locations(&self) -> &[ApiKeyLocation] {
        &self.config.default_api_key_locations
    }

    /// 平台元数据
    #[must_use]
    pub const fn gcp_attributes(&self) -> Option<&GcpAttributes> {
        self.config.gcp_attributes.as_ref()
    }

    /// Check/Report 调用实现
    #[must_use]
    pub fn call(&self) -> &dyn ServiceControlCall {
        self.call.as_ref()
    }

    /// 原始配置
    #[must_use]
    pub const fn raw(&self) -> &ServiceControlConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeServiceControlCall, sample_config};

    #[test]
    fn test_find_requirement_links_service() {
        let config =
            FilterConfig::new(sample_config(), Arc::new(FakeServiceControlCall::new())).unwrap();

        let requirement = config.find_requirement("ListShelves").unwrap();
        assert_eq!(requirement.operation_name(), "ListShelves");
        assert_eq!(
            requirement.service_ctx().service_name(),
            "bookstore.endpoints.example.cloud.goog"
        );
        assert!(config.find_requirement("Unknown").is_none());
    }

    #[test]
    fn test_requirements_share_service_context() {
        let config =
            FilterConfig::new(sample_config(), Arc::new(FakeServiceControlCall::new())).unwrap();

        let a = config.find_requirement("ListShelves").unwrap();
        let b = config.find_requirement("GetShelf").unwrap();
        assert!(std::ptr::eq(a.service_ctx(), b.service_ctx()));
    }
}
