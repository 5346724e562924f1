//! # Service Control 传输层
//!
//! 通过 HTTP/JSON 调用远端 `services.check` 和 `services.report`

use async_trait::async_trait;
use std::time::Duration;

use super::types::{CheckRequestInfo, CheckResponse, ReportRequestInfo};
use super::wire::{self, CheckResponseBody};
use crate::config::ServiceControlConfig;
use crate::error::{Result, ServiceControlError};

/// 远端调用传输接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServiceControlTransport: Send + Sync {
    /// 发送 Check 请求并解码结果
    async fn check(&self, request: CheckRequestInfo) -> Result<CheckResponse>;

    /// 发送 Report 请求
    async fn report(&self, request: ReportRequestInfo) -> Result<()>;
}

/// 基于 reqwest 的 HTTP 传输
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_uri: String,
    check_timeout: Duration,
    report_timeout: Duration,
    access_token: Option<String>,
}

impl HttpTransport {
    /// 根据配置创建传输
    pub fn new(config: &ServiceControlConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("service-control-filter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceControlError::config_with_source("创建HTTP客户端失败", e))?;

        Ok(Self {
            client,
            base_uri: config.service_control_uri.trim_end_matches('/').to_string(),
            check_timeout: Duration::from_millis(config.check_timeout_ms),
            report_timeout: Duration::from_millis(config.report_timeout_ms),
            access_token: config.access_token.clone(),
        })
    }

    /// `{base}/v1/services/{service}:{method}`
    fn endpoint(&self, service_name: &str, method: &str) -> Result<url::Url> {
        let raw = format!("{}/v1/services/{service_name}:{method}", self.base_uri);
        url::Url::parse(&raw).map_err(|e| {
            ServiceControlError::config_with_source(format!("无效的调用地址: {raw}"), e)
        })
    }

    async fn post<B: serde::Serialize + Sync>(
        &self,
        url: url::Url,
        body: &B,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let mut request = self.client.post(url).timeout(timeout).json(body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ServiceControlError::transport_status(
                format!("service control returned {status}: {detail}"),
                status.as_u16(),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl ServiceControlTransport for HttpTransport {
    async fn check(&self, request: CheckRequestInfo) -> Result<CheckResponse> {
        let url = self.endpoint(&request.operation.service_name, "check")?;
        let body = wire::build_check_request(&request);

        let response = self.post(url, &body, self.check_timeout).await?;
        let decoded: CheckResponseBody = response.json().await?;

        Ok(wire::convert_check_response(
            decoded,
            request.operation.has_api_key(),
        ))
    }

    async fn report(&self, request: ReportRequestInfo) -> Result<()> {
        let url = self.endpoint(&request.operation.service_name, "report")?;
        let body = wire::build_report_request(&request);

        self.post(url, &body, self.report_timeout).await?;
        Ok(())
    }
}
