//! # 过滤器适配层
//!
//! 把回调式的 [`ServiceControlHandler`] 接到异步代理的请求路径上：
//! 请求头阶段等待 Check 结论，日志阶段发送 Report。

use std::sync::Arc;

use http::request::Parts;
use http::{HeaderMap, HeaderValue, StatusCode};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::warn;

use super::handler::{
    CheckDecision, ServiceControlHandler, ServiceControlHandlerFactory,
    ServiceControlHandlerFactoryImpl,
};
use super::stream_info::StreamInfo;
use crate::config::{FilterConfig, ServiceControlConfig};
use crate::error::Result;
use crate::service_control::{Code, ServiceControlCallImpl, Status};

/// 调用方类型头
pub const CONSUMER_TYPE_HEADER: &str = "x-endpoint-api-consumer-type";
/// 调用方项目编号头
pub const CONSUMER_NUMBER_HEADER: &str = "x-endpoint-api-consumer-number";
/// 调用方类型取值
pub const CONSUMER_TYPE_PROJECT: &str = "PROJECT";

/// Service Control 过滤器
#[derive(Clone)]
pub struct ServiceControlFilter {
    factory: Arc<dyn ServiceControlHandlerFactory>,
}

impl std::fmt::Debug for ServiceControlFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceControlFilter").finish_non_exhaustive()
    }
}

impl ServiceControlFilter {
    /// 使用指定工厂创建
    #[must_use]
    pub fn new(factory: Arc<dyn ServiceControlHandlerFactory>) -> Self {
        Self { factory }
    }

    /// 根据配置创建使用 HTTP 调用的过滤器
    pub fn from_config(config: ServiceControlConfig, runtime: Handle) -> Result<Self> {
        let call = Arc::new(ServiceControlCallImpl::from_config(&config, runtime)?);
        let filter_config = Arc::new(FilterConfig::new(config, call)?);
        Ok(Self::new(Arc::new(ServiceControlHandlerFactoryImpl::new(
            filter_config,
        ))))
    }

    /// 新请求到达
    #[must_use]
    pub fn on_request(&self, request: &Parts, stream_info: &StreamInfo) -> ServiceControlStream {
        ServiceControlStream {
            handler: self.factory.create_handler(request, stream_info),
        }
    }
}

/// 单个请求的过滤器状态，销毁时中止未完成的 Check
pub struct ServiceControlStream {
    handler: Box<dyn ServiceControlHandler>,
}

impl std::fmt::Debug for ServiceControlStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceControlStream").finish_non_exhaustive()
    }
}

/// 等待期间 future 被丢弃时销毁处理器
struct AbortOnDrop<'a> {
    handler: Option<&'a mut Box<dyn ServiceControlHandler>>,
}

impl AbortOnDrop<'_> {
    fn disarm(mut self) {
        self.handler = None;
    }
}

impl Drop for AbortOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.on_destroy();
        }
    }
}

impl ServiceControlStream {
    /// 请求头阶段：等待 Check 结论
    ///
    /// 放行且带有调用方项目编号时，向请求头写入调用方信息。
    pub async fn decode_headers(&mut self, request: &mut Parts) -> CheckDecision {
        let (tx, rx) = oneshot::channel();
        self.handler.call_check(
            request,
            Box::new(move |decision| {
                let _ = tx.send(decision);
            }),
        );

        let guard = AbortOnDrop {
            handler: Some(&mut self.handler),
        };
        let decision = rx.await.unwrap_or_else(|_| CheckDecision::Deny {
            http_status: StatusCode::SERVICE_UNAVAILABLE,
            status: Status::new(Code::Unavailable, "check dropped without a result"),
        });
        guard.disarm();

        if let CheckDecision::Allow {
            consumer_project_number: Some(number),
        } = &decision
        {
            add_consumer_headers(&mut request.headers, number);
        }
        decision
    }

    /// 日志阶段：发送 Report
    pub fn log(
        &mut self,
        stream_info: &StreamInfo,
        request_headers: Option<&HeaderMap>,
        response_headers: Option<&HeaderMap>,
        response_trailers: Option<&HeaderMap>,
    ) {
        self.handler.call_report(
            stream_info,
            request_headers,
            response_headers,
            response_trailers,
        );
    }
}

fn add_consumer_headers(headers: &mut HeaderMap, project_number: &str) {
    match HeaderValue::from_str(project_number) {
        Ok(value) => {
            headers.insert(
                CONSUMER_TYPE_HEADER,
                HeaderValue::from_static(CONSUMER_TYPE_PROJECT),
            );
            headers.insert(CONSUMER_NUMBER_HEADER, value);
        }
        Err(e) => warn!(
            component = "service_control.filter",
            error = %e,
            "Consumer project number is not a valid header value"
        ),
    }
}
