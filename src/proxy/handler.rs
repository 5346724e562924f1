//! # Service Control 请求处理器
//!
//! 每个请求一个处理器：提取 API 密钥、按需发起异步 Check 并在结果返回后恢复过滤链，
//! 响应完成后组装并发送 Report。
//!
//! Check 的完成回调只持有共享的 [`PendingCheck`] 槽位，不引用处理器本身。
//! 请求被销毁时在同一把锁下设置中止标志，之后到达的结果被直接丢弃。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use http::request::Parts;
use http::{HeaderMap, StatusCode};
use tracing::{debug, info};
use uuid::Uuid;

use super::stream_info::StreamInfo;
use crate::auth::{ApiKeyExtractor, AuthUtils, QueryParser, UrlQueryParser};
use crate::config::{FilterConfig, RequirementContext};
use crate::service_control::request_info::{fill_gcp_info, fill_logged_header, protocol_name};
use crate::service_control::{
    CheckRequestInfo, CheckResponseInfo, OperationInfo, ReportRequestInfo, Status,
};

/// Check 结论，传给过滤链的继续回调
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDecision {
    /// 放行
    Allow {
        /// Check 返回的调用方项目编号
        consumer_project_number: Option<String>,
    },
    /// 拒绝，并以映射后的 HTTP 状态码结束请求
    Deny {
        /// HTTP 状态码
        http_status: StatusCode,
        /// Check 状态
        status: Status,
    },
}

impl CheckDecision {
    /// 不带调用方信息的放行
    #[must_use]
    pub const fn allow() -> Self {
        Self::Allow {
            consumer_project_number: None,
        }
    }

    /// 根据 Check 结果得出结论
    #[must_use]
    pub fn from_check(status: &Status, info: &CheckResponseInfo) -> Self {
        if status.is_ok() {
            Self::Allow {
                consumer_project_number: info.consumer_project_number.clone(),
            }
        } else {
            Self::Deny {
                http_status: status.http_status(),
                status: status.clone(),
            }
        }
    }

    /// 是否放行
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// 过滤链继续回调，最多调用一次
pub type CheckDoneCallback = Box<dyn FnOnce(CheckDecision) + Send + 'static>;

/// Check 状态机
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CheckState {
    /// 尚未调用 `call_check`
    #[default]
    Idle,
    /// 没有匹配的操作配置
    NotConfigured,
    /// 允许无密钥访问且未携带密钥
    CheckSkipped,
    /// 已发起 Check，等待结果
    CheckPending,
    /// Check 已完成
    CheckComplete,
    /// 等待期间请求被销毁
    Aborted,
}

struct CheckSlot {
    state: CheckState,
    callback: Option<CheckDoneCallback>,
    status: Status,
    info: CheckResponseInfo,
}

/// 处理器与 Check 完成回调共享的槽位
///
/// `aborted` 只在持有 `slot` 锁时读写。
pub struct PendingCheck {
    operation_id: String,
    aborted: AtomicBool,
    slot: Mutex<CheckSlot>,
}

impl std::fmt::Debug for PendingCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.lock();
        f.debug_struct("PendingCheck")
            .field("operation_id", &self.operation_id)
            .field("aborted", &self.aborted.load(Ordering::Acquire))
            .field("state", &slot.state)
            .field("status", &slot.status)
            .finish_non_exhaustive()
    }
}

impl PendingCheck {
    fn new(operation_id: String) -> Self {
        Self {
            operation_id,
            aborted: AtomicBool::new(false),
            slot: Mutex::new(CheckSlot {
                state: CheckState::Idle,
                callback: None,
                status: Status::ok(),
                info: CheckResponseInfo::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CheckSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 中止标志是否已设置
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        let _slot = self.lock();
        self.aborted.load(Ordering::Acquire)
    }

    fn set_state(&self, state: CheckState) {
        self.lock().state = state;
    }

    fn begin(&self, callback: CheckDoneCallback) {
        let mut slot = self.lock();
        slot.state = CheckState::CheckPending;
        slot.callback = Some(callback);
    }

    /// Check 完成
    ///
    /// 中止后到达的结果直接丢弃；否则记录结果并在释放锁后调用继续回调。
    pub fn complete(&self, status: Status, info: CheckResponseInfo) {
        let resume = {
            let mut slot = self.lock();
            if self.aborted.load(Ordering::Acquire) {
                debug!(
                    component = "service_control.check",
                    operation_id = %self.operation_id,
                    status = %status,
                    "Check completed after request teardown, result discarded"
                );
                return;
            }
            if slot.state != CheckState::CheckPending {
                return;
            }

            let decision = CheckDecision::from_check(&status, &info);
            slot.status = status;
            slot.info = info;
            slot.state = CheckState::CheckComplete;
            slot.callback.take().map(|callback| (callback, decision))
        };

        if let Some((callback, decision)) = resume {
            if let CheckDecision::Deny { http_status, status } = &decision {
                info!(
                    component = "service_control.check",
                    operation_id = %self.operation_id,
                    http_status = http_status.as_u16(),
                    status = %status,
                    "Request denied by check"
                );
            }
            callback(decision);
        }
    }

    /// 设置中止标志
    pub fn abort(&self) {
        let dropped = {
            let mut slot = self.lock();
            self.aborted.store(true, Ordering::Release);
            if slot.state == CheckState::CheckPending {
                slot.state = CheckState::Aborted;
                debug!(
                    component = "service_control.check",
                    operation_id = %self.operation_id,
                    "Request torn down while check pending"
                );
            }
            slot.callback.take()
        };
        drop(dropped);
    }

    /// 当前状态
    #[must_use]
    pub fn state(&self) -> CheckState {
        self.lock().state
    }

    fn result(&self) -> (Status, CheckResponseInfo) {
        let slot = self.lock();
        (slot.status.clone(), slot.info.clone())
    }
}

/// 过滤链使用的请求处理器接口
pub trait ServiceControlHandler: Send {
    /// 按需发起 Check；`on_done` 最多调用一次，可能同步调用
    fn call_check(&mut self, request: &Parts, on_done: CheckDoneCallback);

    /// 响应完成后发送 Report，不阻塞响应路径
    fn call_report(
        &mut self,
        stream_info: &StreamInfo,
        request_headers: Option<&HeaderMap>,
        response_headers: Option<&HeaderMap>,
        response_trailers: Option<&HeaderMap>,
    );

    /// 请求被销毁
    fn on_destroy(&mut self);
}

/// 处理器工厂
pub trait ServiceControlHandlerFactory: Send + Sync {
    /// 为一个请求创建处理器
    fn create_handler(
        &self,
        request: &Parts,
        stream_info: &StreamInfo,
    ) -> Box<dyn ServiceControlHandler>;
}

/// 生产环境处理器
pub struct ServiceControlHandlerImpl {
    config: Arc<FilterConfig>,
    requirement: Option<Arc<RequirementContext>>,
    operation_id: String,
    method: String,
    path: String,
    frontend_protocol: Option<&'static str>,
    referer: Option<String>,
    client_ip: Option<String>,
    start_time: DateTime<Utc>,
    extractor: ApiKeyExtractor,
    api_key: String,
    reported: bool,
    check: Arc<PendingCheck>,
}

impl std::fmt::Debug for ServiceControlHandlerImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceControlHandlerImpl")
            .field("operation_id", &self.operation_id)
            .field("configured", &self.is_configured())
            .field("api_key", &AuthUtils::sanitize_api_key(&self.api_key))
            .field("check", &self.check)
            .finish_non_exhaustive()
    }
}

impl ServiceControlHandlerImpl {
    /// 创建处理器，记录请求阶段不变的信息
    #[must_use]
    pub fn new(
        request: &Parts,
        stream_info: &StreamInfo,
        config: Arc<FilterConfig>,
        parser: Arc<dyn QueryParser>,
    ) -> Self {
        let requirement = stream_info
            .operation
            .as_deref()
            .and_then(|operation| config.find_requirement(operation));
        let operation_id = Uuid::new_v4().to_string();

        Self {
            requirement,
            method: request.method.as_str().to_string(),
            path: request.uri.path().to_string(),
            frontend_protocol: protocol_name(request.version),
            referer: AuthUtils::extract_referer(&request.headers),
            client_ip: stream_info.downstream_address.clone(),
            start_time: stream_info.start_time,
            extractor: ApiKeyExtractor::new(parser),
            api_key: String::new(),
            reported: false,
            check: Arc::new(PendingCheck::new(operation_id.clone())),
            operation_id,
            config,
        }
    }

    /// 是否匹配到操作配置
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.requirement.is_some()
    }

    /// 提取到的 API 密钥
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// 是否提取到 API 密钥
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// 操作 ID
    #[must_use]
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// 当前 Check 状态
    #[must_use]
    pub fn check_state(&self) -> CheckState {
        self.check.state()
    }

    /// Check 状态；未调用 Check 时为 OK
    #[must_use]
    pub fn check_status(&self) -> Status {
        self.check.result().0
    }

    /// Check 返回的元数据
    #[must_use]
    pub fn check_response_info(&self) -> CheckResponseInfo {
        self.check.result().1
    }

    /// 查询参数是否已经解析
    #[must_use]
    pub const fn params_parsed(&self) -> bool {
        self.extractor.params_parsed()
    }

    /// 与 Check 完成回调共享的槽位
    #[must_use]
    pub fn pending_check(&self) -> Arc<PendingCheck> {
        Arc::clone(&self.check)
    }

    fn fill_operation_info(&self, requirement: &RequirementContext) -> OperationInfo {
        let service = requirement.service_ctx();
        OperationInfo {
            operation_id: self.operation_id.clone(),
            operation_name: requirement.operation_name().to_string(),
            service_name: service.service_name().to_string(),
            service_config_id: service.service_config_id().to_string(),
            producer_project_id: service.producer_project_id().to_string(),
            api_key: self.api_key.clone(),
            client_ip: self.client_ip.clone(),
            referer: self.referer.clone(),
            request_start_time: self.start_time,
        }
    }
}

impl ServiceControlHandler for ServiceControlHandlerImpl {
    fn call_check(&mut self, request: &Parts, on_done: CheckDoneCallback) {
        let Some(requirement) = self.requirement.clone() else {
            self.check.set_state(CheckState::NotConfigured);
            debug!(
                component = "service_control.check",
                path = %self.path,
                "No requirement matched, check not configured"
            );
            on_done(CheckDecision::allow());
            return;
        };

        let locations = if requirement.api_key_locations().is_empty() {
            self.config.default_api_key_locations()
        } else {
            requirement.api_key_locations()
        };
        self.api_key = self.extractor.extract(request, locations);

        if !self.has_api_key() && requirement.allow_without_api_key() {
            self.check.set_state(CheckState::CheckSkipped);
            debug!(
                component = "service_control.check",
                operation = requirement.operation_name(),
                "No API key and allowed without one, check skipped"
            );
            on_done(CheckDecision::allow());
            return;
        }

        let request_info = CheckRequestInfo {
            operation: self.fill_operation_info(&requirement),
            current_time: Utc::now(),
        };
        debug!(
            component = "service_control.check",
            operation_id = %self.operation_id,
            operation = requirement.operation_name(),
            api_key_preview = %AuthUtils::sanitize_api_key(&self.api_key),
            "Sending check"
        );

        self.check.begin(on_done);
        let pending = Arc::clone(&self.check);
        self.config.call().call_check(
            request_info,
            Box::new(move |status, info| pending.complete(status, info)),
        );
    }

    fn call_report(
        &mut self,
        stream_info: &StreamInfo,
        request_headers: Option<&HeaderMap>,
        response_headers: Option<&HeaderMap>,
        response_trailers: Option<&HeaderMap>,
    ) {
        let Some(requirement) = self.requirement.clone() else {
            return;
        };
        if self.reported {
            return;
        }
        self.reported = true;

        let service = requirement.service_ctx();
        let (check_status, check_response_info) = self.check.result();
        let mut info = ReportRequestInfo::new(self.fill_operation_info(&requirement));

        info.check_status = check_status;
        info.check_response_info = check_response_info;
        info.url.clone_from(&self.path);
        info.method.clone_from(&self.method);
        info.api_name = requirement.api_name().to_string();
        info.api_version = requirement.api_version().to_string();
        info.api_method = requirement.operation_name().to_string();
        info.log_message = format!("Method: {}", requirement.operation_name());

        info.response_code = stream_info.response_code.unwrap_or_default();
        info.request_size = stream_info.bytes_received;
        info.response_size = stream_info.bytes_sent;
        info.request_headers_size = request_headers.map_or(0, AuthUtils::header_byte_size);
        info.response_headers_size = response_headers.map_or(0, AuthUtils::header_byte_size)
            + response_trailers.map_or(0, AuthUtils::header_byte_size);
        fill_logged_header(
            request_headers,
            service.log_request_headers(),
            &mut info.request_headers,
        );
        fill_logged_header(
            response_headers,
            service.log_response_headers(),
            &mut info.response_headers,
        );

        info.latency = stream_info.duration;
        info.frontend_protocol = stream_info
            .protocol
            .and_then(protocol_name)
            .or(self.frontend_protocol)
            .map(str::to_string);
        info.backend_protocol = service.backend_protocol();
        fill_gcp_info(self.config.gcp_attributes(), &mut info);
        info.end_time = Utc::now();

        debug!(
            component = "service_control.report",
            operation_id = %self.operation_id,
            response_code = info.response_code,
            check_status = %info.check_status,
            "Sending report"
        );
        self.config.call().call_report(info);
    }

    fn on_destroy(&mut self) {
        self.check.abort();
    }
}

impl Drop for ServiceControlHandlerImpl {
    fn drop(&mut self) {
        self.check.abort();
    }
}

/// 生产环境处理器工厂
pub struct ServiceControlHandlerFactoryImpl {
    config: Arc<FilterConfig>,
    parser: Arc<dyn QueryParser>,
}

impl std::fmt::Debug for ServiceControlHandlerFactoryImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceControlHandlerFactoryImpl")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ServiceControlHandlerFactoryImpl {
    /// 使用默认查询解析器创建
    #[must_use]
    pub fn new(config: Arc<FilterConfig>) -> Self {
        Self {
            config,
            parser: Arc::new(UrlQueryParser),
        }
    }

    /// 替换查询解析器
    #[must_use]
    pub fn with_query_parser(mut self, parser: Arc<dyn QueryParser>) -> Self {
        self.parser = parser;
        self
    }

    /// 过滤器配置
    #[must_use]
    pub const fn config(&self) -> &Arc<FilterConfig> {
        &self.config
    }
}

impl ServiceControlHandlerFactory for ServiceControlHandlerFactoryImpl {
    fn create_handler(
        &self,
        request: &Parts,
        stream_info: &StreamInfo,
    ) -> Box<dyn ServiceControlHandler> {
        Box::new(ServiceControlHandlerImpl::new(
            request,
            stream_info,
            Arc::clone(&self.config),
            Arc::clone(&self.parser),
        ))
    }
}
