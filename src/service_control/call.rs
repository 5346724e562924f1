//! # Check / Report 调用实现
//!
//! 以回调方式暴露给请求处理器：Check 结果通过一次性闭包返回，Report 不等待结果。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::status::{Code, Status};
use super::transport::{HttpTransport, ServiceControlTransport};
use super::types::{CheckRequestInfo, CheckResponseInfo, ReportRequestInfo};
use crate::config::ServiceControlConfig;
use crate::error::Result;

/// Check 完成回调，最多调用一次
pub type CheckDoneFunc = Box<dyn FnOnce(Status, CheckResponseInfo) + Send + 'static>;

/// 请求处理器使用的远端调用接口
pub trait ServiceControlCall: Send + Sync {
    /// 异步发起 Check，完成后调用 `on_done`
    fn call_check(&self, request: CheckRequestInfo, on_done: CheckDoneFunc);

    /// 异步发起 Report，不返回结果
    fn call_report(&self, request: ReportRequestInfo);
}

/// 本地调用计数
#[derive(Debug, Default)]
pub struct CallStats {
    checks_sent: AtomicU64,
    check_failures: AtomicU64,
    reports_sent: AtomicU64,
    report_failures: AtomicU64,
}

/// 计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStatsSnapshot {
    /// 已发起的 Check
    pub checks_sent: u64,
    /// 传输失败的 Check
    pub check_failures: u64,
    /// 已发起的 Report
    pub reports_sent: u64,
    /// 失败的 Report
    pub report_failures: u64,
}

impl CallStats {
    /// 读取当前计数
    #[must_use]
    pub fn snapshot(&self) -> CallStatsSnapshot {
        CallStatsSnapshot {
            checks_sent: self.checks_sent.load(Ordering::Relaxed),
            check_failures: self.check_failures.load(Ordering::Relaxed),
            reports_sent: self.reports_sent.load(Ordering::Relaxed),
            report_failures: self.report_failures.load(Ordering::Relaxed),
        }
    }
}

/// 在 tokio 运行时上执行远端调用的实现
pub struct ServiceControlCallImpl {
    transport: Arc<dyn ServiceControlTransport>,
    runtime: Handle,
    stats: Arc<CallStats>,
    network_fail_open: bool,
}

impl std::fmt::Debug for ServiceControlCallImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceControlCallImpl")
            .field("stats", &self.stats.snapshot())
            .field("network_fail_open", &self.network_fail_open)
            .finish_non_exhaustive()
    }
}

impl ServiceControlCallImpl {
    /// 使用指定传输创建
    #[must_use]
    pub fn new(transport: Arc<dyn ServiceControlTransport>, runtime: Handle) -> Self {
        Self {
            transport,
            runtime,
            stats: Arc::new(CallStats::default()),
            network_fail_open: false,
        }
    }

    /// 根据配置创建 HTTP 调用实现
    pub fn from_config(config: &ServiceControlConfig, runtime: Handle) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config)?);
        Ok(Self::new(transport, runtime).with_network_fail_open(config.network_fail_open))
    }

    /// 设置 Check 网络失败时是否放行
    #[must_use]
    pub const fn with_network_fail_open(mut self, fail_open: bool) -> Self {
        self.network_fail_open = fail_open;
        self
    }

    /// 本地调用计数
    #[must_use]
    pub fn stats(&self) -> Arc<CallStats> {
        Arc::clone(&self.stats)
    }
}

impl ServiceControlCall for ServiceControlCallImpl {
    fn call_check(&self, request: CheckRequestInfo, on_done: CheckDoneFunc) {
        let transport = Arc::clone(&self.transport);
        let stats = Arc::clone(&self.stats);
        let fail_open = self.network_fail_open;
        stats.checks_sent.fetch_add(1, Ordering::Relaxed);

        self.runtime.spawn(async move {
            let operation_id = request.operation.operation_id.clone();
            match transport.check(request).await {
                Ok(response) => {
                    debug!(
                        component = "service_control.check",
                        operation_id = %operation_id,
                        status = %response.status,
                        "Check call completed"
                    );
                    on_done(response.status, response.info);
                }
                Err(e) => {
                    stats.check_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        component = "service_control.check",
                        operation_id = %operation_id,
                        error = %e,
                        fail_open,
                        "Check call failed"
                    );
                    let status = if fail_open {
                        Status::ok()
                    } else {
                        Status::new(Code::Unavailable, format!("Check call failed: {e}"))
                    };
                    on_done(status, CheckResponseInfo::default());
                }
            }
        });
    }

    fn call_report(&self, request: ReportRequestInfo) {
        let transport = Arc::clone(&self.transport);
        let stats = Arc::clone(&self.stats);
        stats.reports_sent.fetch_add(1, Ordering::Relaxed);

        self.runtime.spawn(async move {
            let operation_id = request.operation.operation_id.clone();
            if let Err(e) = transport.report(request).await {
                stats.report_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    component = "service_control.report",
                    operation_id = %operation_id,
                    error = %e,
                    "Report call failed"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceControlError;
    use crate::service_control::transport::MockServiceControlTransport;
    use crate::service_control::types::CheckResponse;
    use crate::testing::{check_request_info, operation_info};
    use tokio::sync::oneshot;

    fn call_with(transport: MockServiceControlTransport) -> ServiceControlCallImpl {
        ServiceControlCallImpl::new(Arc::new(transport), Handle::current())
    }

    async fn run_check(call: &ServiceControlCallImpl) -> (Status, CheckResponseInfo) {
        let (tx, rx) = oneshot::channel();
        call.call_check(
            check_request_info(),
            Box::new(move |status, info| {
                let _ = tx.send((status, info));
            }),
        );
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_check_success_passes_through() {
        let mut transport = MockServiceControlTransport::new();
        transport.expect_check().times(1).returning(|_| {
            Ok(CheckResponse {
                status: Status::new(Code::PermissionDenied, "SERVICE_NOT_ACTIVATED"),
                info: CheckResponseInfo::default(),
            })
        });

        let call = call_with(transport);
        let (status, _) = run_check(&call).await;
        assert_eq!(status.code(), Code::PermissionDenied);
        assert_eq!(call.stats().snapshot().checks_sent, 1);
        assert_eq!(call.stats().snapshot().check_failures, 0);
    }

    #[tokio::test]
    async fn test_check_transport_error_fails_closed() {
        let mut transport = MockServiceControlTransport::new();
        transport
            .expect_check()
            .returning(|_| Err(ServiceControlError::transport("connection refused")));

        let call = call_with(transport);
        let (status, info) = run_check(&call).await;
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(status.http_status().as_u16(), 503);
        assert_eq!(info, CheckResponseInfo::default());
        assert_eq!(call.stats().snapshot().check_failures, 1);
    }

    #[tokio::test]
    async fn test_check_transport_error_fail_open() {
        let mut transport = MockServiceControlTransport::new();
        transport
            .expect_check()
            .returning(|_| Err(ServiceControlError::transport("connection refused")));

        let call = call_with(transport).with_network_fail_open(true);
        let (status, _) = run_check(&call).await;
        assert!(status.is_ok());
    }

    #[tokio::test]
    async fn test_report_failure_is_only_counted() {
        let (tx, rx) = oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));
        let mut transport = MockServiceControlTransport::new();
        transport.expect_report().times(1).returning(move |request| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(request.operation.operation_id);
            }
            Err(ServiceControlError::transport_status("backend error", 500))
        });

        let call = call_with(transport);
        let stats = call.stats();
        call.call_report(ReportRequestInfo::new(operation_info()));

        let operation_id = rx.await.unwrap();
        assert_eq!(operation_id, operation_info().operation_id);

        // 计数在传输返回之后更新
        for _ in 0..100 {
            if stats.snapshot().report_failures == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.reports_sent, 1);
        assert_eq!(snapshot.report_failures, 1);
    }
}
