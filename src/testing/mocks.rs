//! # 测试替身
//!
//! 记录请求、可手动触发完成的调用实现，以及记录继续回调的工具

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::auth::{AuthUtils, QueryParser};
use crate::proxy::{CheckDecision, CheckDoneCallback};
use crate::service_control::{
    CheckDoneFunc, CheckRequestInfo, CheckResponseInfo, ReportRequestInfo, ServiceControlCall,
    Status,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 记录所有请求的调用实现
///
/// 默认把 Check 完成回调保存下来，由测试通过 [`Self::complete_check`] 触发；
/// 使用 [`Self::responding`] 创建时在 `call_check` 内同步完成。
#[derive(Default)]
pub struct FakeServiceControlCall {
    response: Option<(Status, CheckResponseInfo)>,
    checks: Mutex<Vec<CheckRequestInfo>>,
    completions: Mutex<VecDeque<CheckDoneFunc>>,
    reports: Mutex<Vec<ReportRequestInfo>>,
}

impl std::fmt::Debug for FakeServiceControlCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeServiceControlCall")
            .field("checks", &lock(&self.checks).len())
            .field("pending", &lock(&self.completions).len())
            .field("reports", &lock(&self.reports).len())
            .finish_non_exhaustive()
    }
}

impl FakeServiceControlCall {
    /// 保存完成回调，等待手动触发
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次 Check 都同步返回给定结果
    #[must_use]
    pub fn responding(status: Status, info: CheckResponseInfo) -> Self {
        Self {
            response: Some((status, info)),
            ..Self::default()
        }
    }

    /// 已收到的 Check 请求
    #[must_use]
    pub fn check_requests(&self) -> Vec<CheckRequestInfo> {
        lock(&self.checks).clone()
    }

    /// 已收到的 Report 请求
    #[must_use]
    pub fn report_requests(&self) -> Vec<ReportRequestInfo> {
        lock(&self.reports).clone()
    }

    /// 尚未触发的完成回调数量
    #[must_use]
    pub fn pending_checks(&self) -> usize {
        lock(&self.completions).len()
    }

    /// 触发最早保存的完成回调；没有待完成的 Check 时返回 `false`
    pub fn complete_check(&self, status: Status, info: CheckResponseInfo) -> bool {
        let next = lock(&self.completions).pop_front();
        next.map_or(false, |on_done| {
            on_done(status, info);
            true
        })
    }
}

impl ServiceControlCall for FakeServiceControlCall {
    fn call_check(&self, request: CheckRequestInfo, on_done: CheckDoneFunc) {
        lock(&self.checks).push(request);
        match &self.response {
            Some((status, info)) => on_done(status.clone(), info.clone()),
            None => lock(&self.completions).push_back(on_done),
        }
    }

    fn call_report(&self, request: ReportRequestInfo) {
        lock(&self.reports).push(request);
    }
}

/// 记录继续回调的调用次数和结论
#[derive(Debug, Clone, Default)]
pub struct RecordingCallback {
    decisions: Arc<Mutex<Vec<CheckDecision>>>,
}

impl RecordingCallback {
    /// 创建记录器
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 生成一个写入本记录器的继续回调
    #[must_use]
    pub fn callback(&self) -> CheckDoneCallback {
        let decisions = Arc::clone(&self.decisions);
        Box::new(move |decision| lock(&decisions).push(decision))
    }

    /// 回调次数
    #[must_use]
    pub fn calls(&self) -> usize {
        lock(&self.decisions).len()
    }

    /// 全部结论
    #[must_use]
    pub fn decisions(&self) -> Vec<CheckDecision> {
        lock(&self.decisions).clone()
    }
}

/// 统计解析次数的查询解析器
#[derive(Debug, Default)]
pub struct CountingQueryParser {
    calls: AtomicUsize,
}

impl CountingQueryParser {
    /// 解析次数
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl QueryParser for CountingQueryParser {
    fn parse(&self, query: &str) -> HashMap<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        AuthUtils::parse_query_string(query)
    }
}
