//! # 流信息
//!
//! 代理在请求生命周期中维护的连接与计量数据，Report 阶段读取

use chrono::{DateTime, Utc};
use http::Version;
use std::time::Duration;

/// 单个请求的流信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// 请求开始时间
    pub start_time: DateTime<Utc>,
    /// 路由匹配得到的操作名称；未匹配时为空
    pub operation: Option<String>,
    /// 下游客户端地址（不含端口）
    pub downstream_address: Option<String>,
    /// 前端协议
    pub protocol: Option<Version>,
    /// 已接收的请求体字节数
    pub bytes_received: u64,
    /// 已发送的响应体字节数
    pub bytes_sent: u64,
    /// 响应状态码
    pub response_code: Option<u16>,
    /// 请求总耗时
    pub duration: Option<Duration>,
}

impl Default for StreamInfo {
    fn default() -> Self {
        Self {
            start_time: Utc::now(),
            operation: None,
            downstream_address: None,
            protocol: None,
            bytes_received: 0,
            bytes_sent: 0,
            response_code: None,
            duration: None,
        }
    }
}

impl StreamInfo {
    /// 以匹配到的操作创建
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Self::default()
        }
    }

    /// 设置客户端地址
    #[must_use]
    pub fn with_downstream_address(mut self, address: impl Into<String>) -> Self {
        self.downstream_address = Some(address.into());
        self
    }

    /// 请求结束时记录响应数据
    pub fn finish(&mut self, response_code: u16, bytes_sent: u64) {
        self.response_code = Some(response_code);
        self.bytes_sent = bytes_sent;
        let elapsed = Utc::now() - self.start_time;
        self.duration = elapsed.to_std().ok();
    }
}
