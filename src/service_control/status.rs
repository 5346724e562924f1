//! # Check 调用状态
//!
//! google.rpc 规范状态码及其到 HTTP 状态码的映射

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 规范状态码
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Code {
    /// 成功
    #[default]
    Ok,
    /// 调用方取消
    Cancelled,
    /// 未知错误
    Unknown,
    /// 参数无效（例如 API 密钥无效）
    InvalidArgument,
    /// 超时
    DeadlineExceeded,
    /// 资源不存在
    NotFound,
    /// 资源已存在
    AlreadyExists,
    /// 权限不足
    PermissionDenied,
    /// 配额耗尽
    ResourceExhausted,
    /// 前置条件不满足
    FailedPrecondition,
    /// 操作中止
    Aborted,
    /// 超出范围
    OutOfRange,
    /// 未实现
    Unimplemented,
    /// 内部错误
    Internal,
    /// 服务不可用
    Unavailable,
    /// 数据丢失
    DataLoss,
    /// 未认证
    Unauthenticated,
}

impl Code {
    /// 映射到 HTTP 状态码
    #[must_use]
    pub fn http_status(self) -> StatusCode {
        match self {
            Self::Ok => StatusCode::OK,
            // 499 Client Closed Request
            Self::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            Self::Unknown | Self::Internal | Self::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidArgument | Self::FailedPrecondition | Self::OutOfRange => {
                StatusCode::BAD_REQUEST
            }
            Self::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::AlreadyExists | Self::Aborted => StatusCode::CONFLICT,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            Self::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }

    /// 规范名称
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Aborted => "ABORTED",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
            Self::DataLoss => "DATA_LOSS",
            Self::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 调用状态（状态码 + 描述）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    /// 成功状态
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            code: Code::Ok,
            message: String::new(),
        }
    }

    /// 创建状态
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// 是否成功
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    /// 状态码
    #[must_use]
    pub const fn code(&self) -> Code {
        self.code
    }

    /// 描述
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 对应的 HTTP 状态码
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Code::Ok, 200)]
    #[case(Code::Cancelled, 499)]
    #[case(Code::Unknown, 500)]
    #[case(Code::InvalidArgument, 400)]
    #[case(Code::DeadlineExceeded, 504)]
    #[case(Code::NotFound, 404)]
    #[case(Code::AlreadyExists, 409)]
    #[case(Code::PermissionDenied, 403)]
    #[case(Code::ResourceExhausted, 429)]
    #[case(Code::FailedPrecondition, 400)]
    #[case(Code::Aborted, 409)]
    #[case(Code::OutOfRange, 400)]
    #[case(Code::Unimplemented, 501)]
    #[case(Code::Internal, 500)]
    #[case(Code::Unavailable, 503)]
    #[case(Code::DataLoss, 500)]
    #[case(Code::Unauthenticated, 401)]
    fn test_http_mapping(#[case] code: Code, #[case] expected: u16) {
        assert_eq!(code.http_status().as_u16(), expected);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::ok().to_string(), "OK");
        assert_eq!(
            Status::new(Code::InvalidArgument, "API key not valid").to_string(),
            "INVALID_ARGUMENT: API key not valid"
        );
    }

    #[test]
    fn test_default_is_ok() {
        assert!(Status::default().is_ok());
        assert!(!Status::new(Code::Unavailable, "").is_ok());
    }
}
