//! # 错误类型定义

use thiserror::Error;

/// 过滤器主要错误类型
#[derive(Debug, Error)]
pub enum ServiceControlError {
    /// 配置相关错误
    #[error("配置错误: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 与 Service Control 通信的网络错误
    #[error("传输错误: {message}")]
    Transport {
        message: String,
        /// 对端返回的 HTTP 状态码
        status: Option<u16>,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 序列化/反序列化错误
    #[error("序列化错误: {message}")]
    Serialization {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// IO相关错误
    #[error("IO错误: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// 带上下文的错误
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ServiceControlError>,
    },
}

impl ServiceControlError {
    /// 创建配置错误
    pub fn config<T: Into<String>>(message: T) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带来源的配置错误
    pub fn config_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建传输错误
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// 创建带 HTTP 状态码的传输错误
    pub fn transport_status<T: Into<String>>(message: T, status: u16) -> Self {
        Self::Transport {
            message: message.into(),
            status: Some(status),
            source: None,
        }
    }

    /// 创建带来源的传输错误
    pub fn transport_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
            source: Some(source.into()),
        }
    }

    /// 创建序列化错误
    pub fn serialization<T: Into<String>, E: Into<anyhow::Error>>(message: T, source: E) -> Self {
        Self::Serialization {
            message: message.into(),
            source: source.into(),
        }
    }
}

impl From<std::io::Error> for ServiceControlError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<toml::de::Error> for ServiceControlError {
    fn from(err: toml::de::Error) -> Self {
        Self::config_with_source("TOML解析失败", err)
    }
}

impl From<serde_json::Error> for ServiceControlError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("JSON处理失败", err)
    }
}

impl From<reqwest::Error> for ServiceControlError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::transport_with_source("request to service control timed out", err);
        }
        match err.status() {
            Some(status) => Self::Transport {
                message: format!("service control returned {status}"),
                status: Some(status.as_u16()),
                source: Some(err.into()),
            },
            None => Self::transport_with_source("service control request failed", err),
        }
    }
}
