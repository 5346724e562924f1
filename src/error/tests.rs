//! # 错误处理测试

use crate::error::{Context, ServiceControlError};
use std::error::Error;

#[test]
fn test_config_error_creation() {
    let err = ServiceControlError::config("缺少服务名");
    assert!(matches!(err, ServiceControlError::Config { .. }));
    assert_eq!(err.to_string(), "配置错误: 缺少服务名");
}

#[test]
fn test_config_error_with_source() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "文件不存在");
    let err = ServiceControlError::config_with_source("配置文件加载失败", io_err);

    assert!(err.to_string().contains("配置错误: 配置文件加载失败"));
    assert!(err.source().is_some());
}

#[test]
fn test_transport_status_is_kept() {
    let err = ServiceControlError::transport_status("check rejected", 503);
    match err {
        ServiceControlError::Transport { status, .. } => assert_eq!(status, Some(503)),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_context_wraps_and_preserves_kind() {
    let result: Result<(), ServiceControlError> =
        Err(ServiceControlError::transport("connection reset"));

    let err = result.context("calling check").unwrap_err();
    match &err {
        ServiceControlError::Context { source, .. } => {
            assert!(matches!(**source, ServiceControlError::Transport { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.to_string(), "calling check: 传输错误: connection reset");
}

#[test]
fn test_auto_conversion_from_io_error() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "文件不存在");
    let err: ServiceControlError = io_err.into();
    assert!(matches!(err, ServiceControlError::Io { .. }));
}

#[test]
fn test_auto_conversion_from_toml_error() {
    let toml_err = toml::from_str::<toml::Table>("not = [valid").unwrap_err();
    let err: ServiceControlError = toml_err.into();
    assert!(matches!(err, ServiceControlError::Config { .. }));
}
