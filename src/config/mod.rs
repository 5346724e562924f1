//! # 配置管理模块
//!
//! 处理过滤器配置加载、验证和运行时查找

mod context;
mod filter_config;

pub use context::{FilterConfig, RequirementContext, ServiceContext};
pub use filter_config::{
    ApiKeyLocation, BackendProtocol, ComputePlatform, DEFAULT_SERVICE_CONTROL_URI, GcpAttributes,
    RequirementSpec, ServiceControlConfig, ServiceSpec, default_api_key_locations,
};

use std::env;
use std::path::{Path, PathBuf};

/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "SERVICE_CONTROL_CONFIG_PATH";

/// 加载配置文件
///
/// 路径优先级：显式参数 > `SERVICE_CONTROL_CONFIG_PATH` > `config/service_control.{RUST_ENV}.toml`
pub fn load_config(path: Option<&Path>) -> crate::error::Result<ServiceControlConfig> {
    let config_file = path.map_or_else(default_config_path, Path::to_path_buf);
    tracing::info!(
        component = "service_control.config",
        path = %config_file.display(),
        "Loading service control config"
    );
    ServiceControlConfig::from_file(&config_file)
}

fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
    PathBuf::from(format!("config/service_control.{env}.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[services]]\nservice_name = \"echo.example.com\"").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.services[0].service_name, "echo.example.com");
    }

    #[test]
    fn test_load_config_reports_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "services = \"not a list\"").unwrap();

        let err = load_config(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("加载配置文件失败"));
    }

    #[test]
    fn test_shipped_dev_config_is_valid() {
        let config = load_config(Some(Path::new("config/service_control.dev.toml"))).unwrap();
        assert_eq!(config.requirements.len(), 2);
        assert!(config.requirements[1].allow_without_api_key);
    }

    #[test]
    fn test_default_path_uses_rust_env_layout() {
        let path = default_config_path();
        if env::var(CONFIG_PATH_ENV).is_err() {
            assert!(path.starts_with("config"));
            assert_eq!(path.extension().and_then(|e| e.to_str()), Some("toml"));
        }
    }
}
