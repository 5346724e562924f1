//! # 认证模块
//!
//! 入站 API 密钥提取及共享工具函数

pub mod api_key;
pub mod utils;

pub use api_key::{ApiKeyExtractor, QueryParser, UrlQueryParser};
pub use utils::AuthUtils;
