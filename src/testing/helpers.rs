//! # 测试辅助函数
//!
//! 提供通用的测试工具和辅助函数

use http::request::Parts;
use std::sync::Once;
use tracing::Level;

static INIT: Once = Once::new();

/// 初始化测试日志
pub fn init_test_env() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// 构建请求头部分
///
/// # Panics
/// URI 或头部无效时
#[must_use]
pub fn request(uri: &str, headers: &[(&str, &str)]) -> Parts {
    let mut builder = http::Request::builder().uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(()).expect("构建测试请求失败").into_parts().0
}
