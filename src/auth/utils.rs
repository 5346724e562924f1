//! # 认证工具函数
//!
//! 密钥提取与请求信息构建共享的基础功能

use http::HeaderMap;
use std::collections::HashMap;

/// 认证工具类
pub struct AuthUtils;

impl AuthUtils {
    /// 净化API密钥用于日志记录
    ///
    /// # 返回
    /// 脱敏后的API密钥字符串，格式: "AIza***2345"
    #[must_use]
    pub fn sanitize_api_key(api_key: &str) -> String {
        let chars: Vec<char> = api_key.chars().collect();
        if chars.len() > 10 {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{head}***{tail}")
        } else {
            "***".to_string()
        }
    }

    /// `解析URL查询参数为HashMap`
    ///
    /// 同名参数保留第一次出现的值；没有 `=` 的参数值为空字符串。
    ///
    /// # 参数
    /// - `query_string`: URL查询字符串，不包含'?'
    #[must_use]
    pub fn parse_query_string(query_string: &str) -> HashMap<String, String> {
        let mut params = HashMap::new();

        for param in query_string.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = param.split_once('=').unwrap_or((param, ""));
            // URL解码
            let decoded_key = urlencoding::decode(key).unwrap_or_else(|_| key.into());
            let decoded_value = urlencoding::decode(value).unwrap_or_else(|_| value.into());
            params
                .entry(decoded_key.into_owned())
                .or_insert_with(|| decoded_value.into_owned());
        }

        params
    }

    /// `提取Referer字符串`
    ///
    /// 支持 "referer" 和 "referrer" 两种拼写
    #[must_use]
    pub fn extract_referer(headers: &HeaderMap) -> Option<String> {
        headers
            .get("referer")
            .or_else(|| headers.get("referrer")) // 支持两种拼写
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// `计算请求头/响应头的字节大小`
    ///
    /// 每个头部按名称长度加值长度计算
    #[must_use]
    pub fn header_byte_size(headers: &HeaderMap) -> u64 {
        headers
            .iter()
            .map(|(name, value)| (name.as_str().len() + value.as_bytes().len()) as u64)
            .sum()
    }
}
