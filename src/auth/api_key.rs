//! # API 密钥提取
//!
//! 按配置的位置顺序（查询参数 / 请求头 / Cookie）从入站请求中提取调用方的 API 密钥。
//! 查询参数在每个请求内最多解析一次；Cookie 每次查找都重新扫描原始头部。

use http::header::COOKIE;
use http::request::Parts;
use std::collections::HashMap;
use std::sync::Arc;

use super::utils::AuthUtils;
use crate::config::ApiKeyLocation;

/// 查询字符串解析器
#[cfg_attr(test, mockall::automock)]
pub trait QueryParser: Send + Sync {
    /// 将不含 `?` 的查询字符串解析为参数表
    fn parse(&self, query: &str) -> HashMap<String, String>;
}

/// 默认解析器：`&` 分隔、百分号解码、同名保留第一个
#[derive(Debug, Default, Clone, Copy)]
pub struct UrlQueryParser;

impl QueryParser for UrlQueryParser {
    fn parse(&self, query: &str) -> HashMap<String, String> {
        AuthUtils::parse_query_string(query)
    }
}

/// 单个请求的 API 密钥提取器
///
/// 持有惰性计算的查询参数缓存，同一请求的所有查询位置共享。
pub struct ApiKeyExtractor {
    parser: Arc<dyn QueryParser>,
    parsed_params: Option<HashMap<String, String>>,
}

impl std::fmt::Debug for ApiKeyExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyExtractor")
            .field("params_parsed", &self.parsed_params.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for ApiKeyExtractor {
    fn default() -> Self {
        Self::new(Arc::new(UrlQueryParser))
    }
}

impl ApiKeyExtractor {
    /// 使用指定解析器创建提取器
    #[must_use]
    pub fn new(parser: Arc<dyn QueryParser>) -> Self {
        Self {
            parser,
            parsed_params: None,
        }
    }

    /// 查询参数是否已经解析过
    #[must_use]
    pub const fn params_parsed(&self) -> bool {
        self.parsed_params.is_some()
    }

    /// 按顺序尝试每个位置，返回第一个非空密钥；都不命中时返回空字符串
    pub fn extract(&mut self, request: &Parts, locations: &[ApiKeyLocation]) -> String {
        for location in locations {
            let value = match location {
                ApiKeyLocation::Query(name) => self.from_query(request, name),
                ApiKeyLocation::Header(name) => from_header(request, name),
                ApiKeyLocation::Cookie(name) => from_cookie(request, name),
            };
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                tracing::debug!(
                    component = "service_control.api_key",
                    location = ?location,
                    api_key_preview = %AuthUtils::sanitize_api_key(&value),
                    "API key extracted"
                );
                return value;
            }
        }
        String::new()
    }

    /// 从查询参数中提取
    pub fn from_query(&mut self, request: &Parts, name: &str) -> Option<String> {
        let query = request.uri.query()?;
        let parser = &self.parser;
        self.parsed_params
            .get_or_insert_with(|| parser.parse(query))
            .get(name)
            .cloned()
    }
}

/// 从请求头中提取（名称大小写不敏感）
#[must_use]
pub fn from_header(request: &Parts, name: &str) -> Option<String> {
    request
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// 从 Cookie 头中提取
///
/// 依次扫描所有 `Cookie` 头中以 `;` 分隔的 `name=value`，返回第一个名称匹配项。
#[must_use]
pub fn from_cookie(request: &Parts, name: &str) -> Option<String> {
    request
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn request(uri: &str, headers: &[(&str, &str)]) -> Parts {
        let mut builder = http::Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn query(name: &str) -> ApiKeyLocation {
        ApiKeyLocation::Query(name.to_string())
    }

    fn header(name: &str) -> ApiKeyLocation {
        ApiKeyLocation::Header(name.to_string())
    }

    fn cookie(name: &str) -> ApiKeyLocation {
        ApiKeyLocation::Cookie(name.to_string())
    }

    #[rstest]
    #[case::query_first(vec![query("key"), header("x-api-key"), cookie("k")], "from-query")]
    #[case::header_first(vec![header("x-api-key"), query("key"), cookie("k")], "from-header")]
    #[case::cookie_first(vec![cookie("k"), query("key"), header("x-api-key")], "from-cookie")]
    #[case::skips_missing(vec![query("missing"), header("x-missing"), cookie("k")], "from-cookie")]
    #[case::skips_empty(vec![query("empty"), header("x-api-key")], "from-header")]
    #[case::none_match(vec![query("missing"), cookie("nope")], "")]
    #[case::no_locations(vec![], "")]
    fn test_first_non_empty_location_wins(
        #[case] locations: Vec<ApiKeyLocation>,
        #[case] expected: &str,
    ) {
        let parts = request(
            "/v1/shelves?key=from-query&empty=",
            &[("x-api-key", "from-header"), ("cookie", "k=from-cookie")],
        );
        let mut extractor = ApiKeyExtractor::default();
        assert_eq!(extractor.extract(&parts, &locations), expected);
    }

    #[rstest]
    #[case("b", Some("2"))]
    #[case("a", Some("1"))]
    #[case("c", None)]
    fn test_cookie_lookup(#[case] name: &str, #[case] expected: Option<&str>) {
        let parts = request("/", &[("cookie", "a=1; b=2")]);
        assert_eq!(from_cookie(&parts, name).as_deref(), expected);
    }

    #[test]
    fn test_cookie_spans_multiple_headers_and_first_match_wins() {
        let parts = request("/", &[("cookie", "x=1"), ("cookie", " key = v1 ;key=v2")]);
        assert_eq!(from_cookie(&parts, "key").as_deref(), Some("v1"));
        assert_eq!(from_cookie(&parts, "x").as_deref(), Some("1"));
    }

    #[test]
    fn test_cookie_without_header() {
        let parts = request("/", &[]);
        assert_eq!(from_cookie(&parts, "key"), None);
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let parts = request("/", &[("X-API-Key", "abc")]);
        assert_eq!(from_header(&parts, "x-api-key").as_deref(), Some("abc"));
        assert_eq!(from_header(&parts, "X-Api-Key").as_deref(), Some("abc"));
        assert_eq!(from_header(&parts, "x-other"), None);
    }

    #[test]
    fn test_query_is_parsed_once_per_request() {
        let mut parser = MockQueryParser::new();
        parser.expect_parse().times(1).returning(|q| {
            assert_eq!(q, "api_key=k2&alt=json");
            HashMap::from([
                ("api_key".to_string(), "k2".to_string()),
                ("alt".to_string(), "json".to_string()),
            ])
        });

        let parts = request("/v1/shelves?api_key=k2&alt=json", &[]);
        let mut extractor = ApiKeyExtractor::new(Arc::new(parser));
        assert!(!extractor.params_parsed());

        let key = extractor.extract(&parts, &[query("key"), query("token"), query("api_key")]);
        assert_eq!(key, "k2");
        assert!(extractor.params_parsed());

        // 再次提取仍然复用缓存
        assert_eq!(extractor.from_query(&parts, "alt").as_deref(), Some("json"));
    }

    #[test]
    fn test_query_not_parsed_without_query_location() {
        let mut parser = MockQueryParser::new();
        parser.expect_parse().times(0);

        let parts = request("/v1/shelves?key=abc", &[("x-api-key", "h")]);
        let mut extractor = ApiKeyExtractor::new(Arc::new(parser));
        assert_eq!(extractor.extract(&parts, &[header("x-api-key")]), "h");
        assert!(!extractor.params_parsed());
    }

    #[test]
    fn test_query_missing_from_uri() {
        let parts = request("/v1/shelves", &[]);
        let mut extractor = ApiKeyExtractor::default();
        assert_eq!(extractor.from_query(&parts, "key"), None);
        assert!(!extractor.params_parsed());
    }

    #[test]
    fn test_query_value_is_decoded() {
        let parts = request("/v1/shelves?key=a%2Fb%3D", &[]);
        let mut extractor = ApiKeyExtractor::default();
        assert_eq!(extractor.extract(&parts, &[query("key")]), "a/b=");
    }
}
