//! # 请求信息构建
//!
//! 从请求头、流信息和匹配到的配置中填充 Report 字段

use http::{HeaderMap, Version};

use super::types::ReportRequestInfo;
use crate::config::{ComputePlatform, GcpAttributes};

/// 把配置的头部按顺序写入日志字段
///
/// 每个存在的头写成 `name=value;`，不存在的头直接跳过。
pub fn fill_logged_header(headers: Option<&HeaderMap>, log_headers: &[String], out: &mut String) {
    let Some(headers) = headers else {
        return;
    };

    for name in log_headers {
        let Some(value) = headers.get(name.as_str()) else {
            continue;
        };
        out.push_str(name);
        out.push('=');
        out.push_str(&String::from_utf8_lossy(value.as_bytes()));
        out.push(';');
    }
}

/// 填充平台元数据
pub fn fill_gcp_info(attributes: Option<&GcpAttributes>, info: &mut ReportRequestInfo) {
    let Some(attributes) = attributes else {
        info.compute_platform = ComputePlatform::Unknown;
        return;
    };

    if let Some(zone) = attributes.zone.as_ref().filter(|zone| !zone.is_empty()) {
        info.location = Some(zone.clone());
    }
    if let Some(project) = attributes.project_id.as_ref().filter(|p| !p.is_empty()) {
        info.project_id = Some(project.clone());
    }
    info.compute_platform = attributes.platform;
}

/// 前端协议名称
#[must_use]
pub fn protocol_name(version: Version) -> Option<&'static str> {
    match version {
        Version::HTTP_09 => Some("http/0.9"),
        Version::HTTP_10 => Some("http/1.0"),
        Version::HTTP_11 => Some("http/1.1"),
        Version::HTTP_2 => Some("http/2"),
        Version::HTTP_3 => Some("http/3"),
        _ => None,
    }
}
