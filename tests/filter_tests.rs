//! # 过滤器请求生命周期测试

use std::sync::Arc;

use service_control_filter::proxy::filter::{CONSUMER_NUMBER_HEADER, CONSUMER_TYPE_HEADER};
use service_control_filter::proxy::{
    ServiceControlFilter, ServiceControlHandlerFactoryImpl, StreamInfo,
};
use service_control_filter::service_control::{CheckResponseInfo, Status};
use service_control_filter::testing::*;

fn filter_with(call: &Arc<FakeServiceControlCall>) -> ServiceControlFilter {
    ServiceControlFilter::new(Arc::new(ServiceControlHandlerFactoryImpl::new(
        filter_config(call.clone()),
    )))
}

#[tokio::test]
async fn test_request_lifecycle_reports_once() {
    init_test_env();
    let call = Arc::new(FakeServiceControlCall::new());
    let filter = filter_with(&call);

    let mut parts = request("/shelves", &[("x-api-key", "AIza-key"), ("user-agent", "curl")]);
    let mut stream_info = StreamInfo::new("ListShelves").with_downstream_address("192.0.2.7");
    let mut stream = filter.on_request(&parts, &stream_info);

    let completer = {
        let call = call.clone();
        tokio::spawn(async move {
            while !call.complete_check(
                Status::ok(),
                CheckResponseInfo {
                    consumer_project_number: Some("987".to_string()),
                    ..CheckResponseInfo::default()
                },
            ) {
                tokio::task::yield_now().await;
            }
        })
    };

    let decision = stream.decode_headers(&mut parts).await;
    completer.await.unwrap();
    assert!(decision.is_allowed());
    assert_eq!(parts.headers[CONSUMER_TYPE_HEADER], "PROJECT");
    assert_eq!(parts.headers[CONSUMER_NUMBER_HEADER], "987");

    stream_info.finish(200, 42);
    stream.log(&stream_info, Some(&parts.headers), None, None);

    let reports = call.report_requests();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].operation.client_ip.as_deref(), Some("192.0.2.7"));
    assert_eq!(reports[0].request_headers, "user-agent=curl;");
    assert_eq!(reports[0].response_size, 42);
}

#[tokio::test]
async fn test_unmatched_route_passes_through() {
    let call = Arc::new(FakeServiceControlCall::new());
    let filter = filter_with(&call);

    let mut parts = request("/healthz", &[]);
    let stream_info = StreamInfo::default();
    let mut stream = filter.on_request(&parts, &stream_info);

    assert!(stream.decode_headers(&mut parts).await.is_allowed());
    stream.log(&stream_info, Some(&parts.headers), None, None);

    assert!(call.check_requests().is_empty());
    assert!(call.report_requests().is_empty());
    assert!(parts.headers.get(CONSUMER_TYPE_HEADER).is_none());
}

#[tokio::test]
async fn test_dropped_stream_discards_pending_check() {
    let call = Arc::new(FakeServiceControlCall::new());
    let filter = filter_with(&call);

    let mut parts = request("/shelves?key=k", &[]);
    let mut stream = filter.on_request(&parts, &StreamInfo::new("ListShelves"));
    let pending = tokio::time::timeout(
        std::time::Duration::from_millis(20),
        stream.decode_headers(&mut parts),
    )
    .await;
    assert!(pending.is_err());
    drop(stream);

    assert_eq!(call.pending_checks(), 1);
    assert!(call.complete_check(Status::ok(), CheckResponseInfo::default()));
    assert!(parts.headers.get(CONSUMER_TYPE_HEADER).is_none());
}
