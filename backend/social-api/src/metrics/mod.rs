//! Prometheus metrics for social-api.
//!
//! Collectors for relationship edges, feed assembly, uploads and HTTP
//! requests, plus the handler for the `/metrics` endpoint.

use actix_web::HttpResponse;
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    /// Follow/unfollow attempts by operation and result.
    pub static ref EDGE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "social_edge_operations_total",
        "Follow and unfollow operations segmented by outcome",
        &["op", "result"]
    )
    .expect("failed to register social_edge_operations_total");

    /// Posts returned per assembled feed page.
    pub static ref FEED_SIZE: HistogramVec = register_histogram_vec!(
        "social_feed_size",
        "Number of posts in an assembled feed page",
        &["page"],
        vec![0.0, 1.0, 5.0, 10.0, 20.0, 50.0, 100.0]
    )
    .expect("failed to register social_feed_size");

    /// Media uploads by folder and result.
    pub static ref UPLOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "social_media_uploads_total",
        "Media uploads segmented by folder and result",
        &["folder", "result"]
    )
    .expect("failed to register social_media_uploads_total");

    /// HTTP request latency by method, matched route and status.
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "social_http_request_duration_seconds",
        "HTTP request latency",
        &["method", "route", "status"]
    )
    .expect("failed to register social_http_request_duration_seconds");
}

pub fn record_edge_operation(op: &str, result: &str) {
    EDGE_OPERATIONS_TOTAL.with_label_values(&[op, result]).inc();
}

pub fn observe_feed_size(first_page: bool, size: usize) {
    let page = if first_page { "first" } else { "next" };
    FEED_SIZE.with_label_values(&[page]).observe(size as f64);
}

pub fn record_upload(folder: &str, result: &str) {
    UPLOADS_TOTAL.with_label_values(&[folder, result]).inc();
}

pub fn observe_http_request(method: &str, route: &str, status: u16, seconds: f64) {
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, route, &status.to_string()])
        .observe(seconds);
}

/// Actix handler that renders Prometheus metrics in text format.
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
