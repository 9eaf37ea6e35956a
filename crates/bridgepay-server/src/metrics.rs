use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};
use std::sync::LazyLock;

pub static WEBHOOK_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "bridgepay_webhook_requests_total",
        "Inbound webhook requests by outcome",
        &["env", "outcome"]
    )
    .unwrap()
});

pub static PROVIDER_CALLS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "bridgepay_provider_calls_total",
        "Provider-backed operations by result",
        &["operation", "result"]
    )
    .unwrap()
});

pub static BANK_LIST_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "bridgepay_bank_list_requests_total",
        "Checkout bank list requests",
        &["result"]
    )
    .unwrap()
});

pub static ADMIN_AUTH_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "bridgepay_admin_auth_failures_total",
        "Rejected admin requests",
        &["reason"]
    )
    .unwrap()
});

pub fn result_label<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() {
        "success"
    } else {
        "error"
    }
}

pub fn metrics_output() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
