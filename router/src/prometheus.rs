use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

pub(crate) fn prometheus_builder(
    addr: SocketAddr,
    port: u16,
    max_batch_size: usize,
) -> Result<PrometheusBuilder, BuildError> {
    let mut addr = addr;
    addr.set_port(port);

    // Duration buckets
    let duration_matcher = Matcher::Suffix(String::from("duration"));
    let n_duration_buckets = 35;
    let mut duration_buckets = Vec::with_capacity(n_duration_buckets);
    // Minimum duration in seconds
    let mut value = 0.00001;
    for _ in 0..n_duration_buckets {
        // geometric sequence
        value *= 1.5;
        duration_buckets.push(value);
    }

    // Reader batch size buckets
    let batch_size_matcher = Matcher::Full(String::from("qa_reader_batch_size"));
    let batch_size_buckets: Vec<f64> = (0..13)
        .map(|x| 2.0_f64.powi(x))
        .filter(|x| (*x as usize) <= max_batch_size)
        .collect();

    // Reader batch tokens buckets
    let batch_tokens_matcher = Matcher::Full(String::from("qa_reader_batch_tokens"));
    let batch_tokens_buckets: Vec<f64> = (0..21).map(|x| 2.0_f64.powi(x)).collect();

    // Passages and examples per request
    let per_batch_matcher = Matcher::Suffix(String::from("per_batch"));
    let per_batch_buckets: Vec<f64> = (0..17).map(|x| 2.0_f64.powi(x)).collect();

    // Prometheus handler
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(duration_matcher, &duration_buckets)?
        .set_buckets_for_metric(batch_size_matcher, &batch_size_buckets)?
        .set_buckets_for_metric(batch_tokens_matcher, &batch_tokens_buckets)?
        .set_buckets_for_metric(per_batch_matcher, &per_batch_buckets)
}
