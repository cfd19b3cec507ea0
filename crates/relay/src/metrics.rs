use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, OnceLock, PoisonError,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EndpointMetricKey {
    endpoint: String,
    method: String,
}

pub struct RelayMetrics {
    request_duration_count: Mutex<HashMap<EndpointMetricKey, u64>>,
    request_duration_sum_ms: Mutex<HashMap<EndpointMetricKey, u64>>,
    request_errors_total: Mutex<HashMap<EndpointMetricKey, u64>>,
    request_rate_total: Mutex<HashMap<EndpointMetricKey, u64>>,
    ws_duration_count: Mutex<HashMap<String, u64>>,
    ws_duration_sum_ms: Mutex<HashMap<String, u64>>,
    ws_errors_total: Mutex<HashMap<String, u64>>,
    ws_rate_total: Mutex<HashMap<String, u64>>,
    active_connections: Mutex<HashMap<String, i64>>,
    broadcast_delivered_total: AtomicU64,
    broadcast_failed_total: AtomicU64,
}

const STREAMS: [&str; 2] = ["chat", "notification"];
static GLOBAL_METRICS: OnceLock<Arc<RelayMetrics>> = OnceLock::new();

impl Default for RelayMetrics {
    fn default() -> Self {
        let mut active_connections = HashMap::new();
        for stream in STREAMS {
            active_connections.insert(stream.to_string(), 0);
        }

        Self {
            request_duration_count: Mutex::new(HashMap::new()),
            request_duration_sum_ms: Mutex::new(HashMap::new()),
            request_errors_total: Mutex::new(HashMap::new()),
            request_rate_total: Mutex::new(HashMap::new()),
            ws_duration_count: Mutex::new(HashMap::new()),
            ws_duration_sum_ms: Mutex::new(HashMap::new()),
            ws_errors_total: Mutex::new(HashMap::new()),
            ws_rate_total: Mutex::new(HashMap::new()),
            active_connections: Mutex::new(active_connections),
            broadcast_delivered_total: AtomicU64::new(0),
            broadcast_failed_total: AtomicU64::new(0),
        }
    }
}

pub fn set_global_metrics(metrics: Arc<RelayMetrics>) {
    let _ = GLOBAL_METRICS.set(metrics);
}

fn global_metrics() -> Option<&'static Arc<RelayMetrics>> {
    GLOBAL_METRICS.get()
}

pub fn record_http_request(method: &str, path: &str, status_code: u16, latency_ms: u64) {
    if let Some(metrics) = global_metrics() {
        metrics.record_http_request(method, path, status_code, latency_ms);
    }
}

pub fn record_ws_request(endpoint: &str, is_error: bool, latency_ms: u64) {
    if let Some(metrics) = global_metrics() {
        metrics.record_ws_request(endpoint, is_error, latency_ms);
    }
}

pub fn record_broadcast(delivered: usize, failed: usize) {
    if let Some(metrics) = global_metrics() {
        metrics.record_broadcast(delivered, failed);
    }
}

pub fn connection_opened(stream: &str) {
    if let Some(metrics) = global_metrics() {
        metrics.adjust_active_connections(stream, 1);
    }
}

pub fn connection_closed(stream: &str) {
    if let Some(metrics) = global_metrics() {
        metrics.adjust_active_connections(stream, -1);
    }
}

impl RelayMetrics {
    pub fn record_http_request(&self, method: &str, path: &str, status_code: u16, latency_ms: u64) {
        let key = EndpointMetricKey {
            endpoint: normalize_endpoint(path),
            method: method.to_ascii_uppercase(),
        };

        increment_counter(&self.request_rate_total, &key, 1);
        increment_counter(&self.request_duration_sum_ms, &key, latency_ms);
        increment_counter(&self.request_duration_count, &key, 1);
        if status_code >= 400 {
            increment_counter(&self.request_errors_total, &key, 1);
        }
    }

    pub fn record_ws_request(&self, endpoint: &str, is_error: bool, latency_ms: u64) {
        let normalized_endpoint = normalize_label(endpoint);
        increment_label_counter(&self.ws_rate_total, &normalized_endpoint, 1);
        increment_label_counter(&self.ws_duration_sum_ms, &normalized_endpoint, latency_ms);
        increment_label_counter(&self.ws_duration_count, &normalized_endpoint, 1);
        if is_error {
            increment_label_counter(&self.ws_errors_total, &normalized_endpoint, 1);
        }
    }

    pub fn record_broadcast(&self, delivered: usize, failed: usize) {
        self.broadcast_delivered_total.fetch_add(delivered as u64, Ordering::SeqCst);
        self.broadcast_failed_total.fetch_add(failed as u64, Ordering::SeqCst);
    }

    pub fn adjust_active_connections(&self, stream: &str, delta: i64) {
        let mut guard = lock(&self.active_connections);
        let value = guard.entry(normalize_label(stream)).or_insert(0);
        *value = (*value + delta).max(0);
    }

    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP relay_request_rate_total Total HTTP requests by endpoint.\n");
        output.push_str("# TYPE relay_request_rate_total counter\n");
        append_counter_lines(&mut output, "relay_request_rate_total", &self.request_rate_total);

        output.push_str(
            "# HELP relay_request_errors_total Total HTTP error responses by endpoint.\n",
        );
        output.push_str("# TYPE relay_request_errors_total counter\n");
        append_counter_lines(&mut output, "relay_request_errors_total", &self.request_errors_total);

        output.push_str("# HELP relay_request_duration_ms_sum Sum of HTTP request latency in milliseconds by endpoint.\n");
        output.push_str("# TYPE relay_request_duration_ms_sum counter\n");
        append_counter_lines(
            &mut output,
            "relay_request_duration_ms_sum",
            &self.request_duration_sum_ms,
        );

        output.push_str("# HELP relay_request_duration_ms_count Count of HTTP request latency samples by endpoint.\n");
        output.push_str("# TYPE relay_request_duration_ms_count counter\n");
        append_counter_lines(
            &mut output,
            "relay_request_duration_ms_count",
            &self.request_duration_count,
        );

        output.push_str("# HELP relay_ws_rate_total Total websocket messages by endpoint.\n");
        output.push_str("# TYPE relay_ws_rate_total counter\n");
        append_label_counter_lines(&mut output, "relay_ws_rate_total", &self.ws_rate_total);

        output
            .push_str("# HELP relay_ws_errors_total Total websocket message errors by endpoint.\n");
        output.push_str("# TYPE relay_ws_errors_total counter\n");
        append_label_counter_lines(&mut output, "relay_ws_errors_total", &self.ws_errors_total);

        output.push_str("# HELP relay_ws_duration_ms_sum Sum of websocket message latency in milliseconds by endpoint.\n");
        output.push_str("# TYPE relay_ws_duration_ms_sum counter\n");
        append_label_counter_lines(
            &mut output,
            "relay_ws_duration_ms_sum",
            &self.ws_duration_sum_ms,
        );

        output.push_str(
            "# HELP relay_ws_duration_ms_count Count of websocket latency samples by endpoint.\n",
        );
        output.push_str("# TYPE relay_ws_duration_ms_count counter\n");
        append_label_counter_lines(
            &mut output,
            "relay_ws_duration_ms_count",
            &self.ws_duration_count,
        );

        output.push_str(
            "# HELP relay_ws_active_connections Currently registered websocket connections by stream.\n",
        );
        output.push_str("# TYPE relay_ws_active_connections gauge\n");
        append_active_connection_lines(&mut output, &self.active_connections);

        output.push_str(
            "# HELP relay_broadcast_deliveries_total Broadcast frames handed to recipients by outcome.\n",
        );
        output.push_str("# TYPE relay_broadcast_deliveries_total counter\n");
        output.push_str(&format!(
            "relay_broadcast_deliveries_total{{outcome=\"delivered\"}} {}\n",
            self.broadcast_delivered_total.load(Ordering::SeqCst)
        ));
        output.push_str(&format!(
            "relay_broadcast_deliveries_total{{outcome=\"failed\"}} {}\n",
            self.broadcast_failed_total.load(Ordering::SeqCst)
        ));

        output
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn normalize_endpoint(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut normalized_segments = Vec::new();
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        if uuid::Uuid::parse_str(segment).is_ok() {
            normalized_segments.push("{uuid}".to_string());
            continue;
        }

        if segment.chars().all(|character| character.is_ascii_digit()) {
            normalized_segments.push("{number}".to_string());
            continue;
        }

        normalized_segments.push(segment.to_string());
    }

    if normalized_segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", normalized_segments.join("/"))
    }
}

fn normalize_label(label: &str) -> String {
    let normalized = label.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        "unknown".to_string()
    } else {
        normalized
    }
}

fn increment_counter(
    map: &Mutex<HashMap<EndpointMetricKey, u64>>,
    key: &EndpointMetricKey,
    delta: u64,
) {
    let mut guard = lock(map);
    let value = guard.entry(key.clone()).or_insert(0);
    *value = value.saturating_add(delta);
}

fn increment_label_counter(map: &Mutex<HashMap<String, u64>>, label: &str, delta: u64) {
    let mut guard = lock(map);
    let value = guard.entry(label.to_string()).or_insert(0);
    *value = value.saturating_add(delta);
}

fn append_counter_lines(
    output: &mut String,
    metric_name: &str,
    map: &Mutex<HashMap<EndpointMetricKey, u64>>,
) {
    let guard = lock(map);
    let mut entries: Vec<_> = guard.iter().collect();
    entries.sort_by(|(left_key, _), (right_key, _)| {
        left_key
            .method
            .cmp(&right_key.method)
            .then_with(|| left_key.endpoint.cmp(&right_key.endpoint))
    });

    for (key, value) in entries {
        output.push_str(&format!(
            "{metric_name}{{method=\"{}\",endpoint=\"{}\"}} {value}\n",
            escape_label_value(&key.method),
            escape_label_value(&key.endpoint),
        ));
    }
}

fn append_label_counter_lines(
    output: &mut String,
    metric_name: &str,
    map: &Mutex<HashMap<String, u64>>,
) {
    let guard = lock(map);
    if guard.is_empty() {
        return;
    }

    let mut entries: Vec<_> = guard.iter().collect();
    entries.sort_by(|(left, _), (right, _)| left.cmp(right));

    for (label, value) in entries {
        output.push_str(&format!(
            "{metric_name}{{endpoint=\"{}\"}} {value}\n",
            escape_label_value(label),
        ));
    }
}

fn append_active_connection_lines(output: &mut String, map: &Mutex<HashMap<String, i64>>) {
    let guard = lock(map);
    let mut entries: Vec<_> = guard.iter().collect();
    entries.sort_by(|(left, _), (right, _)| left.cmp(right));

    for (stream, value) in entries {
        output.push_str(&format!(
            "relay_ws_active_connections{{stream=\"{}\"}} {value}\n",
            escape_label_value(stream),
        ));
    }
}

fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n").replace('"', "\\\"")
}
