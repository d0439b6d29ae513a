//! Outbound calls to third-party APIs: W3C trace context plus per-host timing.
//!
//! See: https://www.w3.org/TR/trace-context/

use metrics::histogram;
use opentelemetry::trace::{SpanContext, TraceContextExt};
use reqwest::header::HeaderMap;
use std::time::Instant;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

pub const TRACEPARENT_HEADER: &str = "traceparent";

pub const TRACESTATE_HEADER: &str = "tracestate";

/// `traceparent` value for a span context, `None` when the context is invalid.
pub fn traceparent_for(span_context: &SpanContext) -> Option<String> {
    span_context.is_valid().then(|| {
        // version-trace_id-span_id-trace_flags
        format!(
            "00-{}-{}-{:02x}",
            span_context.trace_id(),
            span_context.span_id(),
            span_context.trace_flags().to_u8()
        )
    })
}

/// Write the current span's trace context into `headers`.
pub fn inject_trace_context(headers: &mut HeaderMap) {
    let context = Span::current().context();
    let span_context = context.span().span_context().clone();

    let Some(traceparent) = traceparent_for(&span_context) else {
        return;
    };
    if let Ok(value) = traceparent.parse() {
        headers.insert(TRACEPARENT_HEADER, value);
    }

    let tracestate = span_context.trace_state().header();
    if !tracestate.is_empty()
        && let Ok(value) = tracestate.parse()
    {
        headers.insert(TRACESTATE_HEADER, value);
    }
}

/// Host label for outbound metrics. Paths and query strings stay out of it.
fn host_label(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

/// An outbound request that carries trace headers and is timed on send.
pub struct TracedRequest {
    request: reqwest::RequestBuilder,
    method: &'static str,
    host: String,
}

impl TracedRequest {
    fn new(request: reqwest::RequestBuilder, method: &'static str, url: &str) -> Self {
        Self {
            request,
            method,
            host: host_label(url),
        }
    }

    fn map(self, f: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder) -> Self {
        Self {
            request: f(self.request),
            ..self
        }
    }

    pub fn header(self, key: &str, value: &str) -> Self {
        self.map(|r| r.header(key, value))
    }

    pub fn query<T: serde::Serialize + ?Sized>(self, query: &T) -> Self {
        self.map(|r| r.query(query))
    }

    pub fn json<T: serde::Serialize + ?Sized>(self, json: &T) -> Self {
        self.map(|r| r.json(json))
    }

    pub fn bearer_auth<T: std::fmt::Display>(self, token: T) -> Self {
        self.map(|r| r.bearer_auth(token))
    }

    pub async fn send(self) -> Result<reqwest::Response, reqwest::Error> {
        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);

        let start = Instant::now();
        let result = self.request.headers(headers).send().await;
        let elapsed = start.elapsed().as_secs_f64();

        let status = match &result {
            Ok(response) => response.status().as_u16().to_string(),
            Err(_) => "transport_error".to_string(),
        };
        tracing::debug!(
            method = self.method,
            host = %self.host,
            status = %status,
            elapsed_secs = elapsed,
            "Outbound request finished"
        );
        histogram!(
            "outbound_request_duration_seconds",
            "method" => self.method,
            "host" => self.host,
            "status" => status
        )
        .record(elapsed);

        result
    }
}

pub trait TracedClientExt {
    fn traced_get(&self, url: &str) -> TracedRequest;
    fn traced_post(&self, url: &str) -> TracedRequest;
}

impl TracedClientExt for reqwest::Client {
    fn traced_get(&self, url: &str) -> TracedRequest {
        TracedRequest::new(self.get(url), "GET", url)
    }

    fn traced_post(&self, url: &str) -> TracedRequest {
        TracedRequest::new(self.post(url), "POST", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{SpanId, TraceFlags, TraceId, TraceState};

    #[test]
    fn no_active_span_adds_no_headers() {
        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);
        assert!(headers.is_empty());
    }

    #[test]
    fn traceparent_formats_sampled_context() {
        let context = SpanContext::new(
            TraceId::from_hex("0af7651916cd43dd8448eb211c80319c").unwrap(),
            SpanId::from_hex("b7ad6b7169203331").unwrap(),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        );

        assert_eq!(
            traceparent_for(&context).as_deref(),
            Some("00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01")
        );
    }

    #[test]
    fn invalid_context_has_no_traceparent() {
        assert!(traceparent_for(&SpanContext::empty_context()).is_none());
    }

    #[test]
    fn host_label_drops_path_and_query() {
        assert_eq!(
            host_label("https://tenant.doubleoctopus.io/admin/api/v1/users?q=ab"),
            "tenant.doubleoctopus.io"
        );
        assert_eq!(host_label("not a url"), "unknown");
    }
}
