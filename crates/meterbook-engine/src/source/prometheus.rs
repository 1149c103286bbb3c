//! Prometheus HTTP API client
//!
//! Instant queries via `GET /api/v1/query`. Only `vector` results are
//! accepted; ingestion cannot attribute scalars, strings or matrices.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use meterbook_common::{MetricsSourceError, Result, Sample, ValidationError};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::MetricsSource;

/// Metrics source backed by a Prometheus compatible server
#[derive(Debug, Clone)]
pub struct PrometheusSource {
    client: reqwest::Client,
    base_url: String,
}

impl PrometheusSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn query_url(&self) -> String {
        format!("{}/api/v1/query", self.base_url)
    }
}

#[async_trait]
impl MetricsSource for PrometheusSource {
    #[instrument(skip(self, query), fields(url = %self.base_url))]
    async fn query(&self, query: &str, at: DateTime<Utc>) -> Result<Vec<Sample>> {
        let time = at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let response = self
            .client
            .get(self.query_url())
            .query(&[("query", query), ("time", time.as_str())])
            .send()
            .await
            .map_err(|e| MetricsSourceError::Transport(e.to_string()))?;

        // Error responses (400, 422, 503) still carry a JSON body
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MetricsSourceError::Transport(e.to_string()))?;
        debug!(%status, bytes = body.len(), "Received query response");

        decode_response(&body)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    data: Option<QueryData>,
    error_type: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    /// `[unix_seconds, "value"]`
    value: (f64, String),
}

/// Decode an instant query response body into samples
pub(crate) fn decode_response(body: &str) -> Result<Vec<Sample>> {
    let response: ApiResponse = serde_json::from_str(body)?;
    if response.status != "success" {
        return Err(MetricsSourceError::Api {
            error_type: response.error_type.unwrap_or_else(|| response.status.clone()),
            message: response.error.unwrap_or_default(),
        }
        .into());
    }

    let data = response
        .data
        .ok_or_else(|| MetricsSourceError::Decode("response has no data".to_string()))?;
    if data.result_type != "vector" {
        return Err(ValidationError::UnexpectedResultType(data.result_type).into());
    }

    let samples: Vec<VectorSample> = serde_json::from_value(data.result)?;
    samples
        .into_iter()
        .map(|s| {
            let value = s.value.1.parse::<f64>().map_err(|e| {
                MetricsSourceError::Decode(format!("invalid sample value '{}': {e}", s.value.1))
            })?;
            Ok(Sample::new(s.metric, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use meterbook_common::{MeterbookError, TENANT_LABEL};

    #[test]
    fn test_decode_vector() {
        let body = r#"{
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [
                    {"metric": {"category": "c:ns", "tenant": "acme", "product": "p:c:acme:ns"}, "value": [1609459200, "42"]},
                    {"metric": {"tenant": "beta"}, "value": [1609459200.5, "0.25"]}
                ]
            }
        }"#;
        let samples = decode_response(body).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, 42.0);
        assert_eq!(samples[0].label(TENANT_LABEL).unwrap(), "acme");
        assert_eq!(samples[1].value, 0.25);
    }

    #[test]
    fn test_decode_empty_vector() {
        let body = r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#;
        assert!(decode_response(body).unwrap().is_empty());
    }

    #[test]
    fn test_non_vector_is_rejected() {
        let body = r#"{"status":"success","data":{"resultType":"scalar","result":[1609459200,"1"]}}"#;
        assert!(matches!(
            decode_response(body),
            Err(MeterbookError::Validation(ValidationError::UnexpectedResultType(t))) if t == "scalar"
        ));
    }

    #[test]
    fn test_api_error() {
        let body = r#"{"status":"error","errorType":"bad_data","error":"parse error at char 4"}"#;
        match decode_response(body) {
            Err(MeterbookError::MetricsSource(MetricsSourceError::Api { error_type, message })) => {
                assert_eq!(error_type, "bad_data");
                assert_eq!(message, "parse error at char 4");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_garbage_body() {
        assert!(matches!(
            decode_response("<html>bad gateway</html>"),
            Err(MeterbookError::MetricsSource(MetricsSourceError::Decode(_)))
        ));
    }

    #[test]
    fn test_query_url_trims_slash() {
        let source = PrometheusSource::new("http://prometheus:9090/");
        assert_eq!(source.query_url(), "http://prometheus:9090/api/v1/query");
    }
}
