//! Search backend client.
//!
//! Sends a [`CompiledQuery`] to an Elasticsearch-compatible HTTP endpoint
//! and decodes the hits. The compiler itself never does I/O; this module is
//! what the CLI drives after compiling.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::BackendConfig;
use crate::error::{SqlesError, SqlesResult};
use crate::request::CompiledQuery;
use crate::schema::Schema;

/// Anything that can run a compiled request.
pub trait SearchBackend: Send + Sync {
    fn execute(
        &self,
        query: &CompiledQuery,
    ) -> impl Future<Output = SqlesResult<SearchResponse>> + Send;
}

/// One matched document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Map<String, Value>,
}

/// Decoded search response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResponse {
    pub total: u64,
    pub hits: Vec<Hit>,
    pub aggregations: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTotal {
    Count(u64),
    Object { value: u64 },
}

#[derive(Deserialize)]
struct RawHits {
    total: Option<RawTotal>,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct RawResponse {
    hits: RawHits,
    #[serde(default)]
    aggregations: Option<Value>,
}

impl SearchResponse {
    /// Decode a `_search` response body.
    ///
    /// `hits.total` may be a plain number or `{ "value": n }`.
    pub fn from_json(body: Value) -> SqlesResult<Self> {
        let raw: RawResponse = serde_json::from_value(body)?;
        let total = match raw.hits.total {
            Some(RawTotal::Count(n)) | Some(RawTotal::Object { value: n }) => n,
            None => raw.hits.hits.len() as u64,
        };
        Ok(Self {
            total,
            hits: raw.hits.hits,
            aggregations: raw.aggregations,
        })
    }

    /// Single-value metric result, e.g. `aggregation_value("COUNT(*)")`.
    pub fn aggregation_value(&self, name: &str) -> Option<&Value> {
        self.aggregations.as_ref()?.get(name)?.get("value")
    }
}

/// HTTP client for an Elasticsearch-compatible server.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> SqlesResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SqlesError::Backend(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run a compiled request.
    pub async fn search(&self, query: &CompiledQuery) -> SqlesResult<SearchResponse> {
        let url = format!("{}/{}", self.base_url, query.search_path());
        tracing::info!("POST {}", url);

        let request = self.client.post(&url).json(&query.body());
        let body = self.send(request, &url).await?;
        SearchResponse::from_json(body)
    }

    /// Fetch field types from the index mapping.
    pub async fn mapping(&self, index: &str) -> SqlesResult<Schema> {
        let url = format!("{}/{}/_mapping", self.base_url, index);
        tracing::info!("GET {}", url);

        let body = self.send(self.client.get(&url), &url).await?;
        Ok(Schema::from_mapping(&body))
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> SqlesResult<Value> {
        let response = request.send().await.map_err(|e| {
            tracing::error!("Request to {} failed: {}", url, e);
            SqlesError::Backend(format!("{}: {}", url, e))
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SqlesError::Backend(format!("{}: {}", url, e)))?;

        if !status.is_success() {
            tracing::error!("{} returned {}", url, status);
            return Err(SqlesError::Backend(format!(
                "{} returned {}: {}",
                url, status, text
            )));
        }

        Ok(serde_json::from_str(&text)?)
    }
}

impl SearchBackend for HttpBackend {
    fn execute(
        &self,
        query: &CompiledQuery,
    ) -> impl Future<Output = SqlesResult<SearchResponse>> + Send {
        self.search(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_total_and_types() {
        let body = json!({
            "took": 3,
            "hits": {
                "total": 1,
                "max_score": 1.0,
                "hits": [{
                    "_index": "bank",
                    "_type": "account",
                    "_id": "44",
                    "_score": 1.0,
                    "_source": { "city": "Nogal", "age": 32 }
                }]
            }
        });

        let response = SearchResponse::from_json(body).unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.hits[0].doc_type.as_deref(), Some("account"));
        assert_eq!(response.hits[0].source["city"], json!("Nogal"));
    }

    #[test]
    fn test_modern_total_object() {
        let body = json!({
            "hits": {
                "total": { "value": 1000, "relation": "eq" },
                "hits": []
            },
            "aggregations": { "COUNT(*)": { "value": 1000 } }
        });

        let response = SearchResponse::from_json(body).unwrap();
        assert_eq!(response.total, 1000);
        assert!(response.hits.is_empty());
        assert_eq!(response.aggregation_value("COUNT(*)"), Some(&json!(1000)));
        assert_eq!(response.aggregation_value("SUM(x)"), None);
    }

    #[test]
    fn test_sorted_hits_have_null_score() {
        let body = json!({
            "hits": {
                "hits": [{ "_index": "bank", "_id": "1", "_score": null, "_source": {} }]
            }
        });

        let response = SearchResponse::from_json(body).unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.hits[0].score, None);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let backend = HttpBackend::new(&BackendConfig {
            url: "http://localhost:9200/".to_string(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(backend.base_url(), "http://localhost:9200");
    }
}
