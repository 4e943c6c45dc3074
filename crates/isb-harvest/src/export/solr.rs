use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Index at {url} rejected request with HTTP {status}: {body}")]
    Rejected { url: String, status: u16, body: String },
}

/// Destination for exported documents
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn add_documents(&self, documents: &[Value]) -> Result<(), IndexError>;

    async fn commit(&self) -> Result<(), IndexError>;
}

/// Solr-compatible update endpoint
#[derive(Debug, Clone)]
pub struct SolrIndex {
    client: Client,
    /// Collection URL ending in `/`, e.g. `http://localhost:8983/solr/isb_core_records/`
    base_url: String,
}

impl SolrIndex {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self { client, base_url }
    }

    async fn check(url: &str, response: reqwest::Response) -> Result<(), IndexError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(IndexError::Rejected {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl SearchIndex for SolrIndex {
    async fn add_documents(&self, documents: &[Value]) -> Result<(), IndexError> {
        let url = format!("{}update?overwrite=true", self.base_url);
        debug!(url = %url, documents = documents.len(), "Pushing documents");
        let response = self
            .client
            .post(&url)
            .json(documents)
            .send()
            .await
            .map_err(|source| IndexError::Request {
                url: url.clone(),
                source,
            })?;
        Self::check(&url, response).await
    }

    async fn commit(&self) -> Result<(), IndexError> {
        let url = format!("{}update?commit=true", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| IndexError::Request {
                url: url.clone(),
                source,
            })?;
        Self::check(&url, response).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_add_and_commit() {
        let server = MockServer::start().await;
        let docs = vec![json!({"id": "a"})];
        Mock::given(method("POST"))
            .and(path("/solr/core/update"))
            .and(query_param("overwrite", "true"))
            .and(body_json(json!([{"id": "a"}])))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/solr/core/update"))
            .and(query_param("commit", "true"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let index = SolrIndex::new(Client::new(), format!("{}/solr/core", server.uri()));
        index.add_documents(&docs).await.unwrap();
        index.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejection_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("undefined field"))
            .mount(&server)
            .await;

        let index = SolrIndex::new(Client::new(), format!("{}/solr/core/", server.uri()));
        let err = index.add_documents(&[json!({"id": "a"})]).await.unwrap_err();
        assert!(matches!(err, IndexError::Rejected { status: 400, .. }));
        assert!(err.to_string().contains("undefined field"));
    }
}
