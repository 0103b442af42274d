//! Search index writer over an Elasticsearch-compatible document API.
//!
//! Documents are upserted with `PUT {base}/{index}/_doc/{id}` and removed with
//! `DELETE` on the same path. Both carry `routing=<tenant>` so a tenant's
//! documents share a shard. Replays are harmless: a PUT overwrites and a
//! DELETE of a missing document (404) counts as success.

use async_trait::async_trait;
use reqwest::StatusCode;
use stratus_core::{FanoutError, SearchIndexer, TenantId, UserDocument, UserId};

const TARGET: &str = "search-index";

/// Longest response body quoted in an error.
const MAX_ERROR_BODY: usize = 512;

pub struct HttpSearchIndexer {
    client: reqwest::Client,
    base_url: String,
    index: String,
}

impl HttpSearchIndexer {
    pub fn new(client: reqwest::Client, base_url: &str, index: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
        }
    }

    pub fn document_url(&self, id: UserId) -> String {
        format!("{}/{}/_doc/{}", self.base_url, self.index, id)
    }
}

pub(crate) fn transport_error(target: &'static str, e: reqwest::Error) -> FanoutError {
    FanoutError::Transport {
        target,
        reason: e.to_string(),
    }
}

/// Turn a non-success response into a rejection carrying its body.
pub(crate) async fn rejection(target: &'static str, response: reqwest::Response) -> FanoutError {
    let status = response.status().as_u16();
    let mut reason = response.text().await.unwrap_or_default();
    if reason.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !reason.is_char_boundary(cut) {
            cut -= 1;
        }
        reason.truncate(cut);
    }
    FanoutError::Rejected {
        target,
        status,
        reason,
    }
}

#[async_trait]
impl SearchIndexer for HttpSearchIndexer {
    async fn index(&self, document: &UserDocument) -> Result<(), FanoutError> {
        let response = self
            .client
            .put(self.document_url(document.id))
            .query(&[("routing", document.tenant_id.to_string())])
            .json(document)
            .send()
            .await
            .map_err(|e| transport_error(TARGET, e))?;

        if response.status().is_success() {
            tracing::debug!(user_id = %document.id, "Indexed user document");
            Ok(())
        } else {
            Err(rejection(TARGET, response).await)
        }
    }

    async fn remove(&self, tenant_id: TenantId, id: UserId) -> Result<(), FanoutError> {
        let response = self
            .client
            .delete(self.document_url(id))
            .query(&[("routing", tenant_id.to_string())])
            .send()
            .await
            .map_err(|e| transport_error(TARGET, e))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            tracing::debug!(user_id = %id, status = status.as_u16(), "Removed user document");
            Ok(())
        } else {
            Err(rejection(TARGET, response).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode as AxumStatus, routing::put, Router};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}/", addr)
    }

    fn document() -> UserDocument {
        UserDocument {
            id: UserId::now_v7(),
            tenant_id: TenantId::now_v7(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            full_name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
        }
    }

    #[test]
    fn test_document_url_trims_base() {
        let indexer = HttpSearchIndexer::new(reqwest::Client::new(), "http://search:9200/", "users");
        let id = UserId::now_v7();
        assert_eq!(
            indexer.document_url(id),
            format!("http://search:9200/users/_doc/{}", id)
        );
    }

    #[tokio::test]
    async fn test_delete_of_missing_document_succeeds() {
        let app = Router::new().route(
            "/users/_doc/:id",
            put(|| async { AxumStatus::OK }).delete(|| async { AxumStatus::NOT_FOUND }),
        );
        let base = serve(app).await;
        let indexer = HttpSearchIndexer::new(reqwest::Client::new(), &base, "users");

        let doc = document();
        indexer.index(&doc).await.expect("index should succeed");
        indexer
            .remove(doc.tenant_id, doc.id)
            .await
            .expect("remove of absent document should succeed");
    }

    #[tokio::test]
    async fn test_server_error_is_rejection() {
        let app = Router::new().route(
            "/users/_doc/:id",
            put(|Path(id): Path<String>| async move {
                (AxumStatus::SERVICE_UNAVAILABLE, format!("shard for {} unavailable", id))
            }),
        );
        let base = serve(app).await;
        let indexer = HttpSearchIndexer::new(reqwest::Client::new(), &base, "users");

        let err = indexer
            .index(&document())
            .await
            .expect_err("index should fail");
        assert!(matches!(
            err,
            FanoutError::Rejected { status: 503, ref reason, .. } if reason.contains("unavailable")
        ));
    }
}
