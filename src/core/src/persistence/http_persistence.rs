use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::{Client, StatusCode};

use crate::error_handling::types::{PersistenceError, TransportError};
use crate::persistence::persistence_trait::PersistenceApi;
use crate::persistence::types::{BackendId, SaveRequestBatch, SubmitResponse};

/// JSON-over-HTTP client for the persistence API.
///
/// Routes:
/// - `POST   {base}/sessions/{session}/captures`
/// - `DELETE {base}/sessions/{session}/recordings/{id}`
/// - `DELETE {base}/sessions/{session}/screenshots/{id}`
pub struct HttpPersistence {
    base_url: String,
    client: Client,
}

impl HttpPersistence {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        info!("HttpPersistence targeting {}", base_url);
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn session_url(&self, session_id: &str) -> String {
        format!("{}/sessions/{}", self.base_url, session_id)
    }

    async fn delete(&self, url: String, id: &BackendId) -> Result<(), PersistenceError> {
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(TransportError::from)?;
        match response.status() {
            status if status.is_success() => {
                debug!("DELETE {} -> {}", url, status);
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(PersistenceError::NotFound(id.to_string())),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(PersistenceError::InvalidIdFormat(id.to_string()))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                error!("DELETE {} failed with {}: {}", url, status, body);
                Err(PersistenceError::Transport(TransportError::Status {
                    code: status.as_u16(),
                    body,
                }))
            }
        }
    }
}

#[async_trait]
impl PersistenceApi for HttpPersistence {
    async fn submit(&self, batch: &SaveRequestBatch) -> Result<SubmitResponse, TransportError> {
        let url = format!("{}/captures", self.session_url(&batch.session_id));
        debug!(
            "POST {} ({} recording(s), {} screenshot(s), disconnect={})",
            url,
            batch.recordings.len(),
            batch.screenshots.len(),
            batch.disconnect
        );

        let response = self.client.post(&url).json(batch).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("POST {} failed with {}: {}", url, status, body);
            return Err(TransportError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        serde_json::from_str::<SubmitResponse>(&body)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }

    async fn delete_recording(
        &self,
        session_id: &str,
        id: &BackendId,
    ) -> Result<(), PersistenceError> {
        let url = format!("{}/recordings/{}", self.session_url(session_id), id);
        self.delete(url, id).await
    }

    async fn delete_screenshot(
        &self,
        session_id: &str,
        id: &BackendId,
    ) -> Result<(), PersistenceError> {
        let url = format!("{}/screenshots/{}", self.session_url(session_id), id);
        self.delete(url, id).await
    }
}
