//! HTTP snapshot fetch against `GET /v1/topics/{topic}/locks`.

use anyhow::{anyhow, Context, Result};
use elk_schemas::{LockSnapshot, RecordType};

#[derive(Debug, Clone)]
pub struct LocksClient {
    http: reqwest::Client,
    base_url: String,
}

impl LocksClient {
    /// `base_url` is the daemon root, e.g. `http://127.0.0.1:8787`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn locks_url(&self, record_type: RecordType) -> String {
        format!(
            "{}/v1/topics/{}/locks",
            self.base_url.trim_end_matches('/'),
            record_type.topic()
        )
    }

    pub async fn fetch_locks(&self, record_type: RecordType) -> Result<LockSnapshot> {
        let resp = self
            .http
            .get(self.locks_url(record_type))
            .send()
            .await
            .context("locks request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "locks http error status={} body={}",
                status.as_u16(),
                body
            ));
        }

        resp.json::<LockSnapshot>()
            .await
            .context("locks response json decode failed")
    }
}
