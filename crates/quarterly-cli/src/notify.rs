//! Best-effort webhook notifications.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

/// Posts `{"text": message}` to the configured webhook. Without a webhook
/// every call is a no-op; delivery failures are logged and swallowed.
#[derive(Clone)]
pub struct Notifier {
  client:  Client,
  webhook: Option<String>,
}

impl Notifier {
  pub fn new(webhook: Option<String>) -> anyhow::Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(10))
      .build()?;
    Ok(Self { client, webhook: webhook.filter(|w| !w.trim().is_empty()) })
  }

  pub async fn send(&self, message: &str) {
    let Some(url) = &self.webhook else {
      return;
    };
    let result = self
      .client
      .post(url)
      .json(&json!({ "text": message }))
      .send()
      .await
      .and_then(|resp| resp.error_for_status());
    match result {
      Ok(_) => debug!("notification delivered"),
      Err(error) => warn!(%error, "notification failed"),
    }
  }
}
