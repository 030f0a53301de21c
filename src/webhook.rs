// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Chat webhook delivery for zone alerts.

use std::time::Duration;

use log::info;
use reqwest::Client;
use serde::Serialize;
use zone_tracker::{LogNotifier, Notifier, NotifyError};

#[derive(Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

/// Posts `{"content": text}` to a Discord-compatible webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Notifier for WebhookNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookMessage { content: text })
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Status(status.as_u16()))
        }
    }
}

/// Notifier chosen at startup from the configuration.
#[derive(Debug, Clone)]
pub enum AlertNotifier {
    Webhook(WebhookNotifier),
    Log(LogNotifier),
}

impl AlertNotifier {
    /// Webhook delivery when a URL is configured, log-only otherwise.
    pub fn from_url(url: Option<&str>, timeout: Duration) -> Result<Self, reqwest::Error> {
        match url {
            Some(url) => {
                info!("Zone alerts will be posted to the configured webhook");
                Ok(Self::Webhook(WebhookNotifier::new(url, timeout)?))
            }
            None => {
                info!("No webhook configured, zone alerts are logged only");
                Ok(Self::Log(LogNotifier))
            }
        }
    }
}

impl Notifier for AlertNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        match self {
            Self::Webhook(webhook) => webhook.notify(text).await,
            Self::Log(log) => log.notify(text).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    async fn spawn_hook(status: StatusCode) -> (String, Arc<Mutex<Vec<Value>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/hook",
                post(
                    move |State(seen): State<Arc<Mutex<Vec<Value>>>>, Json(body): Json<Value>| async move {
                        seen.lock().unwrap().push(body);
                        status
                    },
                ),
            )
            .with_state(Arc::clone(&received));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        (format!("http://{addr}/hook"), received)
    }

    #[tokio::test]
    async fn test_webhook_posts_content() {
        let (url, received) = spawn_hook(StatusCode::NO_CONTENT).await;
        let notifier = AlertNotifier::from_url(Some(&url), Duration::from_secs(2)).unwrap();
        notifier
            .notify("ALERT: Falcon1[IAF] has ENTERED our Mainland")
            .await
            .unwrap();

        let bodies = received.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["content"], "ALERT: Falcon1[IAF] has ENTERED our Mainland");
    }

    #[tokio::test]
    async fn test_webhook_error_status() {
        let (url, _) = spawn_hook(StatusCode::TOO_MANY_REQUESTS).await;
        let notifier = WebhookNotifier::new(url, Duration::from_secs(2)).unwrap();
        assert!(matches!(
            notifier.notify("hello").await,
            Err(NotifyError::Status(429))
        ));
    }

    #[tokio::test]
    async fn test_no_url_logs_only() {
        let notifier = AlertNotifier::from_url(None, Duration::from_secs(2)).unwrap();
        assert!(matches!(notifier, AlertNotifier::Log(_)));
        notifier.notify("Falcon1[IAF] LEFT our Mainland").await.unwrap();
    }
}
