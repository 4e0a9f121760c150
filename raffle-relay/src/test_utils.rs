//! Test utilities: configuration, in-process fakes for the Alphabot API and notification sink,
//! and application construction.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum_test::TestServer;
use serde_json::json;

use crate::alphabot::{ApiError, ApiResponse, ApiResult, RaffleApi, RegistrationOutcome, RegistrationRequest};
use crate::config::{AlphabotConfig, Config, FanoutConfig, StorageConfig, WebhookConfig};
use crate::fanout::FanoutOrchestrator;
use crate::notifications::NotificationSink;
use crate::storage::{CredentialStore, JsonFileStore};

pub const TEST_WEBHOOK_SECRET: &str = "s";

pub fn create_test_config(alphabot_base_url: &str, storage_dir: &Path) -> Config {
    Config {
        alphabot: AlphabotConfig {
            base_url: alphabot_base_url.parse().expect("valid mock server URL"),
            request_timeout: Duration::from_secs(5),
            default_retry_after: Duration::from_millis(50),
            ..Default::default()
        },
        webhook: WebhookConfig {
            secret: Some(TEST_WEBHOOK_SECRET.to_string()),
        },
        fanout: FanoutConfig {
            max_concurrency: 4,
            timeout: Duration::from_secs(5),
        },
        storage: StorageConfig {
            path: storage_dir.join("user_keys.json"),
        },
        ..Default::default()
    }
}

/// Build the app around `config` with `sink` capturing notifications.
///
/// The orchestrator is returned so tests can wait for background notifications.
pub async fn create_test_app(config: Config, sink: Arc<dyn NotificationSink>) -> (TestServer, FanoutOrchestrator) {
    let app = crate::Application::new_with_sink(config, Some(sink))
        .await
        .expect("Failed to create application");
    let orchestrator = app.orchestrator();
    (app.into_test_server(), orchestrator)
}

/// A JSON file store in a fresh temp directory, pre-populated with `entries`.
pub async fn temp_store(entries: &[(&str, &str)]) -> (tempfile::TempDir, Arc<dyn CredentialStore>) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = JsonFileStore::open(dir.path().join("user_keys.json"))
        .await
        .expect("Failed to open store");
    for (participant_id, token) in entries {
        store.set(participant_id, token).await.expect("Failed to seed store");
    }
    (dir, Arc::new(store))
}

/// In-process stand-in for Alphabot.
///
/// Registrations succeed unless the participant is listed as failing, in which case they come
/// back as an upstream 400, or as panicking. Tracks calls and peak concurrency.
#[derive(Default)]
pub struct MockRaffleApi {
    calls: Mutex<Vec<(String, RegistrationRequest)>>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockRaffleApi {
    pub fn failing_for<const N: usize>(participants: [&str; N]) -> Self {
        Self {
            failing: participants.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Registrations for these participants panic instead of returning.
    pub fn panicking_for<const N: usize>(participants: [&str; N]) -> Self {
        Self {
            panicking: participants.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    /// `(token, request)` pairs in call order.
    pub fn calls(&self) -> Vec<(String, RegistrationRequest)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RaffleApi for MockRaffleApi {
    async fn register(&self, token: &str, request: &RegistrationRequest) -> RegistrationOutcome {
        self.calls.lock().unwrap().push((token.to_string(), request.clone()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.contains(&request.discord_id) {
            panic!("mock registration panicked for {}", request.discord_id);
        }

        let result = if self.failing.contains(&request.discord_id) {
            Err(ApiError::Upstream {
                status_code: 400,
                detail: "Raffle closed".to_string(),
                body: json!({"success": false, "error": "Raffle closed"}),
            })
        } else {
            Ok(ApiResponse {
                status_code: 200,
                body: json!({"success": true}),
            })
        };

        RegistrationOutcome {
            participant_id: request.discord_id.clone(),
            raffle_slug: request.slug.clone(),
            result,
        }
    }

    async fn get_raffle_info(&self, _token: &str, raffle_slug: &str) -> ApiResult {
        if self.failing.contains(raffle_slug) {
            return Err(ApiError::Upstream {
                status_code: 404,
                detail: "Raffle not found".to_string(),
                body: json!({"error": "Raffle not found"}),
            });
        }
        Ok(ApiResponse {
            status_code: 200,
            body: json!({"success": true, "data": {"slug": raffle_slug, "name": "Mock Raffle", "status": "active"}}),
        })
    }
}

/// Notification sink that records everything it is asked to send.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(String, String)>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingSink {
    /// A sink whose every delivery fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Successfully delivered `(participant_id, message)` pairs.
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, participant_id: &str, message: &str) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("chat platform unavailable");
        }
        self.messages
            .lock()
            .unwrap()
            .push((participant_id.to_string(), message.to_string()));
        Ok(())
    }
}
