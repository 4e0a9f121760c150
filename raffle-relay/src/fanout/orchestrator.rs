use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use metrics::counter;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::{EventDisposition, FanoutReport, FanoutState};
use crate::alphabot::{ApiError, RaffleApi, RegistrationOutcome, RegistrationRequest};
use crate::config::FanoutConfig;
use crate::notifications::{NotificationSink, format_outcome_message};
use crate::storage::CredentialStore;
use crate::webhooks::{RaffleEventType, RaffleWebhookPayload};

#[derive(Clone)]
pub struct FanoutOrchestrator {
    store: Arc<dyn CredentialStore>,
    api: Arc<dyn RaffleApi>,
    sink: Arc<dyn NotificationSink>,
    max_concurrency: usize,
    timeout: Duration,
    tracker: TaskTracker,
}

impl FanoutOrchestrator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        api: Arc<dyn RaffleApi>,
        sink: Arc<dyn NotificationSink>,
        config: &FanoutConfig,
    ) -> Self {
        Self {
            store,
            api,
            sink,
            max_concurrency: config.max_concurrency.max(1),
            timeout: config.timeout,
            tracker: TaskTracker::new(),
        }
    }

    /// Handle a verified webhook event.
    ///
    /// Activation events are fanned out in a tracked background task; this waits for it up to
    /// `fanout.timeout` and then lets it carry on alone. Errors only if the run itself panicked.
    pub async fn process(&self, payload: &RaffleWebhookPayload) -> anyhow::Result<EventDisposition> {
        if payload.event_type() != Some(RaffleEventType::RaffleActive) {
            info!(event = %payload.event, "Ignoring unrecognised webhook event");
            return Ok(EventDisposition::Ignored {
                event: payload.event.clone(),
            });
        }

        let Some(raffle_slug) = payload.raffle_slug() else {
            warn!(event = %payload.event, "Activation event has no raffle slug, nothing to do");
            return Ok(EventDisposition::MissingSlug);
        };
        let raffle_slug = raffle_slug.to_string();
        let raffle_name = payload.raffle().and_then(|r| r.name.clone()).unwrap_or_default();

        let run_id = Uuid::new_v4();
        let span = info_span!("fanout", %run_id, raffle_slug = %raffle_slug, raffle_name = %raffle_name);

        let this = self.clone();
        let slug = raffle_slug.clone();
        let run = self.tracker.spawn(
            async move {
                let report = this.dispatch(&slug).await;
                this.notify(&report);
                report
            }
            .instrument(span),
        );

        match tokio::time::timeout(self.timeout, run).await {
            Ok(joined) => Ok(EventDisposition::Completed(joined.context("fan-out task failed")?)),
            Err(_) => {
                warn!(
                    raffle_slug = %raffle_slug,
                    timeout = ?self.timeout,
                    "Fan-out still running at response deadline, continuing in background"
                );
                Ok(EventDisposition::StillDispatching { raffle_slug })
            }
        }
    }

    /// Register every enrolled participant for `raffle_slug`.
    ///
    /// Returns exactly one outcome per participant in the store snapshot, in completion order.
    pub async fn dispatch(&self, raffle_slug: &str) -> FanoutReport {
        let participants = self.store.list_all().await;

        if participants.is_empty() {
            info!(state = %FanoutState::Completed, raffle_slug, "No enrolled participants");
            return FanoutReport {
                raffle_slug: raffle_slug.to_string(),
                outcomes: Vec::new(),
            };
        }

        info!(
            state = %FanoutState::Dispatching,
            raffle_slug,
            participants = participants.len(),
            max_concurrency = self.max_concurrency,
            "Dispatching raffle registrations"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles = Vec::with_capacity(participants.len());

        for (participant_id, token) in participants {
            let api = self.api.clone();
            let semaphore = semaphore.clone();
            let request = RegistrationRequest::builder()
                .slug(raffle_slug)
                .discord_id(participant_id.clone())
                .build();

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("fan-out semaphore is never closed");
                api.register(&token, &request).await
            });
            handles.push((participant_id, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (participant_id, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(participant_id, raffle_slug, error = %e, "Registration task failed");
                    RegistrationOutcome {
                        participant_id,
                        raffle_slug: raffle_slug.to_string(),
                        result: Err(ApiError::Transport(format!("registration task failed: {e}"))),
                    }
                }
            };

            let label = if outcome.succeeded() { "success" } else { "failure" };
            counter!("raffle_relay_registrations_total", "outcome" => label).increment(1);
            outcomes.push(outcome);
        }

        let report = FanoutReport {
            raffle_slug: raffle_slug.to_string(),
            outcomes,
        };
        info!(
            state = %FanoutState::Completed,
            raffle_slug,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Fan-out complete"
        );
        report
    }

    /// Send one notification per outcome, each as its own tracked task.
    ///
    /// Sink failures are logged and go no further.
    pub fn notify(&self, report: &FanoutReport) {
        for outcome in &report.outcomes {
            let sink = self.sink.clone();
            let participant_id = outcome.participant_id.clone();
            let message = format_outcome_message(outcome);

            self.tracker.spawn(
                async move {
                    match sink.send(&participant_id, &message).await {
                        Ok(()) => debug!(participant_id, "Notification delivered"),
                        Err(e) => warn!(participant_id, error = %e, "Failed to deliver notification"),
                    }
                }
                .in_current_span(),
            );
        }
    }

    /// Stop accepting new background work and wait for running fan-outs and notifications.
    pub async fn shutdown(&self) {
        self.tracker.close();
        if !self.tracker.is_empty() {
            info!(tasks = self.tracker.len(), "Waiting for background fan-outs to finish");
        }
        self.tracker.wait().await;
    }
}
