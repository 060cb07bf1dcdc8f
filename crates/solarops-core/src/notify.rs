// Outbound fault notifications
//
// After a workflow run commits a new ticket, the engine hands a
// FaultNotification to the configured FaultNotifier. Delivery problems are
// reported to the caller of `notify` and never affect the committed ticket.

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::WebhookConfig;
use crate::error::{AutomationError, Result};
use crate::fault::{FaultRecord, Severity};
use crate::retry::RetryPolicy;
use crate::ticket::Ticket;
use crate::workflow::WorkflowResult;

/// Webhook payload for one new fault ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultNotification {
    pub panel_id: Option<String>,
    /// Uppercase severity, e.g. "HIGH"
    pub severity: String,
    pub fault_type: String,
    pub description: String,
    /// RFC 3339 detection time in UTC
    pub timestamp: String,
    pub zone: String,
    pub row: u32,
    pub ticket_number: String,
    pub ticket_id: Uuid,
    pub assigned_technician_id: Option<Uuid>,
    pub incident_id: String,
}

impl FaultNotification {
    pub fn from_records(fault: &FaultRecord, ticket: &Ticket, result: &WorkflowResult) -> Self {
        let severity = Severity::parse(&fault.severity)
            .map(|s| s.as_upper().to_string())
            .unwrap_or_else(|| fault.severity.trim().to_uppercase());
        Self {
            panel_id: fault.panel_id.clone(),
            severity,
            fault_type: fault.fault_type.clone(),
            description: fault.analysis_text.clone(),
            timestamp: fault
                .detected_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            zone: fault.location.zone.clone(),
            row: fault.location.row,
            ticket_number: ticket.ticket_number.clone(),
            ticket_id: ticket.id,
            assigned_technician_id: result.assigned_technician_id,
            incident_id: result.incident_id.clone(),
        }
    }

    pub fn severity_level(&self) -> Option<Severity> {
        Severity::parse(&self.severity)
    }
}

/// Result of a single notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Delivered { status: u16, attempts: u32 },
    Skipped { reason: String },
}

/// Sink for fault notifications
#[async_trait]
pub trait FaultNotifier: Send + Sync {
    async fn notify(&self, notification: &FaultNotification) -> Result<NotificationOutcome>;

    /// Send each notification in order; one failure does not stop the rest
    async fn notify_batch(
        &self,
        notifications: &[FaultNotification],
    ) -> Vec<Result<NotificationOutcome>> {
        let mut outcomes = Vec::with_capacity(notifications.len());
        for notification in notifications {
            outcomes.push(self.notify(notification).await);
        }
        outcomes
    }
}

/// Posts notifications as JSON to a webhook URL
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    min_severity: Severity,
    retry: RetryPolicy,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!(
                "solarops-fault-notifier/",
                env!("CARGO_PKG_VERSION")
            )),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                AutomationError::notification(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            url: config.url.clone(),
            min_severity: config.min_severity,
            retry: RetryPolicy::exponential().with_max_attempts(config.max_attempts),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn skip_reason(&self, notification: &FaultNotification) -> Option<String> {
        match notification.severity_level() {
            None => Some(format!("unrecognised severity {}", notification.severity)),
            Some(level) if level < self.min_severity => Some(format!(
                "severity {} below threshold {}",
                level.as_upper(),
                self.min_severity.as_upper()
            )),
            Some(_) => None,
        }
    }
}

#[async_trait]
impl FaultNotifier for WebhookNotifier {
    async fn notify(&self, notification: &FaultNotification) -> Result<NotificationOutcome> {
        if let Some(reason) = self.skip_reason(notification) {
            debug!(ticket_id = %notification.ticket_id, reason = %reason, "Notification skipped");
            return Ok(NotificationOutcome::Skipped { reason });
        }

        let mut attempt = 1;
        loop {
            let delay = self.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let last_error = match self.client.post(&self.url).json(notification).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(
                        ticket_id = %notification.ticket_id,
                        status = response.status().as_u16(),
                        attempts = attempt,
                        "Fault notification delivered"
                    );
                    return Ok(NotificationOutcome::Delivered {
                        status: response.status().as_u16(),
                        attempts: attempt,
                    });
                }
                Ok(response) if response.status().is_client_error() => {
                    return Err(AutomationError::notification(format!(
                        "webhook rejected notification for {}: HTTP {}",
                        notification.ticket_number,
                        response.status()
                    )));
                }
                Ok(response) => format!("HTTP {}", response.status()),
                Err(e) => e.to_string(),
            };

            if !self.retry.has_attempts_remaining(attempt) {
                return Err(AutomationError::notification(format!(
                    "webhook delivery for {} failed after {} attempt(s): {}",
                    notification.ticket_number, attempt, last_error
                )));
            }
            warn!(
                ticket_id = %notification.ticket_id,
                attempt,
                error = %last_error,
                "Fault notification failed, retrying"
            );
            attempt += 1;
        }
    }
}
