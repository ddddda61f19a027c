mod sizing;
mod smtp;
mod templates;

pub use sizing::PositionSizing;
pub use smtp::SmtpNotifier;
pub use templates::EmailTemplate;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use signal_core::{Direction, LearningReview, Session, TradePlan};

/// Upper bound on one channel's delivery of one alert
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Alert types that trigger notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlertType {
    TradePlanCreated {
        plan_id: i64,
        session: Session,
        direction: Direction,
        entry_zone_start: f64,
        entry_zone_end: f64,
        stop_loss: f64,
        tp1: f64,
        tp2: f64,
        estimated_rr: f64,
        probability_score: f64,
        sizing: PositionSizing,
    },
    RiskLimitReached {
        reason: String,
    },
    LearningReviewPublished {
        review_id: i64,
        sample_size: u32,
        low_confidence: bool,
        action_items: Vec<String>,
        report: String,
    },
}

/// A notification alert to be dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            alert_type,
            timestamp: chrono::Utc::now(),
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn plan_created(plan_id: i64, plan: &TradePlan, session: Session, sizing: PositionSizing) -> Self {
        let levels = &plan.levels;
        Self::new(
            AlertType::TradePlanCreated {
                plan_id,
                session,
                direction: plan.direction,
                entry_zone_start: levels.entry_zone_start,
                entry_zone_end: levels.entry_zone_end,
                stop_loss: levels.stop_loss,
                tp1: levels.tp1,
                tp2: levels.tp2,
                estimated_rr: plan.estimated_rr,
                probability_score: plan.probability_score,
                sizing,
            },
            format!(
                "XAUUSD {} ALERT - {}",
                plan.direction,
                plan.created_at.format("%Y-%m-%d %H:%M")
            ),
            format!(
                "Plan #{} scored {:.0} with R:R {:.2} (config v{})",
                plan_id, plan.probability_score, plan.estimated_rr, plan.config_version
            ),
        )
    }

    pub fn review_published(review_id: i64, review: &LearningReview, report: String) -> Self {
        let title = if review.low_confidence {
            format!("Learning review #{} - low confidence", review_id)
        } else {
            format!(
                "Learning review #{} - {} action item(s)",
                review_id,
                review.action_items.len()
            )
        };
        Self::new(
            AlertType::LearningReviewPublished {
                review_id,
                sample_size: review.sample_size,
                low_confidence: review.low_confidence,
                action_items: review.action_items.iter().map(|a| a.to_string()).collect(),
                report,
            },
            title,
            format!(
                "Window {} to {}",
                review.window_start.format("%Y-%m-%d"),
                review.window_end.format("%Y-%m-%d")
            ),
        )
    }
}

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError>;
    fn name(&self) -> &str;
}

/// Errors from the notification system.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("SMTP error: {0}")]
    Smtp(String),
    #[error("Discord webhook error: {0}")]
    Discord(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Configuration for the notification service.
#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub smtp_to: Vec<String>,
    pub smtp_tls: SmtpTls,
    pub discord_webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SmtpTls {
    #[default]
    StartTls,
    Tls,
    None,
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

impl NotificationConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let smtp_to = std::env::var("NOTIFICATION_EMAIL_TO")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let smtp_tls = match std::env::var("SMTP_TLS").unwrap_or_default().as_str() {
            "tls" => SmtpTls::Tls,
            "none" => SmtpTls::None,
            _ => SmtpTls::StartTls,
        };

        Self {
            smtp_host: non_empty_env("SMTP_HOST"),
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(587),
            smtp_username: non_empty_env("SMTP_USERNAME"),
            smtp_password: non_empty_env("SMTP_PASSWORD"),
            smtp_from: non_empty_env("SMTP_FROM_ADDRESS"),
            smtp_to,
            smtp_tls,
            discord_webhook_url: non_empty_env("DISCORD_WEBHOOK_URL"),
        }
    }
}

/// Dispatches alerts to every configured channel. Delivery failures and
/// timeouts are logged and never surfaced to the caller.
pub struct NotificationService {
    channels: Vec<Box<dyn NotificationChannel>>,
    timeout: Duration,
}

impl NotificationService {
    pub fn new(config: &NotificationConfig) -> Self {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

        if config.smtp_host.is_some() && config.smtp_from.is_some() && !config.smtp_to.is_empty() {
            match SmtpNotifier::new(config) {
                Ok(notifier) => {
                    tracing::info!(
                        "Email notifications enabled (SMTP -> {} recipients)",
                        config.smtp_to.len()
                    );
                    channels.push(Box::new(notifier));
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize SMTP notifier: {}", e);
                }
            }
        }

        if let Some(ref webhook_url) = config.discord_webhook_url {
            match reqwest::Client::builder().timeout(DELIVERY_TIMEOUT).build() {
                Ok(client) => {
                    channels.push(Box::new(DiscordWebhookNotifier {
                        webhook_url: webhook_url.clone(),
                        client,
                    }));
                    tracing::info!("Discord webhook notifications enabled");
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize Discord HTTP client: {}", e);
                }
            }
        }

        if channels.is_empty() {
            tracing::info!(
                "No notification channels configured (set SMTP_HOST or DISCORD_WEBHOOK_URL)"
            );
        }

        Self::with_channels(channels)
    }

    pub fn with_channels(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self {
            channels,
            timeout: DELIVERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// No channels; every alert is dropped.
    pub fn disabled() -> Self {
        Self::with_channels(Vec::new())
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Send alert to all channels, awaiting completion. Each channel gets
    /// at most the service timeout.
    pub async fn send_alert_async(&self, alert: &Alert) {
        dispatch(&self.channels, alert, self.timeout).await;
    }
}

async fn dispatch(channels: &[Box<dyn NotificationChannel>], alert: &Alert, timeout: Duration) {
    for channel in channels {
        match tokio::time::timeout(timeout, channel.send(alert)).await {
            Ok(Ok(())) => tracing::debug!("Sent notification via {}", channel.name()),
            Ok(Err(e)) => {
                tracing::warn!("Failed to send notification via {}: {}", channel.name(), e)
            }
            Err(_) => tracing::warn!(
                "Notification via {} timed out after {:?}",
                channel.name(),
                timeout
            ),
        }
    }
}

/// Discord webhook notifier.
struct DiscordWebhookNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

fn embed_color(alert_type: &AlertType) -> u32 {
    match alert_type {
        AlertType::TradePlanCreated { direction, .. } => match direction {
            Direction::Short => 0xe94560,
            Direction::Long => 0x22c55e,
        },
        AlertType::RiskLimitReached { .. } => 0xff6600,
        AlertType::LearningReviewPublished { low_confidence, .. } => {
            if *low_confidence {
                0x94a3b8
            } else {
                0x0099ff
            }
        }
    }
}

fn discord_description(alert: &Alert) -> String {
    match &alert.alert_type {
        AlertType::TradePlanCreated {
            session,
            entry_zone_start,
            entry_zone_end,
            stop_loss,
            tp1,
            tp2,
            estimated_rr,
            probability_score,
            sizing,
            ..
        } => format!(
            "{}\nSession: {}\nEntry: {:.2} - {:.2}\nStop: {:.2}\nTP1: {:.2}  TP2: {:.2}\nR:R {:.2}  Score {:.0}\nSize: {:.2} lots (risk ${:.2})",
            alert.message,
            session,
            entry_zone_start,
            entry_zone_end,
            stop_loss,
            tp1,
            tp2,
            estimated_rr,
            probability_score,
            sizing.lot_size,
            sizing.risk_amount
        ),
        AlertType::RiskLimitReached { reason } => format!("{}\n{}", alert.message, reason),
        AlertType::LearningReviewPublished {
            sample_size,
            action_items,
            ..
        } => {
            let mut text = format!("{}\nSample size: {}", alert.message, sample_size);
            for item in action_items {
                text.push_str("\n- ");
                text.push_str(item);
            }
            text
        }
    }
}

#[async_trait]
impl NotificationChannel for DiscordWebhookNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError> {
        let payload = serde_json::json!({
            "embeds": [{
                "title": alert.title,
                "description": discord_description(alert),
                "color": embed_color(&alert.alert_type),
                "timestamp": alert.timestamp.to_rfc3339(),
            }]
        });

        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| NotificationError::Discord(e.to_string()))?;

        Ok(())
    }

    fn name(&self) -> &str {
        "discord-webhook"
    }
}
