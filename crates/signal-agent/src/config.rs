use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use learning_aggregator::ReviewSettings;
use notification_service::NotificationConfig;
use setup_evaluator::{EvaluatorConfig, SessionClock};
use trade_journal::RetryPolicy;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    // Storage
    pub database_url: String,
    pub storage_max_retries: u32,
    pub storage_retry_base_ms: u64,

    // Evaluator seed (version 1 only)
    pub evaluator_config_path: Option<PathBuf>,

    // Learning review
    pub review: ReviewSettings,
    pub breakeven_band_r: f64,

    // Risk guard
    pub max_plans_per_day: i64,
    pub consecutive_loss_stop: i64,
    /// Losing P&L percent per day after which no new plans are created
    pub max_daily_drawdown_percent: f64,

    // Position sizing shown in alerts
    pub account_balance: f64,
    pub risk_per_trade_percent: f64,

    pub session_clock: SessionClock,
    pub notifications: NotificationConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:signals.db".to_string(),
            storage_max_retries: 3,
            storage_retry_base_ms: 50,
            evaluator_config_path: None,
            review: ReviewSettings::default(),
            breakeven_band_r: 0.1,
            max_plans_per_day: 3,
            consecutive_loss_stop: 3,
            max_daily_drawdown_percent: 2.0,
            account_balance: 10_000.0,
            risk_per_trade_percent: 0.5,
            session_clock: SessionClock::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        _ => Ok(default),
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            storage_max_retries: parsed("STORAGE_MAX_RETRIES", defaults.storage_max_retries)?,
            storage_retry_base_ms: parsed("STORAGE_RETRY_BASE_MS", defaults.storage_retry_base_ms)?,

            evaluator_config_path: env::var("EVALUATOR_CONFIG_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),

            review: ReviewSettings {
                min_sample: parsed("REVIEW_MIN_SAMPLE", defaults.review.min_sample)?,
                win_rate_margin: parsed("REVIEW_WIN_RATE_MARGIN", defaults.review.win_rate_margin)?,
                min_support: parsed("REVIEW_MIN_SUPPORT", defaults.review.min_support)?,
            },
            breakeven_band_r: parsed("BREAKEVEN_BAND_R", defaults.breakeven_band_r)?,

            max_plans_per_day: parsed("MAX_PLANS_PER_DAY", defaults.max_plans_per_day)?,
            consecutive_loss_stop: parsed("CONSECUTIVE_LOSS_STOP", defaults.consecutive_loss_stop)?,
            max_daily_drawdown_percent: parsed(
                "MAX_DAILY_DRAWDOWN_PERCENT",
                defaults.max_daily_drawdown_percent,
            )?,

            account_balance: parsed("ACCOUNT_BALANCE", defaults.account_balance)?,
            risk_per_trade_percent: parsed("RISK_PER_TRADE_PERCENT", defaults.risk_per_trade_percent)?,

            session_clock: defaults.session_clock,
            notifications: NotificationConfig::from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            bail!("DATABASE_URL must not be empty");
        }
        if !(0.0..1.0).contains(&self.review.win_rate_margin) {
            bail!(
                "REVIEW_WIN_RATE_MARGIN must be in [0, 1), got {}",
                self.review.win_rate_margin
            );
        }
        if !(self.breakeven_band_r >= 0.0 && self.breakeven_band_r.is_finite()) {
            bail!("BREAKEVEN_BAND_R must be a non-negative number");
        }
        if self.max_plans_per_day < 0 || self.consecutive_loss_stop < 0 {
            bail!("MAX_PLANS_PER_DAY and CONSECUTIVE_LOSS_STOP must be >= 0 (0 disables)");
        }
        if !(self.max_daily_drawdown_percent >= 0.0 && self.max_daily_drawdown_percent <= 100.0) {
            bail!("MAX_DAILY_DRAWDOWN_PERCENT must be in [0, 100] (0 disables)");
        }
        if !(self.account_balance > 0.0) {
            bail!("ACCOUNT_BALANCE must be positive");
        }
        if !(self.risk_per_trade_percent > 0.0 && self.risk_per_trade_percent <= 100.0) {
            bail!("RISK_PER_TRADE_PERCENT must be in (0, 100]");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.storage_max_retries,
            Duration::from_millis(self.storage_retry_base_ms),
        )
    }

    /// Configuration used when the journal holds no version yet
    pub fn seed_evaluator_config(&self) -> Result<EvaluatorConfig> {
        match &self.evaluator_config_path {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                EvaluatorConfig::from_json(&json)
                    .with_context(|| format!("Invalid evaluator config in {}", path.display()))
            }
            None => Ok(EvaluatorConfig::default()),
        }
    }
}
