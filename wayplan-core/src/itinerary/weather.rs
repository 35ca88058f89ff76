use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::time::timeout;
use tracing::warn;

use crate::providers::{DateRange, ProviderError, ProviderResult, RetryPolicy, WeatherProvider};

use super::models::{Severity, WeatherAlert};

/// Outcome of one gate evaluation. Evaluated at generation time and again
/// at confirmation time.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Proceed without caller interaction; an `info` alert may still be
    /// attached to the aggregate.
    Proceed { alert: Option<WeatherAlert> },
    /// Persist as draft, but confirmation needs an explicit acknowledgement.
    NeedsAck(WeatherAlert),
    /// Severity `danger`: nothing may be persisted as confirmed.
    Reject(WeatherAlert),
}

impl GateDecision {
    pub fn alert(&self) -> Option<&WeatherAlert> {
        match self {
            GateDecision::Proceed { alert } => alert.as_ref(),
            GateDecision::NeedsAck(alert) | GateDecision::Reject(alert) => Some(alert),
        }
    }
}

pub struct WeatherGate {
    provider: Arc<dyn WeatherProvider>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl WeatherGate {
    pub fn new(
        provider: Arc<dyn WeatherProvider>,
        retry: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            retry,
            call_timeout,
        }
    }

    pub fn window_for(start: DateTime<Utc>, duration_days: u32) -> DateRange {
        DateRange {
            from: start,
            to: start + ChronoDuration::days(duration_days as i64),
        }
    }

    /// Weather is advisory: a provider failure or timeout degrades to "no
    /// alert" rather than blocking the request.
    pub async fn evaluate(&self, destination: &str, range: DateRange) -> GateDecision {
        let alert = match self.fetch_alert(destination, range).await {
            Ok(alert) => alert,
            Err(error) => {
                warn!(
                    target: "itinerary.gate",
                    destination,
                    %error,
                    "weather provider unavailable, proceeding without alert"
                );
                None
            }
        };

        match alert {
            None => GateDecision::Proceed { alert: None },
            Some(alert) => match alert.severity {
                Severity::Danger => GateDecision::Reject(alert),
                Severity::Warning => GateDecision::NeedsAck(alert),
                Severity::Info => GateDecision::Proceed { alert: Some(alert) },
            },
        }
    }

    /// Collapses the provider's reports into at most one alert, keeping the
    /// highest severity.
    async fn fetch_alert(
        &self,
        destination: &str,
        range: DateRange,
    ) -> ProviderResult<Option<WeatherAlert>> {
        let call_timeout = self.call_timeout;
        let provider = &self.provider;
        let reports = self
            .retry
            .run("weather.forecast", |_| async move {
                match timeout(call_timeout, provider.forecast(destination, range)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(call_timeout)),
                }
            })
            .await?;

        Ok(reports
            .into_iter()
            .max_by_key(|report| report.severity)
            .map(|report| WeatherAlert {
                severity: report.severity,
                title: report
                    .title
                    .unwrap_or_else(|| format!("{} weather advisory", report.severity)),
                message: report.message,
                from: report.window.map(|window| window.from),
                to: report.window.map(|window| window.to),
                tags: report.tags,
            }))
    }
}
