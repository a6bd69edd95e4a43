//! HTTP log sink
//!
//! Ships events to a remote endpoint as JSON POSTs. `emit` only enqueues into
//! a bounded channel; a background worker does the delivery with a bounded
//! number of attempts and exponential backoff. Events that cannot be queued
//! or delivered are dropped. Local failure warnings are rate-limited so an
//! unreachable endpoint cannot flood the logs.

use super::{LogEvent, LogSink};
use crate::config::TelemetryConfig;
use anyhow::{anyhow, Context};
use sdk::AgentError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Check if an HTTP status code is worth another attempt
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Delivery settings
#[derive(Debug, Clone)]
pub struct HttpSinkSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub queue_capacity: usize,
    pub error_log_interval: Duration,
    pub request_timeout: Duration,
}

impl HttpSinkSettings {
    /// Settings with the default delivery policy
    pub fn new(endpoint: impl Into<String>) -> Self {
        let defaults = TelemetryConfig::default();
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            max_attempts: defaults.max_attempts,
            retry_backoff: defaults.retry_backoff(),
            queue_capacity: defaults.queue_capacity,
            error_log_interval: defaults.error_log_interval(),
            request_timeout: defaults.request_timeout(),
        }
    }
}

/// Lets at most one warning through per interval
#[derive(Debug)]
struct ErrorLogLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
    suppressed: AtomicU64,
}

impl ErrorLogLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
            suppressed: AtomicU64::new(0),
        }
    }

    fn report(&self, error: &AgentError) {
        let now = Instant::now();
        let mut last = self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let due = (*last).map_or(true, |at| now.duration_since(at) >= self.interval);
        if due {
            *last = Some(now);
            let suppressed = self.suppressed.swap(0, Ordering::Relaxed);
            if suppressed > 0 {
                warn!("{} ({} similar failures suppressed)", error, suppressed);
            } else {
                warn!("{}", error);
            }
        } else {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Log sink delivering events over HTTP
pub struct HttpLogSink {
    tx: Mutex<Option<mpsc::Sender<LogEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    limiter: Arc<ErrorLogLimiter>,
    dropped: Arc<AtomicU64>,
}

impl HttpLogSink {
    /// Build from the `[telemetry]` section
    ///
    /// # Errors
    /// `Config` when no endpoint is configured or no tokio runtime is running.
    pub fn from_config(config: &TelemetryConfig) -> Result<Self, AgentError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| AgentError::Config("telemetry.endpoint is not set".to_string()))?;

        Self::spawn(HttpSinkSettings {
            endpoint,
            api_key: config.api_key.clone(),
            max_attempts: config.max_attempts,
            retry_backoff: config.retry_backoff(),
            queue_capacity: config.queue_capacity,
            error_log_interval: config.error_log_interval(),
            request_timeout: config.request_timeout(),
        })
    }

    /// Start the delivery worker on the current tokio runtime
    pub fn spawn(settings: HttpSinkSettings) -> Result<Self, AgentError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            AgentError::Config("The HTTP log sink requires a running tokio runtime".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let limiter = Arc::new(ErrorLogLimiter::new(settings.error_log_interval));
        let dropped = Arc::new(AtomicU64::new(0));

        let worker = runtime.spawn(run_worker(
            rx,
            client,
            settings,
            Arc::clone(&limiter),
            Arc::clone(&dropped),
        ));

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            limiter,
            dropped,
        })
    }

    /// Number of events dropped so far (queue full or delivery exhausted)
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting events and wait until the queue has been drained
    pub async fn close(&self) {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(tx);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("Log delivery worker ended abnormally: {}", e);
            }
        }
    }
}

impl LogSink for HttpLogSink {
    fn emit(&self, event: LogEvent) {
        let guard = self
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let Some(tx) = guard.as_ref() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        if let Err(e) = tx.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "worker stopped",
            };
            self.limiter.report(&AgentError::TelemetryDelivery(format!(
                "event dropped: {}",
                reason
            )));
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<LogEvent>,
    client: reqwest::Client,
    settings: HttpSinkSettings,
    limiter: Arc<ErrorLogLimiter>,
    dropped: Arc<AtomicU64>,
) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = deliver(&client, &settings, &event).await {
            dropped.fetch_add(1, Ordering::Relaxed);
            limiter.report(&AgentError::TelemetryDelivery(format!("{:#}", e)));
        }
    }
    debug!("Log delivery worker stopped");
}

/// POST one event, retrying transient failures with exponential backoff
async fn deliver(
    client: &reqwest::Client,
    settings: &HttpSinkSettings,
    event: &LogEvent,
) -> anyhow::Result<()> {
    let attempts = settings.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        if attempt > 1 {
            let backoff = settings
                .retry_backoff
                .saturating_mul(2u32.saturating_pow(attempt - 2));
            debug!(
                "Retrying {} delivery (attempt {}/{}) after {:?}",
                event.kind.as_str(),
                attempt,
                attempts,
                backoff
            );
            tokio::time::sleep(backoff).await;
        }

        let mut request = client.post(&settings.endpoint).json(event);
        if let Some(key) = &settings.api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => return Ok(()),
            Ok(response) => {
                let status = response.status().as_u16();
                let error = anyhow!("endpoint answered HTTP {}", status);
                if !is_retryable_status(status) {
                    return Err(error.context(format!("{} not delivered", event.kind.as_str())));
                }
                last_error = Some(error);
            }
            Err(e) => last_error = Some(anyhow::Error::new(e)),
        }
    }

    let error = last_error.unwrap_or_else(|| anyhow!("no delivery attempt made"));
    Err(error).with_context(|| {
        format!(
            "{} not delivered after {} attempts",
            event.kind.as_str(),
            attempts
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
    }

    #[test]
    fn test_limiter_suppresses_within_interval() {
        let limiter = ErrorLogLimiter::new(Duration::from_secs(3600));
        let error = AgentError::TelemetryDelivery("down".to_string());
        limiter.report(&error);
        limiter.report(&error);
        limiter.report(&error);
        assert_eq!(limiter.suppressed.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_limiter_lets_through_after_interval() {
        let limiter = ErrorLogLimiter::new(Duration::ZERO);
        let error = AgentError::TelemetryDelivery("down".to_string());
        limiter.report(&error);
        limiter.report(&error);
        assert_eq!(limiter.suppressed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_spawn_requires_runtime() {
        let result = HttpLogSink::spawn(HttpSinkSettings::new("http://localhost:9/events"));
        assert!(matches!(result, Err(AgentError::Config(_))));
    }
}
