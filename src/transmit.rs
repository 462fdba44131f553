//! Periodic timestamp transmission.
//!
//! [`AutoTransmit`] sends the current UTC time through any [`Endpoint`] on a
//! fixed period. Ticks that find no peer are skipped; the task keeps running
//! so transmission resumes once a peer connects.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::transport::Endpoint;

// ============================================================================
// TransmitInterval
// ============================================================================

/// Period between automatic transmissions, 30 seconds to 10 minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransmitInterval(Duration);

impl TransmitInterval {
    /// Shortest interval.
    pub const MIN: Self = Self(Duration::from_secs(30));

    /// Longest interval.
    pub const MAX: Self = Self(Duration::from_secs(600));

    /// Span covered by the fraction.
    const RANGE_SECS: f64 = 570.0;

    /// Maps a slider position in `[0, 1]` to an interval.
    ///
    /// Out-of-range values are clamped; NaN maps to [`MIN`](Self::MIN).
    #[must_use]
    pub fn from_fraction(fraction: f64) -> Self {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };

        Self(Self::MIN.0 + Duration::from_secs_f64(fraction * Self::RANGE_SECS))
    }

    /// Creates an interval from a duration, clamped to `MIN..=MAX`.
    #[must_use]
    pub fn from_duration(duration: Duration) -> Self {
        Self(duration.clamp(Self::MIN.0, Self::MAX.0))
    }

    /// Inverse of [`from_fraction`](Self::from_fraction).
    #[must_use]
    pub fn fraction(self) -> f64 {
        (self.0 - Self::MIN.0).as_secs_f64() / Self::RANGE_SECS
    }

    /// Returns the period.
    #[inline]
    #[must_use]
    pub const fn as_duration(self) -> Duration {
        self.0
    }
}

impl Default for TransmitInterval {
    fn default() -> Self {
        Self::MIN
    }
}

impl From<TransmitInterval> for Duration {
    fn from(interval: TransmitInterval) -> Self {
        interval.0
    }
}

/// Formats as e.g. `"1 minute, 30 seconds"`.
impl fmt::Display for TransmitInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.as_secs();
        let (minutes, seconds) = (total / 60, total % 60);
        let plural = |n: u64| if n == 1 { "" } else { "s" };

        match (minutes, seconds) {
            (0, s) => write!(f, "{s} second{}", plural(s)),
            (m, 0) => write!(f, "{m} minute{}", plural(m)),
            (m, s) => write!(f, "{m} minute{}, {s} second{}", plural(m), plural(s)),
        }
    }
}

// ============================================================================
// AutoTransmit
// ============================================================================

/// Handle to a running transmit task.
///
/// Dropping the handle stops the task.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tcp_exchange::{AutoTransmit, Exchange, TransmitInterval};
///
/// # async fn example() -> tcp_exchange::Result<()> {
/// let exchange = Exchange::builder().build()?;
/// let client = exchange.client();
/// client.connect("127.0.0.1", 9090).await?;
///
/// let transmit = AutoTransmit::spawn(Arc::new(client), TransmitInterval::from_fraction(0.5))?;
/// // ...
/// transmit.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct AutoTransmit {
    /// Signals the task to stop.
    stop_tx: Option<oneshot::Sender<()>>,
    /// The transmit task.
    task: Option<JoinHandle<()>>,
    /// Tick period.
    period: Duration,
}

impl fmt::Debug for AutoTransmit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoTransmit")
            .field("period", &self.period)
            .field("running", &self.is_running())
            .finish()
    }
}

impl AutoTransmit {
    /// Starts sending a timestamp through `endpoint` every `period`.
    ///
    /// The first send happens one period from now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a zero period.
    pub fn spawn(endpoint: Arc<dyn Endpoint>, period: impl Into<Duration>) -> Result<Self> {
        let period = period.into();
        if period.is_zero() {
            return Err(Error::invalid_argument("transmit period must be > 0"));
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(Self::run(endpoint, period, stop_rx));

        Ok(Self {
            stop_tx: Some(stop_tx),
            task: Some(task),
            period,
        })
    }

    /// Returns the tick period.
    #[inline]
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns `true` until the task has finished.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the task and waits for it to finish.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "Transmit task panicked");
        }
    }

    /// Transmit loop.
    async fn run(endpoint: Arc<dyn Endpoint>, period: Duration, mut stop_rx: oneshot::Receiver<()>) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(endpoint = %endpoint.id(), ?period, "Auto-transmit started");

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,

                _ = ticker.tick() => {
                    match endpoint.send_timestamp().await {
                        Ok(stamp) => debug!(endpoint = %endpoint.id(), %stamp, "Timestamp sent"),
                        Err(e) if e.is_unconnected() => {
                            trace!(endpoint = %endpoint.id(), "No peer, tick skipped");
                        }
                        Err(e) => warn!(endpoint = %endpoint.id(), error = %e, "Timestamp send failed"),
                    }
                }
            }
        }

        info!(endpoint = %endpoint.id(), "Auto-transmit stopped");
    }
}

impl Drop for AutoTransmit {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
