use std::{fmt, sync::Arc, time::Duration};

use backon::BackoffBuilder;
use serde::{Deserialize, Serialize};

/// Computes the delay before retry number `attempt` (1-based) from the error
/// that triggered it.
pub type DelayFn<E> = Arc<dyn Fn(u32, &E) -> Duration + Send + Sync>;

pub enum RetryDelay<E> {
    /// Retry as soon as the runtime gets to it.
    None,
    Fixed(Duration),
    Computed(DelayFn<E>),
}

impl<E> RetryDelay<E> {
    pub fn for_attempt(&self, attempt: u32, err: &E) -> Duration {
        match self {
            RetryDelay::None => Duration::ZERO,
            RetryDelay::Fixed(delay) => *delay,
            RetryDelay::Computed(f) => f(attempt, err),
        }
    }
}

impl<E> Clone for RetryDelay<E> {
    fn clone(&self) -> Self {
        match self {
            RetryDelay::None => RetryDelay::None,
            RetryDelay::Fixed(delay) => RetryDelay::Fixed(*delay),
            RetryDelay::Computed(f) => RetryDelay::Computed(Arc::clone(f)),
        }
    }
}

impl<E> fmt::Debug for RetryDelay<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryDelay::None => f.write_str("None"),
            RetryDelay::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            RetryDelay::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// How many times a failed lineage is retried, and how long to wait first.
///
/// `max_attempts` counts retries, not calls: a policy of `2` allows up to
/// three calls to the server action per fresh execution.
#[derive(Debug, Clone)]
pub struct RetryPolicy<E> {
    pub max_attempts: u32,
    pub delay: RetryDelay<E>,
}

impl<E> RetryPolicy<E> {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: RetryDelay::None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = RetryDelay::Fixed(delay);
        self
    }

    pub fn with_delay_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, &E) -> Duration + Send + Sync + 'static,
    {
        self.delay = RetryDelay::Computed(Arc::new(f));
        self
    }

    /// Derive delays from a `backon` builder.
    ///
    /// Retry `n` waits for the `n`-th delay the built backoff yields. Once the
    /// builder's own `max_times` is exhausted the delay drops to zero, so keep
    /// it at or above `max_attempts`.
    pub fn with_backoff<B>(self, builder: B) -> Self
    where
        B: BackoffBuilder + Clone + Send + Sync + 'static,
    {
        self.with_delay_fn(move |attempt, _| {
            let nth = attempt.saturating_sub(1) as usize;
            builder.clone().build().nth(nth).unwrap_or_default()
        })
    }

    pub fn should_retry(&self, retries_so_far: u32) -> bool {
        retries_so_far < self.max_attempts
    }

    pub fn delay_for(&self, attempt: u32, err: &E) -> Duration {
        self.delay.for_attempt(attempt, err)
    }
}

/// Serializable form of a [`RetryPolicy`] for configuration files.
///
/// ```
/// # use actionstate::RetrySettings;
/// let settings: RetrySettings =
///     serde_json::from_str(r#"{"max_attempts": 3, "delay_ms": 250}"#).unwrap();
/// assert_eq!(settings.max_attempts, 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

impl<E> From<RetrySettings> for RetryPolicy<E> {
    fn from(settings: RetrySettings) -> Self {
        let policy = RetryPolicy::new(settings.max_attempts);
        match settings.delay_ms {
            Some(ms) => policy.with_delay(Duration::from_millis(ms)),
            None => policy,
        }
    }
}
