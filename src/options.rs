use std::{fmt, sync::Arc};

use crate::retry::RetryPolicy;

pub type StartHook = Arc<dyn Fn() + Send + Sync>;
pub type ValueHook<V> = Arc<dyn Fn(&V) + Send + Sync>;

/// Static configuration of an [`ActionExecutor`](crate::ActionExecutor).
///
/// At most one of each callback fires per attempt, so a plain optional
/// function is all each extension point needs.
///
/// Callbacks run after the transition that triggers them has committed,
/// outside the executor's lock. `on_start` therefore observes
/// [`Status::Pending`](crate::Status::Pending) and `on_success` observes the
/// committed data through [`ActionExecutor::status`](crate::ActionExecutor::status).
/// A callback may call back into the executor.
///
/// ```
/// # use std::time::Duration;
/// # use actionstate::{ExecutorOptions, RetryPolicy};
/// let options = ExecutorOptions::<String, String>::new()
///     .on_error(|err| eprintln!("attempt failed: {}", err))
///     .retry(RetryPolicy::new(2).with_delay(Duration::from_millis(100)));
/// ```
pub struct ExecutorOptions<T, E> {
    pub(crate) on_start: Option<StartHook>,
    pub(crate) on_success: Option<ValueHook<T>>,
    pub(crate) on_error: Option<ValueHook<E>>,
    pub(crate) initial_data: Option<T>,
    pub(crate) retry: Option<RetryPolicy<E>>,
}

impl<T, E> ExecutorOptions<T, E> {
    pub fn new() -> Self {
        Self {
            on_start: None,
            on_success: None,
            on_error: None,
            initial_data: None,
            retry: None,
        }
    }

    /// Runs before every attempt, retries included, once the attempt is
    /// already pending.
    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_start = Some(Arc::new(f));
        self
    }

    /// Runs once the successful result is committed.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(f));
        self
    }

    /// Runs after every failed attempt, including ones that will be retried.
    /// A terminal failure is committed before it runs.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Committed as a successful result before the first call.
    pub fn initial_data(mut self, data: T) -> Self {
        self.initial_data = Some(data);
        self
    }

    pub fn retry(mut self, policy: impl Into<RetryPolicy<E>>) -> Self {
        self.retry = Some(policy.into());
        self
    }
}

impl<T, E> Default for ExecutorOptions<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug, E> fmt::Debug for ExecutorOptions<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorOptions")
            .field("on_start", &self.on_start.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("initial_data", &self.initial_data)
            .field("retry", &self.retry.as_ref().map(|p| p.max_attempts))
            .finish()
    }
}
