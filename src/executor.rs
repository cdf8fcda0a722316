use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::{FutureExt, future::BoxFuture};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{
    Command, Input, Optimistic, StateMachine,
    effects::{Dispatch, Effect, Hook},
    error::TransitionError,
    machine::{ActionState, RetryToken},
    options::{ExecutorOptions, StartHook, ValueHook},
    procedure::ServerAction,
    status::StatusSnapshot,
};

/// What an attempt came to.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution<T, E> {
    /// The server action was called and returned this outcome.
    Settled(Result<T, E>),
    /// The state machine refused the attempt before anything was dispatched,
    /// typically a retry whose lineage was superseded.
    Dropped(TransitionError),
}

impl<T, E> Execution<T, E> {
    pub fn is_superseded(&self) -> bool {
        matches!(self, Execution::Dropped(err) if err.is_superseded())
    }

    pub fn into_result(self) -> Option<Result<T, E>> {
        match self {
            Execution::Settled(res) => Some(res),
            Execution::Dropped(_) => None,
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Execution::Settled(Ok(data)) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Execution::Settled(Err(err)) => Some(err),
            _ => None,
        }
    }
}

struct Hooks<T, E> {
    on_start: Option<StartHook>,
    on_success: Option<ValueHook<T>>,
    on_error: Option<ValueHook<E>>,
}

struct Shared<I, T, E> {
    action: Box<dyn ServerAction<I, Data = T, Error = E>>,
    state: Mutex<ActionState<T, E>>,
    hooks: Hooks<T, E>,
    status: watch::Sender<StatusSnapshot<T, E>>,
}

/// Drives one server action through the [`ActionState`] machine.
///
/// Handles are cheap to clone and share the same state. Retries are spawned
/// onto the ambient Tokio runtime, so [`execute`](Self::execute) must run
/// inside one with the timer enabled.
pub struct ActionExecutor<I, T, E> {
    shared: Arc<Shared<I, T, E>>,
}

impl<I, T, E> Clone for ActionExecutor<I, T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<I, T, E> fmt::Debug for ActionExecutor<I, T, E>
where
    T: fmt::Debug,
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("state", &*self.shared.lock())
            .finish_non_exhaustive()
    }
}

impl<I, T, E> ActionExecutor<I, T, E>
where
    I: Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new<A>(action: A, options: ExecutorOptions<T, E>) -> Self
    where
        A: ServerAction<I, Data = T, Error = E>,
    {
        let ExecutorOptions {
            on_start,
            on_success,
            on_error,
            initial_data,
            retry,
        } = options;

        let state = ActionState::new(initial_data, retry);
        let (status, _) = watch::channel(state.status());

        Self {
            shared: Arc::new(Shared {
                action: Box::new(action),
                state: Mutex::new(state),
                hooks: Hooks {
                    on_start,
                    on_success,
                    on_error,
                },
                status,
            }),
        }
    }

    /// Start a fresh lineage and await its first attempt.
    ///
    /// Any retry that attempt schedules runs in the background; follow it
    /// through [`subscribe`](Self::subscribe). Starting a fresh lineage
    /// supersedes every retry still waiting from earlier ones.
    pub async fn execute(&self, input: I) -> Execution<T, E> {
        Arc::clone(&self.shared)
            .attempt(input, Command::Execute)
            .await
    }

    /// Overwrite the committed data with `data` until the call in flight
    /// settles. A failure that ends the lineage restores the result from
    /// before the first optimistic update.
    pub fn set_optimistic(&self, data: T) {
        self.shared.apply_silent(Command::SetOptimistic(Optimistic::Value(data)));
    }

    /// Like [`set_optimistic`](Self::set_optimistic), computing the value
    /// from the currently committed data.
    pub fn update_optimistic<F>(&self, f: F)
    where
        F: FnOnce(Option<&T>) -> T + Send + 'static,
    {
        self.shared
            .apply_silent(Command::SetOptimistic(Optimistic::Update(Box::new(f))));
    }

    /// Back to the empty state. Retries still waiting are dropped when they
    /// fire. No callbacks run.
    pub fn reset(&self) {
        self.shared.apply_silent(Command::Reset);
    }

    pub fn status(&self) -> StatusSnapshot<T, E> {
        self.shared.lock().status()
    }

    /// Status updates, published after every transition.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot<T, E>> {
        self.shared.status.subscribe()
    }

    /// Run `f` against the current state.
    pub fn inspect<R>(&self, f: impl FnOnce(&ActionState<T, E>) -> R) -> R {
        f(&*self.shared.lock())
    }
}

impl<I, T, E> Shared<I, T, E> {
    fn lock(&self) -> MutexGuard<'_, ActionState<T, E>> {
        // every transition leaves the state valid, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<I, T, E> Shared<I, T, E>
where
    I: Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn apply(&self, input: Input<T, E>) -> Result<Vec<Effect<T, E>>, TransitionError> {
        let mut effects = Vec::new();
        let snapshot = {
            let mut state = self.lock();
            state.stf(input, &mut effects)?;
            state.status()
        };
        self.status.send_replace(snapshot);
        Ok(effects)
    }

    fn apply_silent(&self, command: Command<T>) {
        match self.apply(Input::Normal(command)) {
            Ok(effects) => debug_assert!(effects.is_empty()),
            Err(err) => warn!(%err, "transition rejected"),
        }
    }

    fn attempt(
        self: Arc<Self>,
        input: I,
        command: Command<T>,
    ) -> BoxFuture<'static, Execution<T, E>> {
        async move {
            let effects = match self.apply(Input::Normal(command)) {
                Ok(effects) => effects,
                Err(err) => {
                    debug!(%err, "attempt dropped");
                    return Execution::Dropped(err);
                }
            };

            let mut dispatch = None;
            for effect in effects {
                match effect {
                    Effect::Tracked(d) => dispatch = Some(d),
                    Effect::Untracked(hook) => self.run_hook(hook, &input),
                }
            }

            let Some(Dispatch { token, attempt }) = dispatch else {
                warn!("transition emitted no dispatch");
                return Execution::Dropped(TransitionError::NotDispatched);
            };

            debug!(%token, attempt, "dispatching server action");
            let res = self.action.call(input.clone()).await;
            debug!(%token, attempt, ok = res.is_ok(), "server action settled");

            match self.apply(Input::TrackedActionCompleted {
                id: token,
                res: res.clone(),
            }) {
                Ok(effects) => {
                    for effect in effects {
                        match effect {
                            Effect::Untracked(hook) => self.run_hook(hook, &input),
                            Effect::Tracked(d) => {
                                warn!(token = %d.token, "unexpected dispatch on settlement")
                            }
                        }
                    }
                }
                Err(err) => warn!(%token, %err, "settlement rejected"),
            }

            Execution::Settled(res)
        }
        .boxed()
    }

    fn run_hook(self: &Arc<Self>, hook: Hook<T, E>, input: &I) {
        match hook {
            Hook::OnStart => {
                if let Some(f) = &self.hooks.on_start {
                    f();
                }
            }
            Hook::OnSuccess(data) => {
                if let Some(f) = &self.hooks.on_success {
                    f(&data);
                }
            }
            Hook::OnError(err) => {
                if let Some(f) = &self.hooks.on_error {
                    f(&err);
                }
            }
            Hook::ScheduleRetry {
                token,
                attempt,
                delay,
            } => self.schedule_retry(input.clone(), token, attempt, delay),
        }
    }

    fn schedule_retry(
        self: &Arc<Self>,
        input: I,
        token: RetryToken,
        attempt: u32,
        delay: Duration,
    ) {
        debug!(%token, attempt, delay_ms = delay.as_millis() as u64, "retry scheduled");
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let execution = shared.attempt(input, Command::Retry { token }).await;
            if execution.is_superseded() {
                debug!(%token, attempt, "retry superseded");
            }
        });
    }
}
