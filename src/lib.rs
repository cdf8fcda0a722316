//! Lifecycle state for async server actions.
//!
//! A server action is a remote procedure called as if it were a local async
//! function, resolving to `Result<T, E>`. This crate tracks one such action
//! on behalf of a reactive consumer: whether a call is in flight, what it
//! last returned, whether the value on screen is an optimistic guess, and
//! when to try again.
//!
//! # Core Concept
//!
//! The lifecycle logic is separated from the side effects it needs:
//! - **State Transition Function**: [`StateMachine::stf`] is deterministic.
//!   It updates the committed result, the parked rollback snapshot, the
//!   executing flag and the retry bookkeeping, and emits [`Effect`]s.
//! - **Effects**: descriptions of what must happen next: call the server
//!   action ([`Effect::Tracked`]), run a callback or arm a retry timer
//!   ([`Effect::Untracked`]). They are performed *after* the transition.
//! - **Driver**: [`ActionExecutor`] owns the state, performs the effects on
//!   Tokio and feeds each call's outcome back as
//!   [`Input::TrackedActionCompleted`].
//! - **Status**: [`StatusSnapshot`] is a pure projection of the state,
//!   never stored.
//!
//! # Critical Invariants
//!
//! 1. **One live lineage**: a fresh execution mints a new [`RetryToken`];
//!    retries carrying any other token are dropped on arrival.
//! 2. **Single park**: the first optimistic update parks the committed
//!    result; later ones never overwrite it.
//! 3. **Rollback on failure**: a failure that ends a lineage restores the
//!    parked result if there is one, and commits the error otherwise.
//! 4. **STF Atomicity**: if `stf` returns `Err`, state is unchanged.
//! 5. **Restorable**: the attempt in flight can be re-emitted from the
//!    state alone with [`StateMachine::restore`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use actionstate::{ActionExecutor, ExecutorOptions, RetryPolicy};
//!
//! async fn greet(name: String) -> Result<String, String> {
//!     Ok(format!("Hello, {}", name))
//! }
//!
//! # async fn run() {
//! let executor = ActionExecutor::new(
//!     greet,
//!     ExecutorOptions::new().retry(RetryPolicy::new(2).with_delay(Duration::from_millis(100))),
//! );
//!
//! let outcome = executor.execute("Bob".to_string()).await;
//! assert_eq!(outcome.data().map(String::as_str), Some("Hello, Bob"));
//! assert!(executor.status().is_success);
//! # }
//! ```

pub mod effects;
pub mod error;
pub mod executor;
pub mod machine;
pub mod options;
pub mod procedure;
pub mod retry;
pub mod status;

use std::fmt;

pub use effects::{Dispatch, Effect, EffectsContainer, Hook};
pub use error::TransitionError;
pub use executor::{ActionExecutor, Execution};
pub use machine::{ActionResult, ActionState, Parked, RetryToken};
pub use options::ExecutorOptions;
pub use procedure::ServerAction;
pub use retry::{DelayFn, RetryDelay, RetryPolicy, RetrySettings};
pub use status::{Status, StatusSnapshot, project};

/// A deterministic state machine whose side effects are described, not
/// performed.
///
/// [`ActionState`] is the implementation this crate drives; the trait is the
/// seam between it and a driver such as [`ActionExecutor`].
pub trait StateMachine {
    /// Success type of the tracked call.
    type Data;
    /// Failure type of the tracked call.
    type Error;
    /// Why an input was refused.
    type TransitionError;

    /// The core State Transition Function.
    ///
    /// # Semantics
    ///
    /// - **Output**: updated state plus the effects to perform, queued into
    ///   `effects`
    /// - **Atomicity**: if this returns `Err`, the state is unchanged
    /// - **Determinism**: same state and input always produce the same output
    ///
    /// The driver performs the effects after the call returns and feeds the
    /// outcome of every [`Effect::Tracked`] back as
    /// [`Input::TrackedActionCompleted`].
    fn stf<C>(
        &mut self,
        input: Input<Self::Data, Self::Error>,
        effects: &mut C,
    ) -> Result<(), Self::TransitionError>
    where
        C: EffectsContainer<Self::Data, Self::Error>;

    /// Recreate the tracked effects that are outstanding in `self`, e.g.
    /// after a driver lost the futures it was polling.
    fn restore<C>(&self, effects: &mut C) -> Result<(), Self::TransitionError>
    where
        C: EffectsContainer<Self::Data, Self::Error>;
}

/// Input to [`StateMachine::stf`].
///
/// # Variants
///
/// - [`Input::Normal`]: a request from the consumer or a fired retry timer
/// - [`Input::TrackedActionCompleted`]: the outcome of a previously emitted
///   [`Dispatch`], keyed by its lineage token
pub enum Input<T, E> {
    Normal(Command<T>),
    TrackedActionCompleted { id: RetryToken, res: Result<T, E> },
}

impl<T, E> Input<T, E> {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Input::Normal(Command::Execute) => "execute",
            Input::Normal(Command::Retry { .. }) => "retry",
            Input::Normal(Command::SetOptimistic(_)) => "set_optimistic",
            Input::Normal(Command::Reset) => "reset",
            Input::TrackedActionCompleted { res: Ok(_), .. } => "settled_ok",
            Input::TrackedActionCompleted { res: Err(_), .. } => "settled_err",
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Input<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Normal(command) => f.debug_tuple("Normal").field(command).finish(),
            Input::TrackedActionCompleted { id, res } => f
                .debug_struct("TrackedActionCompleted")
                .field("id", id)
                .field("res", res)
                .finish(),
        }
    }
}

pub enum Command<T> {
    /// Start a fresh lineage.
    Execute,
    /// A retry timer for lineage `token` fired.
    Retry { token: RetryToken },
    SetOptimistic(Optimistic<T>),
    Reset,
}

impl<T: fmt::Debug> fmt::Debug for Command<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Execute => f.write_str("Execute"),
            Command::Retry { token } => f.debug_struct("Retry").field("token", token).finish(),
            Command::SetOptimistic(update) => {
                f.debug_tuple("SetOptimistic").field(update).finish()
            }
            Command::Reset => f.write_str("Reset"),
        }
    }
}

/// The value an optimistic update commits.
pub enum Optimistic<T> {
    Value(T),
    /// Computed from the currently committed data, if any.
    Update(Box<dyn FnOnce(Option<&T>) -> T + Send>),
}

impl<T: fmt::Debug> fmt::Debug for Optimistic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Optimistic::Value(data) => f.debug_tuple("Value").field(data).finish(),
            Optimistic::Update(_) => f.write_str("Update(..)"),
        }
    }
}
