//! The pure lifecycle state machine behind [`ActionExecutor`](crate::ActionExecutor).
//!
//! [`StateMachine::stf`] is a deterministic function
//! `(State, Input) -> (State', Effects)`. It never calls the server action,
//! never sleeps and never runs callbacks; it only describes those side
//! effects as [`Effect`]s for a driver to perform afterwards.

use std::{fmt, mem};

use tracing::trace;

use crate::{
    Command, Input, Optimistic, StateMachine,
    effects::{Dispatch, Effect, EffectsContainer, Hook},
    error::TransitionError,
    retry::RetryPolicy,
    status::{StatusSnapshot, project},
};

/// Generation marker for a lineage of attempts.
///
/// A fresh execution mints a new token; the retries it schedules carry it.
/// A retry whose token no longer matches the live one belongs to a lineage
/// that has been superseded and is dropped. This is an epoch check, not a
/// cancellation primitive: nothing is aborted, stale work is just ignored
/// when it comes back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RetryToken(u64);

impl RetryToken {
    /// The live token before the first execution and after a reset.
    pub const NONE: RetryToken = RetryToken(0);

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Display for RetryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The committed outcome of the last settled call, or an optimistic value.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult<T, E> {
    pub is_error: bool,
    pub error: Option<E>,
    pub data: Option<T>,
}

impl<T, E> ActionResult<T, E> {
    pub fn empty() -> Self {
        Self {
            is_error: false,
            error: None,
            data: None,
        }
    }

    pub fn success(data: T) -> Self {
        Self {
            is_error: false,
            error: None,
            data: Some(data),
        }
    }

    pub fn failure(error: E) -> Self {
        Self {
            is_error: true,
            error: Some(error),
            data: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.is_error && self.data.is_none()
    }

    fn check_shape(&self) -> Result<(), String> {
        if self.is_error != self.error.is_some() {
            return Err(format!(
                "is_error is {} but error is {}",
                self.is_error,
                if self.error.is_some() { "set" } else { "unset" }
            ));
        }
        if self.is_error && self.data.is_some() {
            return Err("error result carries data".to_string());
        }
        Ok(())
    }
}

impl<T, E> Default for ActionResult<T, E> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Snapshot of the committed result taken by the first optimistic update
/// of a lineage, restored if that lineage ultimately fails.
#[derive(Debug, Clone, PartialEq)]
pub enum Parked<T, E> {
    Empty,
    Filled(ActionResult<T, E>),
}

impl<T, E> Parked<T, E> {
    pub fn is_filled(&self) -> bool {
        matches!(self, Parked::Filled(_))
    }

    pub fn result(&self) -> Option<&ActionResult<T, E>> {
        match self {
            Parked::Empty => None,
            Parked::Filled(result) => Some(result),
        }
    }
}

impl<T, E> Default for Parked<T, E> {
    fn default() -> Self {
        Parked::Empty
    }
}

/// State of one server action's execution history.
///
/// # Invariants
///
/// 1. **Result shape**: `result.is_error` iff `result.error` is set, and an
///    error result carries no data. The same holds for a parked result.
/// 2. **Parked only while outstanding**: a parked result exists only while an
///    optimistic update or retry is outstanding; every settlement that ends
///    its lineage clears it.
/// 3. **Single park**: repeated optimistic updates never overwrite the park.
/// 4. **Counter bounds**: `retry_count` never exceeds the policy's
///    `max_attempts` (and stays `0` without a policy).
/// 5. **Monotonic tokens**: the live token is never ahead of the last token
///    minted, and minting never reuses a value, even across [`Command::Reset`].
///
/// # Atomicity
///
/// If [`stf`](Self::stf) returns `Err`, the state is unchanged. Effects are
/// queued before any field is touched.
#[derive(Debug)]
pub struct ActionState<T, E> {
    result: ActionResult<T, E>,
    parked: Parked<T, E>,
    is_executing: bool,
    token: RetryToken,
    minted: u64,
    retry_count: u32,
    retry: Option<RetryPolicy<E>>,
}

impl<T, E> ActionState<T, E> {
    pub fn new(initial_data: Option<T>, retry: Option<RetryPolicy<E>>) -> Self {
        let result = match initial_data {
            Some(data) => ActionResult::success(data),
            None => ActionResult::empty(),
        };
        Self {
            result,
            parked: Parked::Empty,
            is_executing: false,
            token: RetryToken::NONE,
            minted: 0,
            retry_count: 0,
            retry,
        }
    }

    pub fn result(&self) -> &ActionResult<T, E> {
        &self.result
    }

    pub fn parked(&self) -> &Parked<T, E> {
        &self.parked
    }

    pub fn is_executing(&self) -> bool {
        self.is_executing
    }

    /// The live lineage's token.
    pub fn token(&self) -> RetryToken {
        self.token
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn retry_policy(&self) -> Option<&RetryPolicy<E>> {
        self.retry.as_ref()
    }

    /// Check state invariants for testing.
    pub fn check_invariants(&self) -> Result<(), String> {
        self.result
            .check_shape()
            .map_err(|e| format!("committed result: {}", e))?;

        if let Parked::Filled(parked) = &self.parked {
            parked
                .check_shape()
                .map_err(|e| format!("parked result: {}", e))?;
        }

        let max_attempts = self.retry.as_ref().map_or(0, |p| p.max_attempts);
        if self.retry_count > max_attempts {
            return Err(format!(
                "retry count {} exceeds max attempts {}",
                self.retry_count, max_attempts
            ));
        }

        if self.token.get() > self.minted {
            return Err(format!(
                "live token {} ahead of last minted #{}",
                self.token, self.minted
            ));
        }

        Ok(())
    }
}

impl<T: Clone, E: Clone> ActionState<T, E> {
    /// Derived status, recomputed on every call.
    pub fn status(&self) -> StatusSnapshot<T, E> {
        project(self)
    }

    fn execute<C>(&mut self, effects: &mut C) -> Result<(), TransitionError>
    where
        C: EffectsContainer<T, E>,
    {
        let token = RetryToken(self.minted + 1);

        queue(effects, Effect::Untracked(Hook::OnStart))?;
        queue(effects, Effect::Tracked(Dispatch { token, attempt: 0 }))?;

        self.minted = token.0;
        self.token = token;
        self.retry_count = 0;
        self.is_executing = true;
        Ok(())
    }

    fn retry<C>(&mut self, token: RetryToken, effects: &mut C) -> Result<(), TransitionError>
    where
        C: EffectsContainer<T, E>,
    {
        if token != self.token {
            return Err(TransitionError::Superseded {
                stale: token,
                live: self.token,
            });
        }

        queue(effects, Effect::Untracked(Hook::OnStart))?;
        queue(
            effects,
            Effect::Tracked(Dispatch {
                token,
                attempt: self.retry_count,
            }),
        )?;

        self.is_executing = true;
        Ok(())
    }

    fn settle_success<C>(
        &mut self,
        _token: RetryToken,
        data: T,
        effects: &mut C,
    ) -> Result<(), TransitionError>
    where
        C: EffectsContainer<T, E>,
    {
        queue(effects, Effect::Untracked(Hook::OnSuccess(data.clone())))?;

        self.result = ActionResult::success(data);
        self.is_executing = false;
        self.parked = Parked::Empty;
        Ok(())
    }

    fn settle_failure<C>(
        &mut self,
        token: RetryToken,
        error: E,
        effects: &mut C,
    ) -> Result<(), TransitionError>
    where
        C: EffectsContainer<T, E>,
    {
        let next = match &self.retry {
            Some(policy) if policy.should_retry(self.retry_count) => {
                let attempt = self.retry_count + 1;
                Some((attempt, policy.delay_for(attempt, &error)))
            }
            _ => None,
        };

        queue(effects, Effect::Untracked(Hook::OnError(error.clone())))?;
        if let Some((attempt, delay)) = next {
            queue(
                effects,
                Effect::Untracked(Hook::ScheduleRetry {
                    token,
                    attempt,
                    delay,
                }),
            )?;
        }

        self.is_executing = false;
        match next {
            Some((attempt, _)) => {
                if token != self.token {
                    trace!(
                        stale = %token,
                        live = %self.token,
                        "retry scheduled for superseded lineage"
                    );
                }
                self.retry_count = attempt;
            }
            None => {
                self.result = match mem::take(&mut self.parked) {
                    Parked::Filled(previous) => previous,
                    Parked::Empty => ActionResult::failure(error),
                };
            }
        }
        Ok(())
    }

    fn set_optimistic(&mut self, update: Optimistic<T>) {
        let data = match update {
            Optimistic::Value(data) => data,
            Optimistic::Update(f) => f(self.result.data.as_ref()),
        };

        let previous = mem::replace(&mut self.result, ActionResult::success(data));
        if !self.parked.is_filled() {
            self.parked = Parked::Filled(previous);
        }
    }

    fn reset(&mut self) {
        self.result = ActionResult::empty();
        self.parked = Parked::Empty;
        self.is_executing = false;
        self.token = RetryToken::NONE;
        self.retry_count = 0;
    }
}

impl<T: Clone, E: Clone> StateMachine for ActionState<T, E> {
    type Data = T;
    type Error = E;
    type TransitionError = TransitionError;

    /// Apply one input, queuing the effects it calls for.
    ///
    /// # Semantics
    ///
    /// - `Normal(Execute)`: starts a fresh lineage. Mints a token, resets the
    ///   retry counter, marks the state executing and emits
    ///   [`Hook::OnStart`] followed by a [`Dispatch`].
    /// - `Normal(Retry { token })`: re-enters the lineage `token`. Fails with
    ///   [`TransitionError::Superseded`] if that lineage is no longer live;
    ///   otherwise behaves like `Execute` without minting or resetting.
    /// - `TrackedActionCompleted { id, res }`: settles an attempt. Emits
    ///   [`Hook::OnSuccess`] or [`Hook::OnError`], and on a retryable failure
    ///   [`Hook::ScheduleRetry`] for lineage `id`.
    /// - `Normal(SetOptimistic(_))`: parks the committed result if nothing is
    ///   parked yet and commits the optimistic value.
    /// - `Normal(Reset)`: back to the empty state. The minting counter is kept
    ///   so stale retries can never match a later lineage.
    ///
    /// Settlements are not checked against the live token: a call that was
    /// already in flight when a newer lineage started still commits. A
    /// retryable failure from such a lineage counts against the live retry
    /// budget and schedules a retry under its own token, which is dropped as
    /// [`TransitionError::Superseded`] when it fires.
    fn stf<C>(&mut self, input: Input<T, E>, effects: &mut C) -> Result<(), TransitionError>
    where
        C: EffectsContainer<T, E>,
    {
        trace!(
            token = %self.token,
            retry_count = self.retry_count,
            input = input.kind(),
            "transition"
        );
        match input {
            Input::Normal(Command::Execute) => self.execute(effects),
            Input::Normal(Command::Retry { token }) => self.retry(token, effects),
            Input::Normal(Command::SetOptimistic(update)) => {
                self.set_optimistic(update);
                Ok(())
            }
            Input::Normal(Command::Reset) => {
                self.reset();
                Ok(())
            }
            Input::TrackedActionCompleted { id, res: Ok(data) } => {
                self.settle_success(id, data, effects)
            }
            Input::TrackedActionCompleted { id, res: Err(error) } => {
                self.settle_failure(id, error, effects)
            }
        }
    }

    /// Re-emits the [`Dispatch`] of the attempt in flight, if any.
    ///
    /// The live lineage and the retry counter are stored in the state, so the
    /// attempt can be recreated exactly. A retry that was only scheduled is
    /// not in flight and emits nothing.
    fn restore<C>(&self, effects: &mut C) -> Result<(), TransitionError>
    where
        C: EffectsContainer<T, E>,
    {
        if self.is_executing && !self.token.is_none() {
            queue(
                effects,
                Effect::Tracked(Dispatch {
                    token: self.token,
                    attempt: self.retry_count,
                }),
            )?;
        }
        Ok(())
    }
}

fn queue<T, E, C>(effects: &mut C, effect: Effect<T, E>) -> Result<(), TransitionError>
where
    C: EffectsContainer<T, E>,
{
    effects
        .add(effect)
        .map_err(|_| TransitionError::EffectQueueFailed)
}
