use std::{convert::Infallible, fmt::Debug, time::Duration};

use crate::machine::RetryToken;

/// A request to invoke the server action for one attempt of a lineage.
///
/// Its outcome must be fed back into the machine as
/// [`Input::TrackedActionCompleted`](crate::Input::TrackedActionCompleted)
/// with `id` set to [`Dispatch::token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    /// Lineage the attempt belongs to.
    pub token: RetryToken,
    /// `0` for the fresh call, `n` for the n-th retry.
    pub attempt: u32,
}

/// Fire-and-forget side effects. Their completion is never reported back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hook<T, E> {
    OnStart,
    OnSuccess(T),
    OnError(E),
    /// Re-enter the lineage with [`Command::Retry`](crate::Command::Retry)
    /// once `delay` has elapsed.
    ScheduleRetry {
        token: RetryToken,
        attempt: u32,
        delay: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect<T, E> {
    Tracked(Dispatch),
    Untracked(Hook<T, E>),
}

/// Where [`StateMachine::stf`](crate::StateMachine::stf) queues its effects.
///
/// Queuing may fail, e.g. for a bounded buffer; the transition then fails
/// with [`TransitionError::EffectQueueFailed`](crate::TransitionError::EffectQueueFailed)
/// and leaves the state untouched.
pub trait EffectsContainer<T, E> {
    type Error: Debug;

    fn add(&mut self, effect: Effect<T, E>) -> Result<(), Self::Error>;
}

impl<T, E> EffectsContainer<T, E> for Vec<Effect<T, E>> {
    type Error = Infallible;

    fn add(&mut self, effect: Effect<T, E>) -> Result<(), Self::Error> {
        self.push(effect);
        Ok(())
    }
}
