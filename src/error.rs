use crate::machine::RetryToken;

/// Why [`StateMachine::stf`](crate::StateMachine::stf) refused an input, or why
/// an attempt never reached the server action.
///
/// None of these carry the server action's own error: that one lives in the
/// committed [`ActionResult`](crate::ActionResult) and in the outcome handed
/// back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// A retry fired for a lineage that is no longer live.
    #[error("retry for lineage {stale} superseded by lineage {live}")]
    Superseded { stale: RetryToken, live: RetryToken },

    /// The effects container rejected an effect.
    #[error("failed to queue effect")]
    EffectQueueFailed,

    /// The transition succeeded but emitted nothing to dispatch.
    ///
    /// [`ActionState`](crate::ActionState) always dispatches on an accepted
    /// `Execute` or `Retry`. The executor still checks, so a transition that
    /// stops dispatching surfaces here instead of settling a call that never
    /// ran.
    #[error("transition emitted no dispatch")]
    NotDispatched,
}

impl TransitionError {
    pub fn is_superseded(&self) -> bool {
        matches!(self, TransitionError::Superseded { .. })
    }
}
