use std::sync::Arc;

use actionstate::ServerAction;
use tracing::debug;

use crate::{
    error::{surface, QueryError},
    keys::QueryKey,
};

/// Query function for a single keyed query over a server action.
pub struct ActionQuery<I, A> {
    key: QueryKey,
    input: I,
    action: Arc<A>,
}

impl<I, A> ActionQuery<I, A>
where
    I: Clone,
    A: ServerAction<I>,
{
    pub fn new(key: QueryKey, action: Arc<A>, input: I) -> Self {
        Self { key, input, action }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    /// Success data passes through unchanged; a failed outcome becomes
    /// [`QueryError::Action`].
    pub async fn fetch(&self) -> Result<A::Data, QueryError<A::Error>> {
        debug!(key = ?self.key, "fetching query");
        surface(self.action.call(self.input.clone()).await)
    }
}

/// Mutation function over a server action.
pub struct ActionMutation<A> {
    action: Arc<A>,
}

impl<A> ActionMutation<A> {
    pub fn new(action: Arc<A>) -> Self {
        Self { action }
    }

    pub async fn mutate<I>(
        &self,
        input: I,
    ) -> Result<<A as ServerAction<I>>::Data, QueryError<<A as ServerAction<I>>::Error>>
    where
        A: ServerAction<I>,
    {
        surface(self.action.call(input).await)
    }

    /// Hand the raw outcome to the cache as mutation data instead of routing
    /// failures through its error channel.
    pub async fn mutate_settled<I>(
        &self,
        input: I,
    ) -> Result<<A as ServerAction<I>>::Data, <A as ServerAction<I>>::Error>
    where
        A: ServerAction<I>,
    {
        self.action.call(input).await
    }
}

impl<A> Clone for ActionMutation<A> {
    fn clone(&self) -> Self {
        Self {
            action: Arc::clone(&self.action),
        }
    }
}
