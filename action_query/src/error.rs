/// The failure channel a query cache sees.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError<E> {
    /// The server action resolved with an error.
    #[error("server action failed: {0}")]
    Action(E),

    #[error("no next page to fetch")]
    NoNextPage,
}

impl<E> QueryError<E> {
    pub fn action_error(&self) -> Option<&E> {
        match self {
            QueryError::Action(err) => Some(err),
            QueryError::NoNextPage => None,
        }
    }
}

pub(crate) fn surface<T, E>(res: Result<T, E>) -> Result<T, QueryError<E>> {
    res.map_err(QueryError::Action)
}
