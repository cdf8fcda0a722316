use std::sync::Arc;

use actionstate::ServerAction;
use tracing::debug;

use crate::{
    error::{surface, QueryError},
    keys::QueryKey,
};

/// Pages fetched so far, with the parameter each was fetched with.
#[derive(Debug, Clone, PartialEq)]
pub struct InfiniteData<T, P> {
    pub pages: Vec<T>,
    pub page_params: Vec<P>,
}

impl<T, P> Default for InfiniteData<T, P> {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            page_params: Vec::new(),
        }
    }
}

type InputFn<P, I> = Box<dyn Fn(&P) -> I + Send + Sync>;

/// `(last_page, all_pages, last_page_param, all_page_params) -> next param`
type NextPageFn<T, P> = Box<dyn Fn(&T, &[T], &P, &[P]) -> Option<P> + Send + Sync>;

/// Paginated query over a server action.
///
/// Every page fetch builds the action's input from that page's parameter.
pub struct ActionInfiniteQuery<I, P, A>
where
    A: ServerAction<I>,
{
    key: QueryKey,
    action: Arc<A>,
    input: InputFn<P, I>,
    next_page_param: NextPageFn<A::Data, P>,
    initial_page_param: P,
    data: InfiniteData<A::Data, P>,
}

impl<I, P, A> ActionInfiniteQuery<I, P, A>
where
    P: Clone,
    A: ServerAction<I>,
{
    pub fn new<F, N>(
        key: QueryKey,
        action: Arc<A>,
        initial_page_param: P,
        input: F,
        next_page_param: N,
    ) -> Self
    where
        F: Fn(&P) -> I + Send + Sync + 'static,
        N: Fn(&A::Data, &[A::Data], &P, &[P]) -> Option<P> + Send + Sync + 'static,
    {
        Self {
            key,
            action,
            input: Box::new(input),
            next_page_param: Box::new(next_page_param),
            initial_page_param,
            data: InfiniteData::default(),
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn data(&self) -> &InfiniteData<A::Data, P> {
        &self.data
    }

    /// The parameter the next fetch would use; the initial one before any
    /// page is loaded.
    pub fn next_page_param(&self) -> Option<P> {
        match (self.data.pages.last(), self.data.page_params.last()) {
            (Some(last_page), Some(last_param)) => (self.next_page_param)(
                last_page,
                &self.data.pages,
                last_param,
                &self.data.page_params,
            ),
            _ => Some(self.initial_page_param.clone()),
        }
    }

    pub fn has_next_page(&self) -> bool {
        self.next_page_param().is_some()
    }

    /// Fetch and append the next page. On failure nothing is appended.
    pub async fn fetch_next_page(&mut self) -> Result<&A::Data, QueryError<A::Error>> {
        let param = self.next_page_param().ok_or(QueryError::NoNextPage)?;
        let input = (self.input)(&param);

        debug!(key = ?self.key, page = self.data.pages.len(), "fetching page");
        let page = surface(self.action.call(input).await)?;

        let index = self.data.pages.len();
        self.data.pages.push(page);
        self.data.page_params.push(param);
        Ok(&self.data.pages[index])
    }

    /// Drop every loaded page; the next fetch starts from the initial parameter.
    pub fn reset(&mut self) {
        self.data = InfiniteData::default();
    }
}
