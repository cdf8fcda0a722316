use futures::future::BoxFuture;

/// The remote procedure an executor drives.
///
/// One call per attempt; the outcome is the only thing the executor reads
/// back. Validation and transport live behind this boundary.
///
/// Any `Fn(I) -> impl Future<Output = Result<T, E>>` is a server action:
///
/// ```
/// # use actionstate::ServerAction;
/// async fn greet(name: String) -> Result<String, String> {
///     Ok(format!("Hello, {}", name))
/// }
///
/// fn assert_action<A: ServerAction<String, Data = String, Error = String>>(_: A) {}
/// assert_action(greet);
/// ```
pub trait ServerAction<I>: Send + Sync + 'static {
    type Data;
    type Error;

    fn call(&self, input: I) -> BoxFuture<'static, Result<Self::Data, Self::Error>>;
}

impl<I, T, E, F, Fut> ServerAction<I> for F
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    type Data = T;
    type Error = E;

    fn call(&self, input: I) -> BoxFuture<'static, Result<T, E>> {
        Box::pin(self(input))
    }
}
