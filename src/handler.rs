//! The contract every method implementation fulfils, and the lifecycle around a single call.

use crate::{
    error::HandlerError,
    jsonrpc,
    method::Method,
    progress::{PartialResults, ProgressManager, WorkDoneProgressReporter},
};
use async_trait::async_trait;
use auto_impl::auto_impl;
use futures::future::{self, Either};
use tokio_util::sync::CancellationToken;

/// Implementation of one remote method.
///
/// Handlers see the call through [`handle`](MethodHandler::handle). Everything around it (opening
/// the progress channel, racing against cancellation, releasing the channel) is done by
/// [`execute`], so implementations only emit partial results, report progress and check the token
/// when convenient.
#[async_trait]
#[auto_impl(Arc, Box)]
pub trait MethodHandler<M: Method>: Send + Sync + 'static {
    /// Options announced to the client when the method is registered.
    fn registration_options(&self) -> M::RegistrationOptions;

    /// Receives what the client supports for this method.
    ///
    /// Called once at negotiation time and again on every renegotiation. The default ignores it.
    fn set_capability(&self, _capability: M::Capability) {
    }

    /// Performs the call.
    ///
    /// `partial_results` and `progress` are null objects when the caller supplied no token.
    async fn handle(
        &self,
        params: M::Params,
        partial_results: PartialResults<M::Partial>,
        progress: WorkDoneProgressReporter,
        token: CancellationToken,
    ) -> jsonrpc::Result<M::Result>;
}

/// Second phase of a two-phase method: fills in the details of one item returned by the first.
///
/// `R` is the resolve method, whose parameters and result are the same item type.
#[async_trait]
#[auto_impl(Arc, Box)]
pub trait ResolveHandler<R: Method>: Send + Sync + 'static {
    /// Returns `true` if `item` carries enough information to be resolved.
    ///
    /// Items for which this returns `false` are sent back unchanged and never reach
    /// [`resolve`](ResolveHandler::resolve).
    fn can_resolve(&self, item: &R::Params) -> bool;

    /// Resolves a single item.
    async fn resolve(&self, item: R::Params, token: CancellationToken) -> jsonrpc::Result<R::Result>;
}

/// Runs one call of `handler` to completion.
///
/// A progress channel is opened for the call and released once on every exit path, including
/// when the returned future is dropped early. The outcome of the handler is passed through
/// unchanged, except that a handler error with the cancellation code becomes
/// [`HandlerError::Cancelled`]. If the handler finishes in the same poll in which `token` fires,
/// the handler's outcome wins.
pub async fn execute<M, H>(
    handler: &H,
    progress: &ProgressManager,
    params: M::Params,
    token: CancellationToken,
) -> Result<M::Result, HandlerError>
where
    M: Method,
    H: MethodHandler<M> + ?Sized,
{
    if token.is_cancelled() {
        log::debug!("{} cancelled before it started", M::METHOD);
        return Err(HandlerError::Cancelled);
    }

    let channel = progress.open::<M>(&params, &token);
    let handled = handler.handle(params, channel.partial_results(), channel.work_done(), token.clone());
    let outcome = race(M::METHOD, handled, &token).await;
    channel.dispose();
    outcome
}

/// Resolves one item with `handler`, racing it against `token`.
///
/// Eligibility is not checked here; callers consult [`ResolveHandler::can_resolve`] first.
pub async fn resolve<R, H>(handler: &H, item: R::Params, token: CancellationToken) -> Result<R::Result, HandlerError>
where
    R: Method,
    H: ResolveHandler<R> + ?Sized,
{
    if token.is_cancelled() {
        log::debug!("{} cancelled before it started", R::METHOD);
        return Err(HandlerError::Cancelled);
    }

    race(R::METHOD, handler.resolve(item, token.clone()), &token).await
}

async fn race<F, T>(method: &str, handled: F, token: &CancellationToken) -> Result<T, HandlerError>
where
    F: std::future::Future<Output = jsonrpc::Result<T>> + Unpin,
{
    let cancelled = token.cancelled();
    futures::pin_mut!(cancelled);

    match future::select(handled, cancelled).await {
        Either::Left((result, _)) => result.map_err(HandlerError::from),
        Either::Right(((), _)) => {
            log::debug!("{} cancelled while running", method);
            Err(HandlerError::Cancelled)
        },
    }
}
