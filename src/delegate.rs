//! Handlers assembled from plain closures.
//!
//! A [`MethodBundle`] carries the function that performs a method, a [`ResolveBundle`] carries the
//! optional second phase. The registry wraps them in [`DelegatingHandler`] and
//! [`DelegatingResolveHandler`] so closures and hand-written handlers go through the same
//! dispatch path.

use crate::{
    handler::{MethodHandler, ResolveHandler},
    jsonrpc,
    method::Method,
    progress::{PartialResults, WorkDoneProgressReporter},
};
use async_trait::async_trait;
use futures::{future::BoxFuture, FutureExt};
use std::{
    fmt::{self, Debug, Formatter},
    future::Future,
};
use tokio_util::sync::CancellationToken;

type HandleFn<M> = dyn Fn(
        <M as Method>::Params,
        PartialResults<<M as Method>::Partial>,
        WorkDoneProgressReporter,
        CancellationToken,
    ) -> BoxFuture<'static, jsonrpc::Result<<M as Method>::Result>>
    + Send
    + Sync;

type CapabilityFn<M> = dyn Fn(<M as Method>::Capability) + Send + Sync;

type ResolveFn<R> =
    dyn Fn(<R as Method>::Params, CancellationToken) -> BoxFuture<'static, jsonrpc::Result<<R as Method>::Result>>
        + Send
        + Sync;

type CanResolveFn<R> = dyn Fn(&<R as Method>::Params) -> bool + Send + Sync;

/// The functions implementing one method.
pub struct MethodBundle<M: Method> {
    handle: Box<HandleFn<M>>,
    capability: Option<Box<CapabilityFn<M>>>,
}

impl<M: Method> MethodBundle<M> {
    /// Creates a bundle from a function receiving the partial result emitter and progress reporter.
    pub fn new<F, Fut>(handle: F) -> Self
    where
        F: Fn(M::Params, PartialResults<M::Partial>, WorkDoneProgressReporter, CancellationToken) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = jsonrpc::Result<M::Result>> + Send + 'static,
    {
        MethodBundle {
            handle: Box::new(move |params, partial_results, progress, token| {
                handle(params, partial_results, progress, token).boxed()
            }),
            capability: None,
        }
    }

    /// Creates a bundle for a method that reports progress but never streams partial results.
    pub fn progress_only<F, Fut>(handle: F) -> Self
    where
        F: Fn(M::Params, WorkDoneProgressReporter, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = jsonrpc::Result<M::Result>> + Send + 'static,
    {
        Self::new(move |params, _, progress, token| handle(params, progress, token))
    }

    /// Sets the function that receives the negotiated capability.
    pub fn on_capability<F>(mut self, capability: F) -> Self
    where
        F: Fn(M::Capability) + Send + Sync + 'static,
    {
        self.capability = Some(Box::new(capability));
        self
    }
}

impl<M: Method> Debug for MethodBundle<M> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct(stringify!(MethodBundle))
            .field("method", &M::METHOD)
            .field("capability", &self.capability.is_some())
            .finish()
    }
}

/// The optional second phase of a two-phase method.
///
/// Resolution is offered only when both the resolve function and the eligibility predicate are
/// present. Supplying one without the other is not an error; the method is then registered without
/// resolve support.
pub struct ResolveBundle<R: Method> {
    resolve: Option<Box<ResolveFn<R>>>,
    can_resolve: Option<Box<CanResolveFn<R>>>,
}

impl<R: Method> ResolveBundle<R> {
    /// Creates a bundle that offers no resolution.
    pub fn none() -> Self {
        ResolveBundle {
            resolve: None,
            can_resolve: None,
        }
    }

    /// Creates a bundle with both halves present.
    pub fn new<F, Fut, P>(resolve: F, can_resolve: P) -> Self
    where
        F: Fn(R::Params, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = jsonrpc::Result<R::Result>> + Send + 'static,
        P: Fn(&R::Params) -> bool + Send + Sync + 'static,
    {
        Self::none().resolve_with(resolve).can_resolve_with(can_resolve)
    }

    /// Sets the function that resolves one item.
    pub fn resolve_with<F, Fut>(mut self, resolve: F) -> Self
    where
        F: Fn(R::Params, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = jsonrpc::Result<R::Result>> + Send + 'static,
    {
        self.resolve = Some(Box::new(move |item, token| resolve(item, token).boxed()));
        self
    }

    /// Sets the predicate deciding whether an item can be resolved.
    pub fn can_resolve_with<P>(mut self, can_resolve: P) -> Self
    where
        P: Fn(&R::Params) -> bool + Send + Sync + 'static,
    {
        self.can_resolve = Some(Box::new(can_resolve));
        self
    }

    /// Returns `true` if both halves are present.
    pub fn is_offered(&self) -> bool {
        self.resolve.is_some() && self.can_resolve.is_some()
    }

    /// Turns the bundle into a handler, or `None` if resolution is not offered.
    pub fn into_handler(self) -> Option<DelegatingResolveHandler<R>> {
        match (self.resolve, self.can_resolve) {
            (Some(resolve), Some(can_resolve)) => Some(DelegatingResolveHandler { resolve, can_resolve }),
            (resolve, can_resolve) => {
                if resolve.is_some() || can_resolve.is_some() {
                    log::debug!("{} has only one resolve half, resolution not offered", R::METHOD);
                }
                None
            },
        }
    }
}

impl<R: Method> Default for ResolveBundle<R> {
    fn default() -> Self {
        ResolveBundle::none()
    }
}

impl<R: Method> Debug for ResolveBundle<R> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct(stringify!(ResolveBundle))
            .field("method", &R::METHOD)
            .field("resolve", &self.resolve.is_some())
            .field("can_resolve", &self.can_resolve.is_some())
            .finish()
    }
}

/// A [`MethodHandler`] that forwards to the functions of a [`MethodBundle`].
pub struct DelegatingHandler<M: Method> {
    bundle: MethodBundle<M>,
    options: M::RegistrationOptions,
}

impl<M: Method> DelegatingHandler<M> {
    /// Wraps `bundle`, announcing `options` on registration.
    pub fn new(bundle: MethodBundle<M>, options: M::RegistrationOptions) -> Self {
        DelegatingHandler { bundle, options }
    }
}

#[async_trait]
impl<M: Method> MethodHandler<M> for DelegatingHandler<M> {
    fn registration_options(&self) -> M::RegistrationOptions {
        self.options.clone()
    }

    fn set_capability(&self, capability: M::Capability) {
        if let Some(set) = &self.bundle.capability {
            set(capability);
        }
    }

    async fn handle(
        &self,
        params: M::Params,
        partial_results: PartialResults<M::Partial>,
        progress: WorkDoneProgressReporter,
        token: CancellationToken,
    ) -> jsonrpc::Result<M::Result> {
        (self.bundle.handle)(params, partial_results, progress, token).await
    }
}

impl<M: Method> Debug for DelegatingHandler<M> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct(stringify!(DelegatingHandler))
            .field("bundle", &self.bundle)
            .finish()
    }
}

/// A [`ResolveHandler`] that forwards to the functions of a [`ResolveBundle`].
pub struct DelegatingResolveHandler<R: Method> {
    resolve: Box<ResolveFn<R>>,
    can_resolve: Box<CanResolveFn<R>>,
}

#[async_trait]
impl<R: Method> ResolveHandler<R> for DelegatingResolveHandler<R> {
    fn can_resolve(&self, item: &R::Params) -> bool {
        (self.can_resolve)(item)
    }

    async fn resolve(&self, item: R::Params, token: CancellationToken) -> jsonrpc::Result<R::Result> {
        (self.resolve)(item, token).await
    }
}

impl<R: Method> Debug for DelegatingResolveHandler<R> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct(stringify!(DelegatingResolveHandler))
            .field("method", &R::METHOD)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{handler, Client, ProgressManager};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    enum Echo {}

    impl Method for Echo {
        type Capability = bool;
        type Params = String;
        type Partial = String;
        type RegistrationOptions = Vec<String>;
        type Result = String;

        const METHOD: &'static str = "test/echo";
    }

    enum Shout {}

    impl Method for Shout {
        type Capability = ();
        type Params = String;
        type Partial = ();
        type RegistrationOptions = ();
        type Result = String;

        const METHOD: &'static str = "test/shout";
    }

    #[tokio::test]
    async fn forwards_to_closure() {
        let (client, _messages) = Client::new();
        let manager = ProgressManager::new(client);
        let bundle = MethodBundle::<Echo>::new(|params, partial_results, _, _| async move {
            partial_results.emit(params.clone());
            Ok(format!("{}!", params))
        });
        let handler = DelegatingHandler::new(bundle, vec!["opt".into()]);

        assert_eq!(handler.registration_options(), vec!["opt".to_string()]);
        let result = handler::execute::<Echo, _>(&handler, &manager, "hi".into(), CancellationToken::new()).await;
        assert_eq!(result, Ok("hi!".to_string()));
    }

    #[tokio::test]
    async fn progress_only_reports() {
        let (client, mut messages) = Client::new();
        let manager = ProgressManager::new(client);
        let bundle = MethodBundle::<Echo>::progress_only(|params, progress, _| async move {
            progress.report("echoing", None);
            Ok(params)
        });
        let handler = DelegatingHandler::new(bundle, Vec::new());

        let reporter = manager.work_done(Some(lsp::ProgressToken::Number(4)), &CancellationToken::new());
        let result = handler
            .handle("x".into(), PartialResults::noop(), reporter, CancellationToken::new())
            .await;
        assert_eq!(result, Ok("x".to_string()));

        let sent = messages.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].params().map(|p| p["value"]["kind"].clone()), Some(json!("begin")));
    }

    #[test]
    fn capability_reaches_closure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let bundle = MethodBundle::<Echo>::new(|params, _, _, _| async move { Ok(params) })
            .on_capability(move |streaming| sink.lock().unwrap().push(streaming));
        let handler = DelegatingHandler::new(bundle, Vec::new());

        handler.set_capability(false);
        handler.set_capability(true);
        assert_eq!(*seen.lock().unwrap(), vec![false, true]);
    }

    #[test]
    fn capability_ignored_without_closure() {
        let bundle = MethodBundle::<Echo>::new(|params, _, _, _| async move { Ok(params) });
        DelegatingHandler::new(bundle, Vec::new()).set_capability(true);
    }

    #[test]
    fn offered_only_with_both_halves() {
        let both = ResolveBundle::<Shout>::new(|item, _| async move { Ok(item.to_uppercase()) }, |item| !item.is_empty());
        assert!(both.is_offered());
        assert!(both.into_handler().is_some());

        let resolve_only = ResolveBundle::<Shout>::none().resolve_with(|item, _| async move { Ok(item) });
        assert!(!resolve_only.is_offered());
        assert!(resolve_only.into_handler().is_none());

        let predicate_only = ResolveBundle::<Shout>::none().can_resolve_with(|_| true);
        assert!(!predicate_only.is_offered());
        assert!(predicate_only.into_handler().is_none());

        assert!(!ResolveBundle::<Shout>::default().is_offered());
    }

    #[tokio::test]
    async fn resolve_handler_forwards() {
        let bundle = ResolveBundle::<Shout>::new(|item, _| async move { Ok(item.to_uppercase()) }, |item| !item.is_empty());
        let handler = bundle.into_handler().unwrap();

        assert!(handler.can_resolve(&"a".to_string()));
        assert!(!handler.can_resolve(&String::new()));
        let result = handler::resolve::<Shout, _>(&handler, "abc".into(), CancellationToken::new()).await;
        assert_eq!(result, Ok("ABC".to_string()));
    }

    #[test]
    fn debug() {
        let bundle = MethodBundle::<Echo>::new(|params, _, _, _| async move { Ok(params) });
        assert_eq!(format!("{:?}", bundle), r#"MethodBundle { method: "test/echo", capability: false }"#);
        format!("{:?}", DelegatingHandler::new(bundle, Vec::new()));
        format!("{:?}", ResolveBundle::<Shout>::none());
    }
}
