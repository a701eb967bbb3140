//! Registration of method handlers and dispatch of inbound calls.

use crate::{
    client::Client,
    config::HandlerConfig,
    delegate::{DelegatingHandler, MethodBundle, ResolveBundle},
    error::HandlerError,
    handler::{self, MethodHandler, ResolveHandler},
    jsonrpc,
    method::{DispatchPolicy, Method},
    progress::ProgressManager,
};
use dashmap::DashMap;
use futures::{
    channel::oneshot,
    future::{self, BoxFuture},
    FutureExt,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{
    collections::VecDeque,
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        Weak,
    },
};
use tokio_util::sync::CancellationToken;

/// Registration options of a method that supports a resolve phase.
pub trait ResolveOptions {
    /// Sets whether the resolve phase is offered.
    fn set_resolve_provider(&mut self, offered: bool);

    /// Returns whether the resolve phase is offered.
    fn resolve_provider(&self) -> bool;
}

/// A registered method with its types erased to JSON.
trait ErasedMethod: Send + Sync {
    fn policy(&self) -> DispatchPolicy;

    fn registration_options(&self) -> Option<Value>;

    fn apply_capability(&self, capability: Value) -> serde_json::Result<()>;

    fn call(
        self: Arc<Self>,
        params: Value,
        progress: ProgressManager,
        token: CancellationToken,
    ) -> BoxFuture<'static, Result<Value, HandlerError>>;
}

struct MethodEntry<M, H> {
    handler: Arc<H>,
    _marker: PhantomData<fn() -> M>,
}

impl<M, H> ErasedMethod for MethodEntry<M, H>
where
    M: Method,
    H: MethodHandler<M>,
{
    fn policy(&self) -> DispatchPolicy {
        M::POLICY
    }

    fn registration_options(&self) -> Option<Value> {
        match serde_json::to_value(self.handler.registration_options()) {
            Ok(Value::Null) => None,
            Ok(options) => Some(options),
            Err(e) => {
                log::error!("invalid JSON in {} registration options: {}", M::METHOD, e);
                None
            },
        }
    }

    fn apply_capability(&self, capability: Value) -> serde_json::Result<()> {
        let capability = serde_json::from_value(capability)?;
        self.handler.set_capability(capability);
        Ok(())
    }

    fn call(
        self: Arc<Self>,
        params: Value,
        progress: ProgressManager,
        token: CancellationToken,
    ) -> BoxFuture<'static, Result<Value, HandlerError>> {
        async move {
            let params = decode::<M::Params>(M::METHOD, params)?;
            let result = handler::execute::<M, H>(&*self.handler, &progress, params, token).await?;
            encode(M::METHOD, result)
        }
        .boxed()
    }
}

struct ResolveEntry<R, H> {
    handler: Arc<H>,
    _marker: PhantomData<fn() -> R>,
}

impl<R, H> ErasedMethod for ResolveEntry<R, H>
where
    R: Method,
    H: ResolveHandler<R>,
{
    fn policy(&self) -> DispatchPolicy {
        DispatchPolicy::Independent
    }

    fn registration_options(&self) -> Option<Value> {
        None
    }

    fn apply_capability(&self, capability: Value) -> serde_json::Result<()> {
        serde_json::from_value::<R::Capability>(capability).map(drop)
    }

    fn call(
        self: Arc<Self>,
        params: Value,
        _: ProgressManager,
        token: CancellationToken,
    ) -> BoxFuture<'static, Result<Value, HandlerError>> {
        async move {
            let item = decode::<R::Params>(R::METHOD, params.clone())?;
            if !self.handler.can_resolve(&item) {
                log::trace!("{} item is not resolvable, returning it unchanged", R::METHOD);
                return Ok(params);
            }

            let resolved = handler::resolve::<R, H>(&*self.handler, item, token).await?;
            encode(R::METHOD, resolved)
        }
        .boxed()
    }
}

fn decode<T: DeserializeOwned>(method: &str, params: Value) -> Result<T, HandlerError> {
    serde_json::from_value(params).map_err(|e| {
        log::debug!("invalid parameters for {}: {}", method, e);
        HandlerError::Failed(jsonrpc::Error::invalid_params(e.to_string()))
    })
}

fn encode<T: Serialize>(method: &str, result: T) -> Result<Value, HandlerError> {
    serde_json::to_value(result).map_err(|e| {
        log::error!("invalid JSON in {} result: {}", method, e);
        HandlerError::Failed(jsonrpc::Error::internal_error())
    })
}

struct Registered {
    id: u64,
    entry: Arc<dyn ErasedMethod>,
    queue: Option<Arc<OrderedQueue>>,
}

struct RegistryInner {
    progress: ProgressManager,
    methods: DashMap<&'static str, Registered>,
    capabilities: DashMap<String, Value>,
    next_id: AtomicU64,
}

/// The set of methods a server exposes, and the dispatcher for calls to them.
///
/// Calls to [`Independent`](DispatchPolicy::Independent) methods run concurrently. Calls to an
/// [`Ordered`](DispatchPolicy::Ordered) method run one at a time, in the order in which
/// [`dispatch`](HandlerRegistry::dispatch) was called for them.
///
/// This type provides a very cheap implementation of [`Clone`]; clones share the same methods.
#[derive(Clone)]
pub struct HandlerRegistry {
    inner: Arc<RegistryInner>,
}

impl HandlerRegistry {
    /// Creates an empty registry whose handlers send notifications through `client`.
    pub fn new(client: Client) -> Self {
        HandlerRegistry::with_config(client, HandlerConfig::default())
    }

    /// Creates an empty registry with explicit progress settings.
    pub fn with_config(client: Client, config: HandlerConfig) -> Self {
        HandlerRegistry {
            inner: Arc::new(RegistryInner {
                progress: ProgressManager::with_config(client, config),
                methods: DashMap::new(),
                capabilities: DashMap::new(),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the progress manager handed to every call.
    pub fn progress(&self) -> &ProgressManager {
        &self.inner.progress
    }

    /// Registers `handler` as the implementation of `M`.
    ///
    /// A handler already registered for the same method is replaced. The registration lasts until
    /// the returned handle is dropped or [`unregister`](RegistrationHandle::unregister)ed.
    pub fn register<M, H>(&self, handler: H) -> RegistrationHandle
    where
        M: Method,
        H: MethodHandler<M>,
    {
        self.register_arc::<M, H>(Arc::new(handler))
    }

    /// Registers `handler` as the implementation of the resolve method `R`.
    pub fn register_resolver<R, H>(&self, handler: H) -> RegistrationHandle
    where
        R: Method,
        H: ResolveHandler<R>,
    {
        self.register_resolver_arc::<R, H>(Arc::new(handler))
    }

    /// Registers one handler as the implementation of both `M` and its resolve method `R`.
    pub fn register_resolvable<M, R, H>(&self, handler: Arc<H>) -> RegistrationHandle
    where
        M: Method,
        R: Method,
        H: MethodHandler<M> + ResolveHandler<R>,
    {
        let mut handle = self.register_arc::<M, H>(handler.clone());
        handle.merge(self.register_resolver_arc::<R, H>(handler));
        handle
    }

    /// Registers a method implemented by closures.
    pub fn delegate<M: Method>(&self, bundle: MethodBundle<M>, options: M::RegistrationOptions) -> RegistrationHandle {
        self.register::<M, _>(DelegatingHandler::new(bundle, options))
    }

    /// Registers a two-phase method implemented by closures.
    ///
    /// The `resolveProvider` flag in `options` is overwritten: it is set exactly when `resolve`
    /// has both of its halves, and only then is `R` registered.
    pub fn delegate_resolvable<M, R>(
        &self,
        bundle: MethodBundle<M>,
        resolve: ResolveBundle<R>,
        mut options: M::RegistrationOptions,
    ) -> RegistrationHandle
    where
        M: Method,
        M::RegistrationOptions: ResolveOptions,
        R: Method,
    {
        options.set_resolve_provider(resolve.is_offered());
        let mut handle = self.delegate(bundle, options);
        if let Some(resolver) = resolve.into_handler() {
            handle.merge(self.register_resolver::<R, _>(resolver));
        }
        handle
    }

    fn register_arc<M, H>(&self, handler: Arc<H>) -> RegistrationHandle
    where
        M: Method,
        H: MethodHandler<M>,
    {
        let entry = MethodEntry::<M, H> {
            handler,
            _marker: PhantomData,
        };
        self.insert(M::METHOD, Arc::new(entry))
    }

    fn register_resolver_arc<R, H>(&self, handler: Arc<H>) -> RegistrationHandle
    where
        R: Method,
        H: ResolveHandler<R>,
    {
        let entry = ResolveEntry::<R, H> {
            handler,
            _marker: PhantomData,
        };
        self.insert(R::METHOD, Arc::new(entry))
    }

    fn insert(&self, method: &'static str, entry: Arc<dyn ErasedMethod>) -> RegistrationHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;

        let negotiated = self.inner.capabilities.get(method).map(|value| value.clone());
        if let Some(capability) = negotiated {
            if let Err(e) = entry.apply_capability(capability) {
                log::warn!("ignoring invalid capability for {}: {}", method, e);
            }
        }

        let queue = match entry.policy() {
            DispatchPolicy::Independent => None,
            DispatchPolicy::Ordered => Some(Arc::new(OrderedQueue::new())),
        };

        if self.inner.methods.insert(method, Registered { id, entry, queue }).is_some() {
            log::warn!("replaced existing handler for {}", method);
        } else {
            log::debug!("registered handler for {}", method);
        }

        RegistrationHandle {
            registry: Arc::downgrade(&self.inner),
            entries: vec![(method, id)],
        }
    }

    /// Returns `true` if a handler is registered for `method`.
    pub fn contains(&self, method: &str) -> bool {
        self.inner.methods.contains_key(method)
    }

    /// Returns the names of all registered methods, sorted.
    pub fn methods(&self) -> Vec<&'static str> {
        let mut methods: Vec<_> = self.inner.methods.iter().map(|entry| *entry.key()).collect();
        methods.sort_unstable();
        methods
    }

    /// Starts a call to `method`.
    ///
    /// The call's position in its method's queue is fixed when this function returns, before the
    /// returned future is first polled. Unknown methods fail with "method not found"; malformed
    /// parameters fail with "invalid params".
    pub fn dispatch(
        &self,
        method: &str,
        params: Option<Value>,
        token: CancellationToken,
    ) -> BoxFuture<'static, Result<Value, HandlerError>> {
        let (entry, queue) = match self.inner.methods.get(method) {
            Some(registered) => (registered.entry.clone(), registered.queue.clone()),
            None => {
                log::warn!("no handler registered for {}", method);
                return future::err(HandlerError::Failed(jsonrpc::Error::method_not_found())).boxed();
            },
        };

        let progress = self.inner.progress.clone();
        let params = params.unwrap_or(Value::Null);
        match queue {
            None => entry.call(params, progress, token),
            Some(queue) => {
                let turn = queue.enqueue();
                async move {
                    let _slot = turn.wait().await;
                    entry.call(params, progress, token).await
                }
                .boxed()
            },
        }
    }

    /// Passes a newly negotiated capability to the handler of `M`.
    pub fn set_capability<M: Method>(&self, capability: M::Capability) -> jsonrpc::Result<()> {
        let value = serde_json::to_value(capability).map_err(|e| jsonrpc::Error::invalid_params(e.to_string()))?;
        self.apply_capability(M::METHOD, value)
    }

    /// Passes a newly negotiated capability, given as JSON, to the handler of `method`.
    ///
    /// The capability is remembered and also applied to handlers registered for `method` later.
    /// Calls already running keep the capability they started with.
    pub fn apply_capability(&self, method: &str, capability: Value) -> jsonrpc::Result<()> {
        let entry = self.inner.methods.get(method).map(|registered| registered.entry.clone());
        if let Some(entry) = entry {
            entry
                .apply_capability(capability.clone())
                .map_err(|e| jsonrpc::Error::invalid_params(e.to_string()))?;
        }

        log::debug!("updated capability for {}", method);
        self.inner.capabilities.insert(method.to_owned(), capability);
        Ok(())
    }

    /// Returns the last capability negotiated for `method`.
    pub fn capability(&self, method: &str) -> Option<Value> {
        self.inner.capabilities.get(method).map(|value| value.clone())
    }

    /// Builds the `client/registerCapability` registrations for every method that has options.
    pub fn registrations(&self) -> Vec<lsp::Registration> {
        let mut registrations: Vec<_> = self
            .inner
            .methods
            .iter()
            .filter_map(|registered| {
                let register_options = registered.entry.registration_options()?;
                Some(lsp::Registration {
                    id: registered.id.to_string(),
                    method: registered.key().to_string(),
                    register_options: Some(register_options),
                })
            })
            .collect();
        registrations.sort_by(|a, b| a.method.cmp(&b.method));
        registrations
    }
}

impl Debug for HandlerRegistry {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct(stringify!(HandlerRegistry))
            .field("methods", &self.methods())
            .field("progress", &self.inner.progress)
            .finish()
    }
}

/// Keeps methods registered.
///
/// Dropping the handle or calling [`unregister`](RegistrationHandle::unregister) removes them.
/// Calls that already started keep their handler alive and finish normally.
#[must_use = "dropping the handle unregisters its methods"]
pub struct RegistrationHandle {
    registry: Weak<RegistryInner>,
    entries: Vec<(&'static str, u64)>,
}

impl RegistrationHandle {
    /// Returns the methods this handle keeps registered.
    pub fn methods(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(method, _)| *method).collect()
    }

    /// Removes the methods from the registry now.
    pub fn unregister(mut self) {
        self.release();
    }

    /// Leaves the methods registered for the lifetime of the registry.
    pub fn detach(mut self) {
        self.entries.clear();
    }

    /// Takes over the registrations kept by `other`.
    pub fn merge(&mut self, mut other: RegistrationHandle) {
        self.entries.append(&mut other.entries);
    }

    fn release(&mut self) {
        let inner = match self.registry.upgrade() {
            Some(inner) => inner,
            None => return,
        };

        for (method, id) in self.entries.drain(..) {
            // Only remove the entry if it was not replaced by a later registration.
            if inner.methods.remove_if(method, |_, registered| registered.id == id).is_some() {
                log::debug!("unregistered handler for {}", method);
            }
        }
    }
}

impl Drop for RegistrationHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl Debug for RegistrationHandle {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct(stringify!(RegistrationHandle))
            .field("methods", &self.methods())
            .finish()
    }
}

#[derive(Default)]
struct QueueState {
    held: bool,
    waiting: VecDeque<oneshot::Sender<()>>,
}

impl QueueState {
    /// Hands the queue to the oldest turn still waiting, skipping turns that were dropped.
    fn advance(&mut self) {
        while let Some(next) = self.waiting.pop_front() {
            if next.send(()).is_ok() {
                self.held = true;
                return;
            }
        }
        self.held = false;
    }
}

fn lock(state: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// First-in, first-out admission for calls to one ordered method.
///
/// Each [`Turn`] is admitted only after every turn enqueued before it has been dropped, whether its
/// call succeeded, failed, was cancelled, or never ran at all.
pub struct OrderedQueue {
    state: Arc<Mutex<QueueState>>,
}

impl OrderedQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        OrderedQueue {
            state: Arc::default(),
        }
    }

    /// Reserves the next position in the queue.
    pub fn enqueue(&self) -> Turn {
        let (admit, admitted) = oneshot::channel();
        let mut state = lock(&self.state);
        state.waiting.push_back(admit);
        if !state.held {
            state.advance();
        }
        Turn {
            state: self.state.clone(),
            admitted: Some(admitted),
        }
    }
}

impl Default for OrderedQueue {
    fn default() -> Self {
        OrderedQueue::new()
    }
}

impl Debug for OrderedQueue {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct(stringify!(OrderedQueue))
            .field("held", &state.held)
            .field("waiting", &state.waiting.len())
            .finish()
    }
}

/// A reserved position in an [`OrderedQueue`].
///
/// Dropping a turn gives up its position. A turn that was admitted but never waited on passes the
/// queue on to the next turn.
pub struct Turn {
    state: Arc<Mutex<QueueState>>,
    admitted: Option<oneshot::Receiver<()>>,
}

impl Turn {
    /// Waits until every earlier turn is over. The returned slot holds the queue until dropped.
    pub async fn wait(mut self) -> Slot {
        if let Some(admitted) = self.admitted.as_mut() {
            // The sender lives in the queue state this turn keeps alive, so it is never dropped unsent.
            let _ = admitted.await;
        }
        self.admitted = None;
        Slot {
            state: self.state.clone(),
        }
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        if let Some(mut admitted) = self.admitted.take() {
            let mut state = lock(&self.state);
            admitted.close();
            if let Ok(Some(())) = admitted.try_recv() {
                state.advance();
            }
        }
    }
}

impl Debug for Turn {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct(stringify!(Turn)).finish()
    }
}

/// Exclusive hold on an [`OrderedQueue`], released on drop.
pub struct Slot {
    state: Arc<Mutex<QueueState>>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        lock(&self.state).advance();
    }
}

impl Debug for Slot {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct(stringify!(Slot)).finish()
    }
}
