//! Partial results and work-done progress scoped to a single call.
//!
//! Every inbound call gets its own [`ProgressChannel`], made of two halves:
//!
//! * [`PartialResults`] streams pieces of the result to the client as `$/progress` notifications
//!   under the caller's `partialResultToken`.
//! * [`WorkDoneProgressReporter`] sends `begin`, `report` and `end` notifications under the
//!   caller's `workDoneToken`.
//!
//! A half whose token was not supplied is a null object: every call on it succeeds and nothing is
//! transmitted, so handlers never branch on whether the client asked for progress. Emission stops
//! once the channel is released or the call is cancelled.

use crate::{client::Client, config::HandlerConfig, method::Method};
use serde::Serialize;
use std::{
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
        Mutex,
        PoisonError,
    },
};
use tokio_util::sync::CancellationToken;

/// Opens progress channels for inbound calls.
#[derive(Clone)]
pub struct ProgressManager {
    client: Client,
    config: Arc<HandlerConfig>,
}

impl ProgressManager {
    /// Creates a manager which sends notifications through `client` using the default config.
    pub fn new(client: Client) -> Self {
        ProgressManager::with_config(client, HandlerConfig::default())
    }

    /// Creates a manager with explicit settings.
    pub fn with_config(client: Client, config: HandlerConfig) -> Self {
        ProgressManager {
            client,
            config: Arc::new(config),
        }
    }

    /// Returns the settings in use.
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Opens the channel for one call to method `M`, using the tokens found in its parameters.
    pub fn open<M: Method>(&self, params: &M::Params, token: &CancellationToken) -> ProgressChannel<M::Partial> {
        ProgressChannel {
            partial_results: self.partial_results(M::partial_result_token(params).cloned(), token),
            work_done: self.work_done(M::work_done_token(params).cloned(), token),
            released: AtomicBool::new(false),
        }
    }

    /// Opens a partial result emitter for the given token.
    pub fn partial_results<T>(&self, token: Option<lsp::ProgressToken>, cancel: &CancellationToken) -> PartialResults<T> {
        PartialResults {
            inner: token.map(|token| {
                Arc::new(PartialInner {
                    client: self.client.clone(),
                    token,
                    cancel: cancel.clone(),
                    closed: AtomicBool::new(false),
                })
            }),
            _marker: PhantomData,
        }
    }

    /// Opens a work-done progress reporter for the given token.
    pub fn work_done(&self, token: Option<lsp::ProgressToken>, cancel: &CancellationToken) -> WorkDoneProgressReporter {
        WorkDoneProgressReporter {
            inner: token.map(|token| {
                Arc::new(ReporterInner {
                    client: self.client.clone(),
                    token,
                    cancel: cancel.clone(),
                    config: self.config.clone(),
                    phase: Mutex::new(Phase::Idle),
                })
            }),
        }
    }
}

impl Debug for ProgressManager {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct(stringify!(ProgressManager))
            .field("client", &self.client)
            .field("config", &self.config)
            .finish()
    }
}

/// The partial result emitter and work-done reporter of one call.
///
/// Released exactly once, either by [`dispose`](ProgressChannel::dispose) or when dropped, which
/// covers calls whose future is dropped before it completes. Releasing again does nothing.
pub struct ProgressChannel<T> {
    partial_results: PartialResults<T>,
    work_done: WorkDoneProgressReporter,
    released: AtomicBool,
}

impl<T> ProgressChannel<T> {
    /// Returns a handle to the partial result emitter.
    pub fn partial_results(&self) -> PartialResults<T> {
        self.partial_results.clone()
    }

    /// Returns a handle to the work-done progress reporter.
    pub fn work_done(&self) -> WorkDoneProgressReporter {
        self.work_done.clone()
    }

    /// Closes both halves, sending `end` if progress was begun.
    ///
    /// Returns `true` if this call performed the release, `false` if it had already happened.
    pub fn dispose(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            log::trace!("progress channel already released");
            return false;
        }

        self.partial_results.close();
        self.work_done.end();
        true
    }

    /// Returns `true` once the channel has been released.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl<T> Drop for ProgressChannel<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T> Debug for ProgressChannel<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct(stringify!(ProgressChannel))
            .field("partial_results", &self.partial_results)
            .field("work_done", &self.work_done)
            .field("released", &self.is_released())
            .finish()
    }
}

struct PartialInner {
    client: Client,
    token: lsp::ProgressToken,
    cancel: CancellationToken,
    closed: AtomicBool,
}

/// Streams pieces of a method's result to the client before the final result.
///
/// Values arrive at the client in the order they were emitted. Emissions after the channel was
/// released or the call was cancelled are dropped.
pub struct PartialResults<T> {
    inner: Option<Arc<PartialInner>>,
    _marker: PhantomData<fn(T)>,
}

impl<T> PartialResults<T> {
    /// Creates an emitter which discards everything.
    pub fn noop() -> Self {
        PartialResults {
            inner: None,
            _marker: PhantomData,
        }
    }

    /// Returns `true` if the caller asked for partial results.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Returns `true` if emitted values are still forwarded to the client.
    pub fn is_open(&self) -> bool {
        match &self.inner {
            Some(inner) => !inner.closed.load(Ordering::SeqCst) && !inner.cancel.is_cancelled(),
            None => false,
        }
    }

    fn close(&self) {
        if let Some(inner) = &self.inner {
            inner.closed.store(true, Ordering::SeqCst);
        }
    }
}

impl<T: Serialize> PartialResults<T> {
    /// Sends one partial result to the client.
    pub fn emit(&self, value: T) {
        let inner = match &self.inner {
            Some(inner) => inner,
            None => return,
        };

        if !self.is_open() {
            log::trace!("dropping partial result for closed token {:?}", inner.token);
            return;
        }

        match serde_json::to_value(value) {
            Ok(value) => inner.client.send_progress(&inner.token, value),
            Err(e) => log::error!("invalid JSON in partial result: {}", e),
        }
    }
}

impl<T> Clone for PartialResults<T> {
    fn clone(&self) -> Self {
        PartialResults {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Debug for PartialResults<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct(stringify!(PartialResults))
            .field("token", &self.inner.as_ref().map(|inner| &inner.token))
            .field("open", &self.is_open())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Phase {
    Idle,
    Active,
    Done,
}

struct ReporterInner {
    client: Client,
    token: lsp::ProgressToken,
    cancel: CancellationToken,
    config: Arc<HandlerConfig>,
    phase: Mutex<Phase>,
}

impl ReporterInner {
    fn send(&self, progress: lsp::WorkDoneProgress) {
        self.client
            .send_notification::<lsp::notification::Progress>(lsp::ProgressParams {
                token: self.token.clone(),
                value: lsp::ProgressParamsValue::WorkDone(progress),
            });
    }
}

/// Reports work-done progress for one call.
///
/// The first report implicitly sends `begin`, later ones send `report`, and releasing the owning
/// [`ProgressChannel`] sends `end` once. Without a work-done token this is a null object.
#[derive(Clone)]
pub struct WorkDoneProgressReporter {
    inner: Option<Arc<ReporterInner>>,
}

impl WorkDoneProgressReporter {
    /// Creates a reporter which discards everything.
    pub fn noop() -> Self {
        WorkDoneProgressReporter { inner: None }
    }

    /// Returns `true` if the caller asked for work-done progress.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Sends `begin` with an explicit title. Does nothing if progress has already begun.
    pub fn begin<S: Into<String>>(&self, title: S) {
        self.transition(Some(title.into()), None, None);
    }

    /// Reports a message and an optional percentage, beginning progress first if needed.
    ///
    /// Percentages above 100 are clamped.
    pub fn report<S: Into<String>>(&self, message: S, percentage: Option<u32>) {
        self.transition(None, Some(message.into()), percentage.map(|p| p.min(100)));
    }

    fn transition(&self, title: Option<String>, message: Option<String>, percentage: Option<u32>) {
        let inner = match &self.inner {
            Some(inner) => inner,
            None => return,
        };

        let mut phase = inner.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.cancel.is_cancelled() {
            log::trace!("dropping progress for cancelled token {:?}", inner.token);
            return;
        }

        let cancellable = Some(inner.config.cancellable_progress);
        match *phase {
            Phase::Idle => {
                *phase = Phase::Active;
                inner.send(lsp::WorkDoneProgress::Begin(lsp::WorkDoneProgressBegin {
                    title: title.unwrap_or_else(|| inner.config.work_done_title.clone()),
                    cancellable,
                    message,
                    percentage,
                }));
            },
            Phase::Active if title.is_none() => {
                inner.send(lsp::WorkDoneProgress::Report(lsp::WorkDoneProgressReport {
                    cancellable,
                    message,
                    percentage,
                }));
            },
            Phase::Active => {},
            Phase::Done => log::trace!("dropping progress for released token {:?}", inner.token),
        }
    }

    fn end(&self) {
        if let Some(inner) = &self.inner {
            let mut phase = inner.phase.lock().unwrap_or_else(PoisonError::into_inner);
            if *phase == Phase::Active {
                inner.send(lsp::WorkDoneProgress::End(lsp::WorkDoneProgressEnd { message: None }));
            }
            *phase = Phase::Done;
        }
    }
}

impl Debug for WorkDoneProgressReporter {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let mut debug = f.debug_struct(stringify!(WorkDoneProgressReporter));
        match &self.inner {
            Some(inner) => {
                let phase = *inner.phase.lock().unwrap_or_else(PoisonError::into_inner);
                debug.field("token", &Some(&inner.token)).field("phase", &phase)
            },
            None => debug.field("token", &None::<&lsp::ProgressToken>),
        }
        .finish()
    }
}

/// Returns the `kind` of a `$/progress` work-done payload, if `value` is one.
#[cfg(test)]
pub(crate) fn work_done_kind(value: &serde_json::Value) -> Option<&str> {
    value.get("value")?.get("kind")?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MessageStream;
    use serde_json::json;

    fn manager() -> (ProgressManager, MessageStream) {
        let (client, messages) = Client::new();
        (ProgressManager::new(client), messages)
    }

    fn kinds(messages: &mut MessageStream) -> Vec<String> {
        messages
            .drain()
            .iter()
            .filter_map(|m| m.params().and_then(work_done_kind).map(str::to_owned))
            .collect()
    }

    #[test]
    fn partial_results_in_order() {
        let (manager, mut messages) = manager();
        let cancel = CancellationToken::new();
        let partials = manager.partial_results::<Vec<u32>>(Some(lsp::ProgressToken::Number(5)), &cancel);
        assert!(partials.is_enabled());

        partials.emit(vec![1, 2]);
        partials.emit(vec![3]);

        let values: Vec<_> = messages.drain().into_iter().map(|m| m.params().cloned()).collect();
        assert_eq!(
            values,
            vec![
                Some(json!({ "token": 5, "value": [1, 2] })),
                Some(json!({ "token": 5, "value": [3] })),
            ]
        );
    }

    #[test]
    fn missing_tokens_are_null_objects() {
        let (manager, mut messages) = manager();
        let cancel = CancellationToken::new();
        let partials = manager.partial_results::<u32>(None, &cancel);
        let progress = manager.work_done(None, &cancel);

        partials.emit(1);
        progress.begin("Indexing");
        progress.report("half way", Some(50));

        assert!(!partials.is_enabled());
        assert!(!progress.is_enabled());
        assert!(messages.drain().is_empty());
    }

    #[test]
    fn implicit_begin_then_report_then_single_end() {
        let (manager, mut messages) = manager();
        let cancel = CancellationToken::new();
        let channel = ProgressChannel::<()> {
            partial_results: PartialResults::noop(),
            work_done: manager.work_done(Some(lsp::ProgressToken::String("w".into())), &cancel),
            released: AtomicBool::new(false),
        };

        let progress = channel.work_done();
        progress.report("scanning", Some(10));
        progress.report("scanning", Some(250));

        assert!(channel.dispose());
        assert!(!channel.dispose());
        drop(channel);

        let sent = messages.drain();
        assert_eq!(sent.len(), 3);
        assert_eq!(
            sent[0].params(),
            Some(&json!({
                "token": "w",
                "value": { "kind": "begin", "title": "Working", "cancellable": true, "message": "scanning", "percentage": 10 }
            }))
        );
        assert_eq!(
            sent[1].params(),
            Some(&json!({
                "token": "w",
                "value": { "kind": "report", "cancellable": true, "message": "scanning", "percentage": 100 }
            }))
        );
        assert_eq!(sent[2].params(), Some(&json!({ "token": "w", "value": { "kind": "end" } })));
    }

    #[test]
    fn explicit_begin_uses_title() {
        let (client, mut messages) = Client::new();
        let config = HandlerConfig {
            work_done_title: "unused".into(),
            cancellable_progress: false,
        };
        let manager = ProgressManager::with_config(client, config);
        let progress = manager.work_done(Some(lsp::ProgressToken::Number(1)), &CancellationToken::new());

        progress.begin("Finding references");
        progress.begin("ignored");

        let sent = messages.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].params(),
            Some(&json!({
                "token": 1,
                "value": { "kind": "begin", "title": "Finding references", "cancellable": false }
            }))
        );
    }

    #[test]
    fn no_end_without_begin() {
        let (manager, mut messages) = manager();
        let cancel = CancellationToken::new();
        let channel = ProgressChannel::<()> {
            partial_results: PartialResults::noop(),
            work_done: manager.work_done(Some(lsp::ProgressToken::Number(1)), &cancel),
            released: AtomicBool::new(false),
        };
        assert!(channel.dispose());
        assert!(messages.drain().is_empty());
    }

    #[test]
    fn emission_after_release_is_dropped() {
        let (manager, mut messages) = manager();
        let cancel = CancellationToken::new();
        let channel = ProgressChannel {
            partial_results: manager.partial_results::<u32>(Some(lsp::ProgressToken::Number(1)), &cancel),
            work_done: manager.work_done(Some(lsp::ProgressToken::Number(2)), &cancel),
            released: AtomicBool::new(false),
        };
        let partials = channel.partial_results();
        let progress = channel.work_done();
        drop(channel);

        partials.emit(1);
        progress.report("late", None);

        assert!(!partials.is_open());
        assert!(messages.drain().is_empty());
    }

    #[test]
    fn emission_after_cancel_is_dropped() {
        let (manager, mut messages) = manager();
        let cancel = CancellationToken::new();
        let partials = manager.partial_results::<u32>(Some(lsp::ProgressToken::Number(1)), &cancel);
        let progress = manager.work_done(Some(lsp::ProgressToken::Number(2)), &cancel);
        progress.report("started", None);

        cancel.cancel();
        partials.emit(1);
        progress.report("late", None);
        progress.end();

        assert_eq!(kinds(&mut messages), vec!["begin", "end"]);
    }

    #[test]
    fn debug() {
        let (manager, _messages) = manager();
        format!("{:?}", manager);
        format!("{:?}", WorkDoneProgressReporter::noop());
        format!("{:?}", PartialResults::<u32>::noop());
    }
}
