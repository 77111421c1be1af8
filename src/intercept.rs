//! Streaming interception between the model and the speech pipeline
//!
//! The node buffers the whole model reply before doing anything. Directive
//! spans can straddle chunk boundaries, and speaking a partial reply would
//! leak directive text into synthesis, so extraction, dispatch and
//! sanitation all run once on the complete buffer.

use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::{Stream, StreamExt, future, stream};
use tokio::task::JoinHandle;

use crate::Result;
use crate::capabilities::Capabilities;
use crate::directive::{Directive, DirectiveExtractor};
use crate::dispatch::{Dispatcher, ServiceCaller};
use crate::sanitize::Sanitizer;

/// Processing state of the node
///
/// A fresh node is `Buffering`. A turn stays `Buffering` while upstream
/// chunks arrive and switches to `Draining` once upstream completes; the node
/// then stays `Draining` until the next turn starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Accumulating upstream chunks
    Buffering,
    /// Upstream finished; the buffer has been processed or is being processed
    Draining,
}

impl NodeState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Buffering => 0,
            Self::Draining => 1,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Buffering,
            _ => Self::Draining,
        }
    }
}

/// Result of one conversation turn
#[derive(Debug, Default)]
pub struct TurnOutcome {
    /// Cleaned text for synthesis, absent when nothing speakable remains
    pub speech: Option<String>,
    /// Directives extracted from the reply, in extraction order
    pub directives: Vec<Directive>,
    /// Handles of the spawned service calls; dropping them detaches the calls
    pub tasks: Vec<JoinHandle<()>>,
    /// Directives refused by the capability table
    pub rejected: usize,
}

impl TurnOutcome {
    /// Number of directives handed to the backend
    #[must_use]
    pub fn dispatched(&self) -> usize {
        self.tasks.len()
    }
}

/// Sits between the model's output stream and the speech pipeline
#[derive(Debug)]
pub struct InterceptionNode {
    extractor: DirectiveExtractor,
    sanitizer: Sanitizer,
    dispatcher: Dispatcher,
    state: AtomicU8,
}

impl InterceptionNode {
    /// Build a node from a capability table and a backend
    ///
    /// # Errors
    ///
    /// Returns error if the sanitizer cannot be built for the known domains
    pub fn new(capabilities: Arc<Capabilities>, caller: Arc<dyn ServiceCaller>) -> Result<Self> {
        Ok(Self {
            extractor: DirectiveExtractor::new(Arc::clone(&capabilities)),
            sanitizer: Sanitizer::new(&capabilities)?,
            dispatcher: Dispatcher::new(capabilities, caller),
            state: AtomicU8::new(NodeState::Buffering.as_u8()),
        })
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: NodeState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Consume a whole upstream reply and process it
    ///
    /// Authorized directives are spawned as detached tasks and not awaited.
    /// Never fails: an empty stream or a reply without directives simply
    /// passes its cleaned text through.
    pub async fn drain<S, T>(&self, upstream: S) -> TurnOutcome
    where
        S: Stream<Item = T>,
        T: AsRef<str>,
    {
        self.set_state(NodeState::Buffering);

        let mut upstream = pin!(upstream);
        let mut buffer = String::new();
        let mut chunks = 0usize;
        while let Some(chunk) = upstream.next().await {
            buffer.push_str(chunk.as_ref());
            chunks += 1;
        }

        self.set_state(NodeState::Draining);
        tracing::debug!(chunks, len = buffer.len(), "upstream complete, draining buffer");

        self.process(&buffer)
    }

    /// Run extraction, dispatch and sanitation over a complete reply
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime while the reply contains an
    /// authorized directive
    #[must_use]
    pub fn process(&self, text: &str) -> TurnOutcome {
        let directives = self.extractor.extract(text);
        if !directives.is_empty() {
            tracing::info!(count = directives.len(), "found directives to execute");
        }

        let mut tasks = Vec::with_capacity(directives.len());
        let mut rejected = 0;
        for directive in &directives {
            match self.dispatcher.spawn(directive.clone()) {
                Some(task) => tasks.push(task),
                None => rejected += 1,
            }
        }

        let cleaned = self.sanitizer.sanitize(text);
        let speech = if cleaned.is_empty() {
            tracing::debug!("no text to speak after cleaning");
            None
        } else {
            tracing::trace!(speech = %cleaned, "emitting cleaned text");
            Some(cleaned)
        };

        TurnOutcome {
            speech,
            directives,
            tasks,
            rejected,
        }
    }

    /// Wrap an upstream chunk stream as the downstream text stream
    ///
    /// The returned stream yields at most one item: the cleaned reply. Service
    /// calls are left running in the background.
    pub fn intercept<S, T>(self: Arc<Self>, upstream: S) -> impl Stream<Item = String>
    where
        S: Stream<Item = T>,
        T: AsRef<str>,
    {
        stream::once(async move { self.drain(upstream).await.speech })
            .filter_map(future::ready)
    }
}
