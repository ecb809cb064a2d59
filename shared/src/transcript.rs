//! The ordered message list and its loading placeholder.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::Timings;
use crate::models::{ChatMessage, LoadingStage, Sender};

#[derive(Debug, Default)]
struct Inner {
    messages: Mutex<Vec<ChatMessage>>,
    next_id: AtomicU64,
    detached: AtomicBool,
}

/// Shared handle to the widget's message list.
///
/// Cloning is cheap; background tasks hold clones so they can update the
/// list after the widget call that spawned them has returned. Once
/// [`Transcript::detach`] is called every update is dropped.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    inner: Arc<Inner>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ChatMessage>> {
        self.inner
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_detached(&self) -> bool {
        if self.inner.detached.load(Ordering::SeqCst) {
            debug!("Dropping transcript update after teardown");
            return true;
        }
        false
    }

    /// Identifier for messages that are later found again by id.
    pub fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn push(&self, message: ChatMessage) {
        if self.is_detached() {
            return;
        }
        self.lock().push(message);
    }

    /// Append a message tagged with a fresh id and return that id.
    pub fn push_tracked(&self, mut message: ChatMessage) -> u64 {
        let id = self.next_id();
        message.id = Some(id);
        self.push(message);
        id
    }

    /// Replace the text of the message with `id`. Returns false if it is gone.
    pub fn replace_text(&self, id: u64, text: &str) -> bool {
        if self.is_detached() {
            return false;
        }
        match self.lock().iter_mut().find(|m| m.id == Some(id)) {
            Some(message) => {
                message.text = Some(text.to_string());
                true
            }
            None => false,
        }
    }

    fn set_stage(&self, id: u64, stage: LoadingStage) {
        if self.is_detached() {
            return;
        }
        if let Some(message) = self
            .lock()
            .iter_mut()
            .find(|m| m.id == Some(id) && m.sender == Sender::Loading)
        {
            message.stage = Some(stage);
        }
    }

    fn remove(&self, id: u64) {
        self.lock()
            .retain(|m| !(m.id == Some(id) && m.sender == Sender::Loading));
    }

    /// Add a loading placeholder whose stage advances on the configured timers.
    pub fn begin_loading(&self, timings: &Timings) -> LoadingGuard {
        let id = self.push_tracked(ChatMessage::loading(0));
        let timers = [
            (timings.processing_after, LoadingStage::Processing),
            (timings.analyzing_after, LoadingStage::Analyzing),
        ]
        .into_iter()
        .map(|(delay, stage)| {
            let transcript = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                transcript.set_stage(id, stage);
            })
        })
        .collect();

        LoadingGuard {
            transcript: self.clone(),
            id,
            timers,
            resolved: false,
        }
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Stop accepting updates; pending background work becomes a no-op.
    pub fn detach(&self) {
        self.inner.detached.store(true, Ordering::SeqCst);
    }
}

/// Owns one loading placeholder and its stage timers.
///
/// Resolving (or dropping) the guard cancels the timers and removes the
/// placeholder, so no exit path can leave it behind.
#[derive(Debug)]
pub struct LoadingGuard {
    transcript: Transcript,
    id: u64,
    timers: Vec<JoinHandle<()>>,
    resolved: bool,
}

impl LoadingGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Move the placeholder to a new stage by hand.
    pub fn advance(&self, stage: LoadingStage) {
        self.transcript.set_stage(self.id, stage);
    }

    /// Cancel the timers and remove the placeholder.
    pub fn resolve(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.resolved {
            return;
        }
        self.resolved = true;
        for timer in self.timers.drain(..) {
            timer.abort();
        }
        self.transcript.remove(self.id);
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.finish();
    }
}
