//! The channel registry: one actor task per channel serialising every
//! administrative mutation (install/uninstall/set_condition/expiry) against
//! that channel's index table, plus the process-wide manager that maps
//! channel ids to actor handles.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::condition::{Condition, NormalisedCondition};
use crate::config::CoreConfig;
use crate::error::{CoreError, Result};
use crate::ids::{ChannelId, SinkId};
use crate::index::IndexTable;
use crate::lifetime::{self, CancelHandle, Lifetime};
use crate::severity::Severity;
use crate::sink::{SinkHandle, Writer, WriterSource};

/// What `install` does when a sink id is already registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfExists {
    /// Fail with `AlreadyInstalled`, leaving the existing sink untouched.
    Error,
    /// Leave the existing sink untouched and return it.
    Ignore,
    /// Replace the existing sink, cancelling its lifetime and atomically
    /// swapping its index entries for the new condition's.
    Supersede,
}

pub struct InstallOptions {
    pub lifetime: Lifetime,
    pub if_exists: IfExists,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self { lifetime: Lifetime::Infinity, if_exists: IfExists::Error }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LifetimeToken(u64);

struct RegistryEntry {
    handle: SinkHandle,
    cancel: Option<CancelHandle>,
    lifetime_token: Option<LifetimeToken>,
    forwarder: Option<JoinHandle<()>>,
}

enum Command {
    Install {
        sink: SinkHandle,
        options: InstallOptions,
        reply: oneshot::Sender<Result<Option<SinkHandle>>>,
    },
    Uninstall {
        id: SinkId,
        reply: oneshot::Sender<Result<SinkHandle>>,
    },
    Find {
        id: SinkId,
        reply: oneshot::Sender<Option<SinkHandle>>,
    },
    ListSinks {
        reply: oneshot::Sender<Vec<SinkHandle>>,
    },
    SetCondition {
        id: SinkId,
        condition: Condition,
        reply: oneshot::Sender<Result<NormalisedCondition>>,
    },
    Expire {
        id: SinkId,
        token: LifetimeToken,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// The per-channel actor. Owns every `RegistryEntry` and is the only task
/// that ever mutates them; it shares its `IndexTable` with the channel's
/// `select` callers, who never go through this actor at all.
struct ChannelActor {
    channel_id: ChannelId,
    index: Arc<IndexTable>,
    entries: AHashMap<SinkId, RegistryEntry>,
    next_token: u64,
    self_tx: mpsc::Sender<Command>,
}

impl ChannelActor {
    fn new(channel_id: ChannelId, index: Arc<IndexTable>, self_tx: mpsc::Sender<Command>) -> Self {
        Self { channel_id, index, entries: AHashMap::new(), next_token: 0, self_tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Install { sink, options, reply } => {
                    let result = self.handle_install(sink, options);
                    let _ = reply.send(result);
                }
                Command::Uninstall { id, reply } => {
                    let result = self.handle_uninstall(&id);
                    let _ = reply.send(result);
                }
                Command::Find { id, reply } => {
                    let _ = reply.send(self.entries.get(&id).map(|e| e.handle.clone()));
                }
                Command::ListSinks { reply } => {
                    let _ = reply.send(self.entries.values().map(|e| e.handle.clone()).collect());
                }
                Command::SetCondition { id, condition, reply } => {
                    let result = self.handle_set_condition(id, condition);
                    let _ = reply.send(result);
                }
                Command::Expire { id, token } => {
                    self.handle_expire(id, token);
                }
                Command::Shutdown { reply } => {
                    self.handle_shutdown();
                    let _ = reply.send(());
                    return;
                }
            }
        }
    }

    fn handle_install(&mut self, sink: SinkHandle, options: InstallOptions) -> Result<Option<SinkHandle>> {
        if let Some(existing) = self.entries.get(&sink.id) {
            let previous = existing.handle.clone();
            match options.if_exists {
                IfExists::Error => {
                    return Err(CoreError::AlreadyInstalled {
                        sink_id: sink.id.to_string(),
                        previous: Box::new(previous),
                    });
                }
                IfExists::Ignore => return Ok(Some(previous)),
                IfExists::Supersede => {
                    let old_condition = previous.condition.clone();
                    self.take_entry(&sink.id);
                    let forwarder = self.install_writer_source(&sink);
                    self.index.register(&sink.id, &sink.condition, &old_condition);
                    let (cancel, token) = self.start_lifetime(sink.id.clone(), options.lifetime);
                    let id = sink.id.clone();
                    self.entries.insert(id.clone(), RegistryEntry { handle: sink, cancel, lifetime_token: token, forwarder });
                    tracing::debug!(channel = %self.channel_id, sink = %id, "sink superseded");
                    return Ok(Some(previous));
                }
            }
        }

        let forwarder = self.install_writer_source(&sink);
        self.index.register(&sink.id, &sink.condition, &NormalisedCondition::empty());
        let (cancel, token) = self.start_lifetime(sink.id.clone(), options.lifetime);
        let id = sink.id.clone();
        self.entries.insert(id.clone(), RegistryEntry { handle: sink, cancel, lifetime_token: token, forwarder });
        tracing::debug!(channel = %self.channel_id, sink = %id, "sink installed");
        Ok(None)
    }

    fn handle_uninstall(&mut self, id: &SinkId) -> Result<SinkHandle> {
        let entry = self.take_entry(id).ok_or_else(|| CoreError::NotFound(id.to_string()))?;
        self.index.deregister(id, &entry.handle.condition);
        tracing::debug!(channel = %self.channel_id, sink = %id, "sink uninstalled");
        Ok(entry.handle)
    }

    fn handle_set_condition(&mut self, id: SinkId, condition: Condition) -> Result<NormalisedCondition> {
        let new_condition = condition.normalise()?;
        if !self.entries.contains_key(&id) {
            return Err(CoreError::NotFound(id.to_string()));
        }
        let old_condition = {
            let entry = self.entries.get_mut(&id).expect("presence checked above");
            std::mem::replace(&mut entry.handle.condition, new_condition.clone())
        };
        self.index.register(&id, &new_condition, &old_condition);
        tracing::debug!(channel = %self.channel_id, sink = %id, "sink condition updated");
        Ok(old_condition)
    }

    fn handle_expire(&mut self, id: SinkId, token: LifetimeToken) {
        let matches = self.entries.get(&id).and_then(|e| e.lifetime_token) == Some(token);
        if !matches {
            return;
        }
        if let Some(entry) = self.take_entry(&id) {
            self.index.deregister(&id, &entry.handle.condition);
            tracing::debug!(channel = %self.channel_id, sink = %id, "sink lifetime expired");
        }
    }

    fn handle_shutdown(&mut self) {
        let ids: Vec<SinkId> = self.entries.keys().cloned().collect();
        for id in ids {
            if let Some(entry) = self.take_entry(&id) {
                self.index.deregister(&id, &entry.handle.condition);
            }
        }
    }

    /// Removes and returns an entry, cancelling its lifetime watcher and
    /// aborting its writer-forwarding task. Common to uninstall, expiry,
    /// supersede, and shutdown.
    fn take_entry(&mut self, id: &SinkId) -> Option<RegistryEntry> {
        let mut entry = self.entries.remove(id)?;
        if let Some(cancel) = entry.cancel.take() {
            cancel.cancel();
        }
        if let Some(forwarder) = entry.forwarder.take() {
            forwarder.abort();
        }
        Some(entry)
    }

    /// Publishes a sink's writer into the index table: immediately for an
    /// immediate source, or by spawning a forwarder that keeps the index
    /// table's writer entry in sync with a deferred source's `watch`
    /// channel for as long as the sink stays installed.
    fn install_writer_source(&self, sink: &SinkHandle) -> Option<JoinHandle<()>> {
        match &sink.writer_source {
            WriterSource::Immediate(writer) => {
                self.index.set_writer(&sink.id, Some(Arc::clone(writer)));
                None
            }
            WriterSource::Deferred(rx) => {
                self.index.set_writer(&sink.id, rx.borrow().clone());
                let index = Arc::clone(&self.index);
                let sink_id = sink.id.clone();
                let mut rx = rx.clone();
                Some(tokio::spawn(async move {
                    loop {
                        if rx.changed().await.is_err() {
                            break;
                        }
                        let writer = rx.borrow().clone();
                        index.set_writer(&sink_id, writer);
                    }
                }))
            }
        }
    }

    fn start_lifetime(&mut self, sink_id: SinkId, lifetime: Lifetime) -> (Option<CancelHandle>, Option<LifetimeToken>) {
        if matches!(lifetime, Lifetime::Infinity) {
            return (None, None);
        }
        let token = LifetimeToken(self.next_token);
        self.next_token += 1;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            if lifetime::await_expiry(lifetime, cancel_rx).await {
                let _ = tx.send(Command::Expire { id: sink_id, token }).await;
            }
        });
        (Some(CancelHandle::new(cancel_tx)), Some(token))
    }
}

#[derive(Clone)]
struct ChannelHandle {
    channel_id: ChannelId,
    tx: mpsc::Sender<Command>,
    index: Arc<IndexTable>,
}

impl ChannelHandle {
    fn not_running(&self) -> CoreError {
        CoreError::ChannelNotRunning(self.channel_id.to_string())
    }

    async fn install(&self, sink: SinkHandle, options: InstallOptions) -> Result<Option<SinkHandle>> {
        if let Lifetime::Duration(d) = &options.lifetime {
            if d.as_millis() >= (1u128 << 32) {
                return Err(CoreError::InvalidArgument(format!(
                    "lifetime of {}ms exceeds the 2^32ms bound",
                    d.as_millis()
                )));
            }
        }
        let (reply, reply_rx) = oneshot::channel();
        self.tx.send(Command::Install { sink, options, reply }).await.map_err(|_| self.not_running())?;
        reply_rx.await.map_err(|_| self.not_running())?
    }

    async fn uninstall(&self, id: &SinkId) -> Result<SinkHandle> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx.send(Command::Uninstall { id: id.clone(), reply }).await.map_err(|_| self.not_running())?;
        reply_rx.await.map_err(|_| self.not_running())?
    }

    async fn find(&self, id: &SinkId) -> Option<SinkHandle> {
        let (reply, reply_rx) = oneshot::channel();
        if self.tx.send(Command::Find { id: id.clone(), reply }).await.is_err() {
            return None;
        }
        reply_rx.await.ok().flatten()
    }

    async fn list_sinks(&self) -> Vec<SinkHandle> {
        let (reply, reply_rx) = oneshot::channel();
        if self.tx.send(Command::ListSinks { reply }).await.is_err() {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    async fn set_condition(&self, id: SinkId, condition: Condition) -> Result<NormalisedCondition> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx.send(Command::SetCondition { id, condition, reply }).await.map_err(|_| self.not_running())?;
        reply_rx.await.map_err(|_| self.not_running())?
    }

    async fn shutdown(self) {
        let (reply, reply_rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = reply_rx.await;
        }
    }
}

/// The process-wide map from channel id to running channel actor. Owns
/// `create`/`delete`/`list_channels` and multiplexes every other
/// administrative call and every `select_sinks` hot-path lookup to the
/// right channel.
pub struct ChannelManager {
    config: CoreConfig,
    handles: RwLock<AHashMap<ChannelId, ChannelHandle>>,
}

impl ChannelManager {
    pub fn new(config: CoreConfig) -> Arc<Self> {
        Arc::new(Self { config, handles: RwLock::new(AHashMap::new()) })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Spawns a new channel actor. Fails if the id is already in use.
    pub fn create(&self, channel_id: ChannelId) -> Result<()> {
        let mut handles = self.handles.write();
        if handles.contains_key(&channel_id) {
            return Err(CoreError::InvalidArgument(format!("channel `{channel_id}` already exists")));
        }
        let (tx, rx) = mpsc::channel(self.config.channel_inbox_capacity);
        let index = Arc::new(IndexTable::new());
        let actor = ChannelActor::new(channel_id.clone(), Arc::clone(&index), tx.clone());
        tokio::spawn(actor.run(rx));
        handles.insert(channel_id.clone(), ChannelHandle { channel_id, tx, index });
        Ok(())
    }

    /// Removes a channel from the map first, so any administrative call
    /// racing the deletion either reaches the live actor or observes the
    /// channel gone, never a partially-shut-down state; then cancels every
    /// sink's lifetime and forwarder before returning.
    pub async fn delete(&self, channel_id: &ChannelId) -> Result<()> {
        let handle = self.handles.write().remove(channel_id);
        match handle {
            Some(h) => {
                h.shutdown().await;
                Ok(())
            }
            None => Err(CoreError::ChannelNotRunning(channel_id.to_string())),
        }
    }

    pub fn list_channels(&self) -> Vec<ChannelId> {
        self.handles.read().keys().cloned().collect()
    }

    fn handle(&self, channel_id: &ChannelId) -> Result<ChannelHandle> {
        self.handles
            .read()
            .get(channel_id)
            .cloned()
            .ok_or_else(|| CoreError::ChannelNotRunning(channel_id.to_string()))
    }

    pub async fn install_sink(&self, channel_id: &ChannelId, sink: SinkHandle, options: InstallOptions) -> Result<Option<SinkHandle>> {
        self.handle(channel_id)?.install(sink, options).await
    }

    pub async fn uninstall_sink(&self, channel_id: &ChannelId, sink_id: &SinkId) -> Result<SinkHandle> {
        self.handle(channel_id)?.uninstall(sink_id).await
    }

    pub async fn find_sink(&self, channel_id: &ChannelId, sink_id: &SinkId) -> Result<Option<SinkHandle>> {
        Ok(self.handle(channel_id)?.find(sink_id).await)
    }

    pub async fn list_sinks(&self, channel_id: &ChannelId) -> Result<Vec<SinkHandle>> {
        Ok(self.handle(channel_id)?.list_sinks().await)
    }

    pub async fn set_condition(&self, channel_id: &ChannelId, sink_id: &SinkId, condition: Condition) -> Result<NormalisedCondition> {
        self.handle(channel_id)?.set_condition(sink_id.clone(), condition).await
    }

    /// The hot path: resolves a tagged record against a channel's index
    /// table with only a brief read lock. A non-existent channel resolves
    /// to an empty list, never an error — emitters never block on, or
    /// fail from, administrative state.
    pub fn select_sinks(&self, channel_id: &ChannelId, severity: Severity, application: &str, module: &str) -> Vec<Arc<dyn Writer>> {
        match self.handles.read().get(channel_id) {
            Some(h) => h.index.select(severity, application, module),
            None => Vec::new(),
        }
    }
}
