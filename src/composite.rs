//! The composite sink coordinator: groups several child sinks under one
//! sink id and republishes whichever child is currently "active" as that
//! id's writer, so a parent channel can hot-swap backends without ever
//! uninstalling and reinstalling the sink.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::error::{CoreError, Result};
use crate::ids::SinkId;
use crate::sink::{SinkHandle, Writer, WriterSource};

struct CompositeState {
    cached: Vec<Option<Arc<dyn Writer>>>,
    active: Option<usize>,
}

/// Coordinates a fixed set of child sinks, republishing the active one's
/// writer through a `watch` channel any parent can subscribe to via
/// [`CompositeSinkCoordinator::as_sink_handle`].
pub struct CompositeSinkCoordinator {
    id: SinkId,
    children: Vec<SinkHandle>,
    state: RwLock<CompositeState>,
    publish: watch::Sender<Option<Arc<dyn Writer>>>,
}

impl CompositeSinkCoordinator {
    /// Builds a coordinator over `children`, gathering each child's
    /// initial writer (waiting up to `initial_wait` for children whose
    /// writer publishes asynchronously) and defaulting the active child to
    /// the last one in the list.
    pub async fn new(id: SinkId, children: Vec<SinkHandle>, initial_wait: Duration) -> Result<Arc<Self>> {
        if children.is_empty() {
            return Err(CoreError::InvalidArgument(format!(
                "composite sink `{id}` needs at least one child"
            )));
        }

        let mut cached = Vec::with_capacity(children.len());
        for child in &children {
            cached.push(Self::gather_initial(child, initial_wait).await);
        }

        let active = children.len() - 1;
        let (publish, _receiver) = watch::channel(cached[active].clone());

        let coordinator = Arc::new(Self {
            id,
            children,
            state: RwLock::new(CompositeState { cached, active: Some(active) }),
            publish,
        });

        for (index, child) in coordinator.children.iter().enumerate() {
            if let WriterSource::Deferred(rx) = &child.writer_source {
                coordinator.spawn_forwarder(index, rx.clone());
            }
        }

        Ok(coordinator)
    }

    async fn gather_initial(child: &SinkHandle, initial_wait: Duration) -> Option<Arc<dyn Writer>> {
        match &child.writer_source {
            WriterSource::Immediate(writer) => Some(Arc::clone(writer)),
            WriterSource::Deferred(rx) => {
                if let Some(writer) = rx.borrow().clone() {
                    return Some(writer);
                }
                let mut rx = rx.clone();
                match tokio::time::timeout(initial_wait, rx.changed()).await {
                    Ok(Ok(())) => rx.borrow().clone(),
                    _ => None,
                }
            }
        }
    }

    fn spawn_forwarder(self: &Arc<Self>, index: usize, mut rx: watch::Receiver<Option<Arc<dyn Writer>>>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if rx.changed().await.is_err() {
                    break;
                }
                let writer = rx.borrow().clone();
                this.handle_writer_update(index, writer);
            }
        });
    }

    fn handle_writer_update(&self, index: usize, writer: Option<Arc<dyn Writer>>) {
        let mut state = self.state.write();
        state.cached[index] = writer.clone();
        if state.active == Some(index) {
            let _ = self.publish.send(writer);
        }
    }

    pub fn id(&self) -> &SinkId {
        &self.id
    }

    pub fn get_children(&self) -> &[SinkHandle] {
        &self.children
    }

    /// Makes the `n`th child (1-indexed) active, republishing its cached
    /// writer upward immediately.
    pub fn set_active(&self, n: usize) -> Result<()> {
        if n == 0 || n > self.children.len() {
            return Err(CoreError::InvalidArgument(format!(
                "composite sink `{}` has {} children, cannot activate index {n}",
                self.id,
                self.children.len()
            )));
        }
        let index = n - 1;
        let writer = {
            let mut state = self.state.write();
            state.active = Some(index);
            state.cached[index].clone()
        };
        let _ = self.publish.send(writer);
        Ok(())
    }

    /// Clears the active child; the coordinator publishes no writer until
    /// `set_active` is called again.
    pub fn unset_active(&self) {
        self.state.write().active = None;
        let _ = self.publish.send(None);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<dyn Writer>>> {
        self.publish.subscribe()
    }

    /// A sink handle for this coordinator, installable on a channel like
    /// any other sink — its writer hot-swaps as `set_active` changes.
    pub fn as_sink_handle(&self, condition: crate::condition::NormalisedCondition) -> SinkHandle {
        SinkHandle::deferred(self.id.clone(), condition, self.subscribe())
    }
}
