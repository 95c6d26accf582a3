//! The sink side of the dispatch contract: the `Writer` interface sinks
//! implement, and the handle the registry stores per installed sink.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;

use crate::condition::NormalisedCondition;
use crate::ids::SinkId;

/// Opaque per-record context the logging API above this crate attaches to
/// a record (caller location, timestamp, structured fields, ...). Record
/// formatting and context capture are out of scope here; this crate only
/// ever forwards the bag unopened to a `Writer`.
pub type RecordContext = BTreeMap<String, String>;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct WriterError(pub String);

/// The interface a sink backend implements to receive dispatched records.
/// Formatting and the actual write target (file, socket, in-memory buffer)
/// are entirely up to the implementation; this crate never constructs one.
pub trait Writer: Send + Sync {
    /// Writes one record. A returned error is isolated by the dispatcher:
    /// it's reported as a diagnostic and never stops dispatch to the
    /// remaining sinks.
    fn write(&self, context: &RecordContext, format: &str, data: &[u8]) -> Result<(), WriterError>;

    /// Identifies the ultimate write target, for introspection and
    /// diagnostics (e.g. a file path or socket address). `None` if the
    /// sink has no single stable target worth naming.
    fn get_writee(&self) -> Option<String> {
        None
    }
}

impl std::fmt::Debug for dyn Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get_writee() {
            Some(writee) => write!(f, "Writer({writee})"),
            None => f.write_str("Writer(..)"),
        }
    }
}

/// How a sink's writer becomes available: handed over immediately at
/// install time, or published asynchronously by a subordinate task the
/// caller manages (a plain sink backed by a slow-starting backend, or a
/// composite coordinator's active-writer publish).
#[derive(Clone)]
pub enum WriterSource {
    Immediate(Arc<dyn Writer>),
    Deferred(watch::Receiver<Option<Arc<dyn Writer>>>),
}

impl std::fmt::Debug for WriterSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriterSource::Immediate(w) => write!(f, "WriterSource::Immediate({w:?})"),
            WriterSource::Deferred(_) => f.write_str("WriterSource::Deferred(..)"),
        }
    }
}

/// A sink as the registry knows it: identity, normalised condition, and
/// where its writer comes from. This is what `install`/`find`/`list_sinks`
/// pass around.
#[derive(Clone)]
pub struct SinkHandle {
    pub id: SinkId,
    pub condition: NormalisedCondition,
    pub writer_source: WriterSource,
}

impl std::fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkHandle")
            .field("id", &self.id)
            .field("condition", &self.condition)
            .field("writer_source", &self.writer_source)
            .finish()
    }
}

impl SinkHandle {
    pub fn immediate(id: SinkId, condition: NormalisedCondition, writer: Arc<dyn Writer>) -> Self {
        Self { id, condition, writer_source: WriterSource::Immediate(writer) }
    }

    pub fn deferred(
        id: SinkId,
        condition: NormalisedCondition,
        writer: watch::Receiver<Option<Arc<dyn Writer>>>,
    ) -> Self {
        Self { id, condition, writer_source: WriterSource::Deferred(writer) }
    }
}
