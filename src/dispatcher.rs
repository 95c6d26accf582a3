//! The dispatcher: resolves a tagged record against a channel's index
//! table and forwards it to every matching writer, isolating failures.

use crate::ids::ChannelId;
use crate::registry::ChannelManager;
use crate::severity::Severity;
use crate::sink::RecordContext;

/// Dispatches one record to every sink matching its `(severity,
/// application, module)` tags on the given channel. This only ever takes
/// the index table's read lock (via `ChannelManager::select_sinks`) and
/// never touches a channel actor's command queue — the administrative and
/// emission paths share no lock.
pub struct Dispatcher<'a> {
    manager: &'a ChannelManager,
}

impl<'a> Dispatcher<'a> {
    pub fn new(manager: &'a ChannelManager) -> Self {
        Self { manager }
    }

    pub fn dispatch(
        &self,
        channel_id: &ChannelId,
        severity: Severity,
        application: &str,
        module: &str,
        context: &RecordContext,
        format: &str,
        data: &[u8],
    ) {
        let writers = self.manager.select_sinks(channel_id, severity, application, module);
        for writer in writers {
            if let Err(err) = writer.write(context, format, data) {
                tracing::error!(
                    channel = %channel_id,
                    writee = writer.get_writee().unwrap_or_else(|| "<unknown>".to_string()),
                    error = %err,
                    "sink writer failed; isolated, remaining sinks still dispatched"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::config::CoreConfig;
    use crate::ids::SinkId;
    use crate::registry::InstallOptions;
    use crate::sink::{SinkHandle, Writer, WriterError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingWriter {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }
    impl Writer for CountingWriter {
        fn write(&self, _context: &RecordContext, _format: &str, _data: &[u8]) -> std::result::Result<(), WriterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(WriterError("boom".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn dispatch_reaches_every_matching_sink_and_isolates_failures() {
        let manager = ChannelManager::new(CoreConfig::default());
        let channel = ChannelId::new("c1").unwrap();
        manager.create(channel.clone()).unwrap();

        let calls_ok = Arc::new(AtomicUsize::new(0));
        let calls_fail = Arc::new(AtomicUsize::new(0));
        let condition = Condition::severity(Severity::Info).normalise().unwrap();

        manager
            .install_sink(
                &channel,
                SinkHandle::immediate(
                    SinkId::new("ok").unwrap(),
                    condition.clone(),
                    Arc::new(CountingWriter { calls: Arc::clone(&calls_ok), fail: false }),
                ),
                InstallOptions::default(),
            )
            .await
            .unwrap();
        manager
            .install_sink(
                &channel,
                SinkHandle::immediate(
                    SinkId::new("fail").unwrap(),
                    condition,
                    Arc::new(CountingWriter { calls: Arc::clone(&calls_fail), fail: true }),
                ),
                InstallOptions::default(),
            )
            .await
            .unwrap();

        let dispatcher = Dispatcher::new(&manager);
        dispatcher.dispatch(&channel, Severity::Info, "app", "mod", &RecordContext::new(), "{}", b"record");

        assert_eq!(calls_ok.load(Ordering::SeqCst), 1);
        assert_eq!(calls_fail.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatch_on_unknown_channel_is_a_no_op() {
        let manager = ChannelManager::new(CoreConfig::default());
        let dispatcher = Dispatcher::new(&manager);
        let channel = ChannelId::new("missing").unwrap();
        dispatcher.dispatch(&channel, Severity::Debug, "app", "mod", &RecordContext::new(), "{}", b"record");
    }
}
