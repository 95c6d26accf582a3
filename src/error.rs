//! Typed error kinds for the public API.

use thiserror::Error;

use crate::sink::SinkHandle;

/// Every failure mode this crate recognises, including `WriterFailure`,
/// which is never returned from a call site — it exists so that
/// diagnostics (`tracing` events) and tests share one vocabulary with the
/// errors that are.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A caller-supplied value is malformed: an empty/whitespace id, an
    /// empty severity list, or a severity range with `low > high`.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The named channel has no running actor (never created, or deleted).
    #[error("channel `{0}` is not running")]
    ChannelNotRunning(String),

    /// `install` found a sink already registered under this id and the
    /// caller asked to fail on collision. Carries the sink already there.
    #[error("sink `{sink_id}` is already installed")]
    AlreadyInstalled {
        sink_id: String,
        previous: Box<SinkHandle>,
    },

    /// `uninstall`/`set_condition`/`find` referenced a sink id that isn't
    /// registered on the channel.
    #[error("sink `{0}` not found")]
    NotFound(String),

    /// A sink's `Writer::write` returned an error. Isolated per sink: it
    /// never aborts dispatch to the remaining sinks and is surfaced only
    /// as a `tracing::error!` diagnostic, never as a `Result::Err`.
    #[error("writer for sink `{sink_id}` on channel `{channel_id}` failed: {message}")]
    WriterFailure {
        channel_id: String,
        sink_id: String,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_stable() {
        let err = CoreError::ChannelNotRunning("c1".into());
        assert_eq!(err.to_string(), "channel `c1` is not running");

        let err = CoreError::NotFound("s1".into());
        assert_eq!(err.to_string(), "sink `s1` not found");
    }
}
