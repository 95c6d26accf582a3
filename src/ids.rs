//! Symbolic identifiers for channels and sinks.
//!
//! Both ids are validated once, at construction, so that everything
//! downstream can treat a `SinkId`/`ChannelId` as already well-formed.

use std::sync::Arc;

use crate::error::CoreError;

macro_rules! symbolic_id {
    ($name:ident, $label:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(Arc<str>);

        impl $name {
            /// Validates and wraps a symbolic id: non-empty, no whitespace.
            pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
                let value = value.into();
                if value.is_empty() || value.chars().any(char::is_whitespace) {
                    return Err(CoreError::InvalidArgument(format!(
                        concat!($label, " must be a non-empty symbol with no whitespace, got {:?}"),
                        value
                    )));
                }
                Ok(Self(Arc::from(value)))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

symbolic_id!(SinkId, "sink id");
symbolic_id!(ChannelId, "channel id");
