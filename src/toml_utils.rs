//! Helper functions for [`toml_span`].

use std::borrow::Cow;

use toml_span::DeserError;

use crate::prelude::*;

/// Deserialize a TOML string into a value of the specified type.
pub fn from_toml_str<'de, T>(toml_str: &'de str) -> Result<T, DeserError>
where
    T: toml_span::Deserialize<'de>,
{
    let mut value = toml_span::de::parse(toml_str)?;
    T::deserialize(&mut value)
}

/// Create a custom [`DeserError`] with a span.
pub fn custom_deser_error(
    span: toml_span::Span,
    msg: impl Into<Cow<'static, str>>,
) -> DeserError {
    let err_kind = toml_span::ErrorKind::Custom(msg.into());
    let err = toml_span::Error::from((err_kind, span));
    DeserError::from(err)
}

/// Flatten a [`DeserError`] into an [`anyhow::Error`], keeping every message.
pub fn deser_error_to_anyhow(err: DeserError, source_name: &str) -> anyhow::Error {
    let messages = err
        .errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n");
    anyhow!("Failed to parse TOML from {source_name}:\n{messages}")
}
