//! Timestamp text encoding.

use chrono::{DateTime, SecondsFormat, Utc};

use capbridge_domain::time::Timestamp;

use crate::error::StorageError;

pub(crate) fn encode(value: Timestamp) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode(value: String) -> Result<Timestamp, StorageError> {
    match DateTime::parse_from_rfc3339(&value) {
        Ok(parsed) => Ok(parsed.with_timezone(&Utc)),
        Err(source) => Err(StorageError::Timestamp { value, source }),
    }
}
