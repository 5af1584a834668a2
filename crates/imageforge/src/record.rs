// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persisted generation records.
//!
//! A record is one generation result: metadata plus the worker's image
//! outputs. The on-disk `Meta` field is double-encoded — a JSON string that
//! itself contains JSON — for compatibility with archives written by earlier
//! deployments. The `double_encoded` serde module preserves that shape on
//! both encode and decode.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Metadata attached to one generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Generation time in epoch milliseconds.
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
    /// Style label the generation was requested with.
    #[serde(rename = "Style")]
    pub style: String,
    /// Output dimensions as `[width, height]`.
    #[serde(rename = "Size")]
    pub size: [i64; 2],
}

impl Metadata {
    /// Create metadata stamped with the current wall-clock time.
    pub fn new(style: impl Into<String>, size: [i64; 2]) -> Self {
        Self {
            timestamp: Utc::now().timestamp_millis(),
            style: style.into(),
            size,
        }
    }
}

/// One image produced by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    /// Flattened pixel values.
    #[serde(rename = "Pixels")]
    pub pixels: Vec<i64>,
    /// Safety-checker verdict for this image.
    #[serde(rename = "IsNSFW")]
    pub is_nsfw: bool,
}

/// One persisted generation result.
///
/// Immutable once written; identified only by its position in the per-key
/// archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    /// Generation metadata, stored double-encoded (see module docs).
    #[serde(rename = "Meta", with = "double_encoded")]
    pub meta: Metadata,
    /// Images produced by this generation.
    #[serde(rename = "Images")]
    pub images: Vec<ImageData>,
}

/// Serde adapter keeping `Meta` as a JSON-encoded string field rather than
/// a nested object.
mod double_encoded {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Metadata;

    pub fn serialize<S>(meta: &Metadata, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let inner = serde_json::to_string(meta).map_err(serde::ser::Error::custom)?;
        inner.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Metadata, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        serde_json::from_str(&inner).map_err(D::Error::custom)
    }
}
