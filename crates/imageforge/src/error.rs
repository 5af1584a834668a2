// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for imageforge.

use thiserror::Error;

/// Service errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Archive store operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] crate::archive::StorageError),

    /// Worker dispatch failed.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] crate::dispatch::DispatchError),
}

/// Result type using imageforge Error.
pub type Result<T> = std::result::Result<T, Error>;
