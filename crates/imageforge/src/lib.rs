// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Imageforge - Generation Archive and Worker Dispatch
//!
//! Core components for a generation service that runs jobs on an external
//! worker process and keeps a bounded per-key history of the results:
//!
//! - [`dispatch::DispatchGate`] - serializes worker invocations through a
//!   fixed pool of slots, translating typed request parameters into the
//!   worker's argv and its stdout into typed image results.
//! - [`archive::ArchiveStore`] - a bounded per-key archive of
//!   [`record::Generation`] files with oldest-first eviction and contiguous
//!   re-indexing after every mutation.
//!
//! The two components are independent; the request layer calls the gate to
//! produce results and then, off the response path, appends them to the
//! archive under the requesting key. Archival may race the response, so a
//! caller seeing a success response has no guarantee the record is already
//! on disk.
//!
//! ```text
//!  request layer ──▶ DispatchGate ──▶ worker process (stdout JSON)
//!        │
//!        └─────────▶ ArchiveStore ──▶ <data_dir>/<key>/Generation_<i>
//! ```

pub mod archive;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod params;
pub mod record;

pub use archive::{ArchiveStore, StorageError};
pub use config::{ArchiveConfig, Config, ConfigError, DispatchConfig};
pub use dispatch::{DispatchError, DispatchGate};
pub use error::{Error, Result};
pub use params::GenerationParam;
pub use record::{Generation, ImageData, Metadata};
