// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bounded-concurrency dispatch of generation jobs to an external worker.
//!
//! The gate owns a fixed pool of worker slots. A `generate` call suspends
//! until a slot is free, spawns the worker process with the flattened
//! parameter argv, and holds the slot until the process exits or the
//! execution timeout kills it. System-wide, at most `max_concurrent_jobs`
//! worker processes run at once; excess callers wait with tokio's default
//! semaphore fairness.
//!
//! Only stdout is captured; the worker's stderr flows to the parent's.
//! A non-zero exit or unparseable stdout is a failed generation with no
//! retry and no partial results.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::config::DispatchConfig;
use crate::params::{self, GenerationParam};
use crate::record::ImageData;

/// Errors from worker dispatch.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DispatchError {
    /// Spawning or waiting on the worker process failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Worker exited with a non-zero status.
    #[error("Worker exit code {exit_code}")]
    ExitCode {
        /// Exit code from the worker process.
        exit_code: i32,
    },

    /// Worker stdout did not parse as the expected result array.
    #[error("Malformed worker output: {0}")]
    MalformedOutput(#[from] serde_json::Error),

    /// Worker ran past the execution timeout and was killed.
    #[error("Worker execution timeout")]
    Timeout,

    /// The slot pool was closed.
    #[error("Dispatch gate closed")]
    Closed,
}

/// Bounded-concurrency gate in front of the worker executable.
pub struct DispatchGate {
    config: DispatchConfig,
    slots: Arc<Semaphore>,
}

impl DispatchGate {
    /// Create a dispatch gate with `config.max_concurrent_jobs` slots.
    pub fn new(config: DispatchConfig) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Self { config, slots }
    }

    /// Number of worker slots currently free.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Run one generation through the worker.
    ///
    /// Suspends until a worker slot is free, then spawns
    /// `<worker_program> <script_path> <flattened params>` and parses its
    /// stdout as a JSON array of images. The slot is released on every exit
    /// path.
    pub async fn generate(
        &self,
        generation_params: &[GenerationParam],
    ) -> Result<Vec<ImageData>, DispatchError> {
        let _permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::Closed)?;

        self.run_worker(generation_params).await
    }

    async fn run_worker(
        &self,
        generation_params: &[GenerationParam],
    ) -> Result<Vec<ImageData>, DispatchError> {
        let args = params::to_worker_args(generation_params);

        debug!(
            program = %self.config.worker_program,
            script = %self.config.script_path.display(),
            args = args.len(),
            "Launching generation worker"
        );

        let mut child = Command::new(&self.config.worker_program)
            .arg(&self.config.script_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Drain stdout concurrently so a large result cannot fill the pipe
        // and stall the worker before exit.
        let stdout = child.stdout.take();
        let reader = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut out) = stdout {
                let _ = out.read_to_end(&mut buf).await;
            }
            buf
        });

        let status = match self.wait_with_timeout(&mut child).await {
            Ok(status) => status,
            Err(e) => {
                reader.abort();
                return Err(e);
            }
        };

        if !status.success() {
            let exit_code = status.code().unwrap_or(-1);
            error!(exit_code = exit_code, "Generation worker failed");
            return Err(DispatchError::ExitCode { exit_code });
        }

        let output = reader.await.unwrap_or_default();
        match serde_json::from_slice::<Vec<ImageData>>(&output) {
            Ok(images) => {
                debug!(images = images.len(), "Generation worker completed");
                Ok(images)
            }
            Err(e) => {
                error!(error = %e, "Failed to parse generation worker output");
                Err(DispatchError::MalformedOutput(e))
            }
        }
    }

    /// Wait for the worker to exit, killing it when the execution timeout
    /// expires so a hung worker cannot hold its slot forever.
    async fn wait_with_timeout(
        &self,
        child: &mut tokio::process::Child,
    ) -> Result<std::process::ExitStatus, DispatchError> {
        let poll_interval = Duration::from_millis(50);
        let start = Instant::now();

        loop {
            if start.elapsed() > self.config.worker_timeout {
                warn!(
                    timeout_secs = self.config.worker_timeout.as_secs_f64(),
                    "Generation worker timed out, killing process"
                );
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(DispatchError::Timeout);
            }

            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => tokio::time::sleep(poll_interval).await,
                Err(e) => {
                    error!(error = %e, "Error waiting for generation worker");
                    return Err(e.into());
                }
            }
        }
    }
}
