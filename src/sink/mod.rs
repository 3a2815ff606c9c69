// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Destinations for downloaded episodes.
//!
//! A [`Sink`] hands out one [`Artifact`] per write. Bytes written to an
//! artifact stay invisible under their final name until [`Artifact::finish`]
//! succeeds; an artifact that is aborted or dropped leaves nothing behind.

mod local;
mod memory;

pub use local::LocalSink;
pub use memory::MemorySink;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SinkError;

/// Where a finished artifact ended up and how large it is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkReference {
    /// Sink-specific location: a filename, path or remote object id
    pub location: String,
    pub size_bytes: u64,
}

#[async_trait]
pub trait Sink: Send + Sync {
    /// Location recorded for an artifact stored as `filename`.
    ///
    /// Unique across all sinks that share one ledger.
    fn location(&self, filename: &str) -> String;

    /// Whether a finished artifact is already stored as `filename`
    async fn exists(&self, filename: &str) -> Result<bool, SinkError>;

    /// Start a new artifact that will be stored as `filename`.
    ///
    /// Starting again with the same name replaces any earlier unfinished
    /// artifact rather than appending to it.
    async fn create(&self, filename: &str) -> Result<Box<dyn Artifact>, SinkError>;
}

/// An in-progress write to a sink
#[async_trait]
pub trait Artifact: Send {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), SinkError>;

    /// Make the artifact durable and visible under its final name
    async fn finish(self: Box<Self>) -> Result<SinkReference, SinkError>;

    /// Discard everything written so far
    async fn abort(self: Box<Self>);
}
