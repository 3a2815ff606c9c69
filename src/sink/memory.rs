// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{Artifact, Sink, SinkReference};
use crate::error::SinkError;

/// An object-store style sink that keeps finished artifacts in memory.
///
/// Uploads are buffered whole and published on `finish`, the way a remote
/// store receives a single object. Cloning shares the underlying store.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<MemoryStore>>,
}

#[derive(Debug, Default)]
struct MemoryStore {
    objects: HashMap<String, Vec<u8>>,
    writes: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents of a finished object
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.lock(|store| store.objects.get(name).cloned())
    }

    /// Names of all finished objects, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names = self.lock(|store| store.objects.keys().cloned().collect::<Vec<_>>());
        names.sort();
        names
    }

    /// Number of artifacts published so far, overwrites included
    pub fn write_count(&self) -> usize {
        self.lock(|store| store.writes)
    }

    fn lock<T>(&self, f: impl FnOnce(&mut MemoryStore) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn location(&self, filename: &str) -> String {
        filename.to_string()
    }

    async fn exists(&self, filename: &str) -> Result<bool, SinkError> {
        Ok(self.lock(|store| store.objects.contains_key(filename)))
    }

    async fn create(&self, filename: &str) -> Result<Box<dyn Artifact>, SinkError> {
        Ok(Box::new(MemoryArtifact {
            sink: self.clone(),
            name: filename.to_string(),
            buffer: Vec::new(),
        }))
    }
}

struct MemoryArtifact {
    sink: MemorySink,
    name: String,
    buffer: Vec<u8>,
}

#[async_trait]
impl Artifact for MemoryArtifact {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), SinkError> {
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<SinkReference, SinkError> {
        let MemoryArtifact { sink, name, buffer } = *self;
        let size_bytes = buffer.len() as u64;
        sink.lock(|store| {
            store.objects.insert(name.clone(), buffer);
            store.writes += 1;
        });
        Ok(SinkReference {
            location: name,
            size_bytes,
        })
    }

    async fn abort(self: Box<Self>) {}
}
