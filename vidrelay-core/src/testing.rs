//! In-memory doubles for the resolver, source and sink traits.
//!
//! Every double exposes a cloneable probe so tests can inspect what
//! happened after the double itself has been moved into the code under
//! test.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::relay::{ByteSink, ByteSource, RelayError, SinkError, SourceOpener};
use crate::source::{Locator, Manifest, ManifestResolver, ResolutionError, VideoUrl};

/// Resolver answering every request with the same result.
pub struct StaticResolver {
    result: Result<Manifest, ResolutionError>,
    calls: Arc<AtomicUsize>,
}

impl StaticResolver {
    /// Resolver that always returns `manifest`.
    pub fn new(manifest: Manifest) -> Self {
        Self {
            result: Ok(manifest),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Resolver that always fails with `error`.
    pub fn failing(error: ResolutionError) -> Self {
        Self {
            result: Err(error),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of `resolve` calls.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait::async_trait]
impl ManifestResolver for StaticResolver {
    async fn resolve(
        &self,
        _url: &VideoUrl,
        cancel: &CancellationToken,
    ) -> Result<Manifest, ResolutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(ResolutionError::Cancelled);
        }
        self.result.clone()
    }
}

/// What happened to the sources an opener produced.
#[derive(Clone, Default)]
pub struct SourceProbe {
    reads: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
    locators: Arc<Mutex<Vec<String>>>,
}

impl SourceProbe {
    /// Number of `next_chunk` calls that produced a chunk or an error.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of sources opened.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// True once the last opened source has been dropped.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Locators that were opened, in order.
    pub fn locators(&self) -> Vec<String> {
        self.locators.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[derive(Clone, Copy)]
enum Trailer {
    End,
    FailAfter(usize),
    StallAfter(usize),
}

/// Opener serving a fixed payload in fixed-size chunks.
pub struct MemoryOpener {
    data: Bytes,
    chunk_size: usize,
    trailer: Trailer,
    open_error: Option<String>,
    probe: SourceProbe,
}

impl MemoryOpener {
    /// Serves `data` in chunks of `chunk_size` bytes.
    pub fn new(data: impl Into<Bytes>, chunk_size: usize) -> Self {
        Self {
            data: data.into(),
            chunk_size: chunk_size.max(1),
            trailer: Trailer::End,
            open_error: None,
            probe: SourceProbe::default(),
        }
    }

    /// Fails with `SourceFailed` after `chunks` chunks.
    pub fn fail_after(mut self, chunks: usize) -> Self {
        self.trailer = Trailer::FailAfter(chunks);
        self
    }

    /// Never yields again after `chunks` chunks.
    pub fn stall_after(mut self, chunks: usize) -> Self {
        self.trailer = Trailer::StallAfter(chunks);
        self
    }

    /// Probe shared with every source this opener creates.
    pub fn probe(&self) -> SourceProbe {
        self.probe.clone()
    }
}

/// Opener whose `open` always fails.
pub fn failing_opener(reason: &str) -> MemoryOpener {
    let mut opener = MemoryOpener::new(Bytes::new(), 1);
    opener.open_error = Some(reason.to_string());
    opener
}

#[async_trait::async_trait]
impl SourceOpener for MemoryOpener {
    async fn open(&self, locator: &Locator) -> Result<Box<dyn ByteSource>, RelayError> {
        if let Ok(mut locators) = self.probe.locators.lock() {
            locators.push(locator.as_str().to_string());
        }
        if let Some(reason) = &self.open_error {
            return Err(RelayError::SourceFailed(reason.clone()));
        }
        self.probe.opened.fetch_add(1, Ordering::SeqCst);
        self.probe.released.store(false, Ordering::SeqCst);
        Ok(Box::new(MemorySource {
            remaining: self.data.clone(),
            chunk_size: self.chunk_size,
            trailer: self.trailer,
            served: 0,
            probe: self.probe.clone(),
        }))
    }
}

struct MemorySource {
    remaining: Bytes,
    chunk_size: usize,
    trailer: Trailer,
    served: usize,
    probe: SourceProbe,
}

#[async_trait::async_trait]
impl ByteSource for MemorySource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, RelayError> {
        match self.trailer {
            Trailer::FailAfter(n) if self.served >= n => {
                self.probe.reads.fetch_add(1, Ordering::SeqCst);
                return Err(RelayError::SourceFailed("upstream reset".to_string()));
            }
            Trailer::StallAfter(n) if self.served >= n => {
                std::future::pending::<()>().await;
            }
            _ => {}
        }

        if self.remaining.is_empty() {
            return Ok(None);
        }

        let take = self.chunk_size.min(self.remaining.len());
        let chunk = self.remaining.split_to(take);
        self.served += 1;
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        Ok(Some(chunk))
    }

    fn content_length(&self) -> Option<u64> {
        Some(self.remaining.len() as u64)
    }
}

impl Drop for MemorySource {
    fn drop(&mut self) {
        self.probe.released.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct SinkState {
    bytes: Vec<u8>,
    content_type: Option<String>,
    writes: usize,
    max_write: usize,
    writes_before_declaration: usize,
    finished: bool,
    aborted: bool,
    released: bool,
    closed: bool,
}

/// What a [`MemorySink`] received.
#[derive(Clone, Default)]
pub struct SinkProbe {
    state: Arc<Mutex<SinkState>>,
}

impl SinkProbe {
    fn read<T>(&self, f: impl FnOnce(&SinkState) -> T) -> T {
        match self.state.lock() {
            Ok(state) => f(&state),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    /// All bytes written, in order.
    pub fn bytes(&self) -> Vec<u8> {
        self.read(|s| s.bytes.clone())
    }

    /// Declared content type.
    pub fn content_type(&self) -> Option<String> {
        self.read(|s| s.content_type.clone())
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.read(|s| s.writes)
    }

    /// Largest single write.
    pub fn max_write(&self) -> usize {
        self.read(|s| s.max_write)
    }

    /// Writes that arrived before the content type was declared.
    pub fn writes_before_declaration(&self) -> usize {
        self.read(|s| s.writes_before_declaration)
    }

    /// `finish` was called.
    pub fn finished(&self) -> bool {
        self.read(|s| s.finished)
    }

    /// `abort` was called.
    pub fn aborted(&self) -> bool {
        self.read(|s| s.aborted)
    }

    /// The sink has been dropped.
    pub fn released(&self) -> bool {
        self.read(|s| s.released)
    }
}

/// Sink collecting everything into memory.
#[derive(Default)]
pub struct MemorySink {
    probe: SinkProbe,
    close_after: Option<usize>,
}

impl MemorySink {
    /// Sink that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose consumer goes away once `limit` bytes have arrived.
    pub fn close_after_bytes(mut self, limit: usize) -> Self {
        self.close_after = Some(limit);
        self
    }

    /// Probe onto this sink's state.
    pub fn probe(&self) -> SinkProbe {
        self.probe.clone()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SinkState) -> T) -> T {
        match self.probe.state.lock() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[async_trait::async_trait]
impl ByteSink for MemorySink {
    async fn declare_content_type(&mut self, content_type: &str) -> Result<(), SinkError> {
        self.with_state(|s| s.content_type = Some(content_type.to_string()));
        Ok(())
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        let close_after = self.close_after;
        self.with_state(|s| {
            if s.closed {
                return Err(SinkError::new("consumer disconnected"));
            }
            if s.content_type.is_none() {
                s.writes_before_declaration += 1;
            }
            s.bytes.extend_from_slice(&chunk);
            s.writes += 1;
            s.max_write = s.max_write.max(chunk.len());
            if close_after.is_some_and(|limit| s.bytes.len() >= limit) {
                s.closed = true;
            }
            Ok(())
        })
    }

    async fn closed(&mut self) {
        if !self.with_state(|s| s.closed) {
            std::future::pending::<()>().await;
        }
    }

    async fn finish(&mut self) -> Result<(), SinkError> {
        self.with_state(|s| s.finished = true);
        Ok(())
    }

    async fn abort(&mut self, _reason: &str) {
        self.with_state(|s| s.aborted = true);
    }
}

impl Drop for MemorySink {
    fn drop(&mut self) {
        self.with_state(|s| s.released = true);
    }
}
