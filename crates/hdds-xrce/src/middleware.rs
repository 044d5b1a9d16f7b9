// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// The opaque DDS middleware interface. Everything past this boundary is a
// different subsystem; the engine only ever sees these eight calls.

use crate::error::XrceError;
use crate::submessage::DataFormat;
use crate::wire::{ObjectId, ObjectKind};

/// Opaque handle into the middleware's own bookkeeping for one entity.
/// The engine never interprets this value, only stores and returns it.
pub type Handle = u64;

/// Parameters a read job passes through to the middleware on each poll.
#[derive(Debug, Clone, Copy)]
pub struct ReadSpec {
    pub data_format: DataFormat,
}

/// Per-entity-kind DDS operations, implemented by whatever middleware is
/// linked in. All calls are synchronous from the engine's perspective; a
/// middleware that is internally asynchronous must still deliver `on_sample`
/// callbacks on a thread-safe path back into the engine.
pub trait Middleware: Send + Sync {
    fn create_by_ref(
        &self,
        kind: ObjectKind,
        id: ObjectId,
        parent_handles: &[Handle],
        ref_string: &str,
    ) -> Result<Handle, XrceError>;

    fn create_by_xml(
        &self,
        kind: ObjectKind,
        id: ObjectId,
        parent_handles: &[Handle],
        xml: &str,
    ) -> Result<Handle, XrceError>;

    fn create_by_binary(
        &self,
        kind: ObjectKind,
        id: ObjectId,
        parent_handles: &[Handle],
        data: &[u8],
    ) -> Result<Handle, XrceError>;

    fn delete(&self, handle: Handle) -> Result<(), XrceError>;

    fn match_ref(&self, handle: Handle, ref_string: &str) -> bool;

    fn match_xml(&self, handle: Handle, xml: &str) -> bool;

    fn write(&self, handle: Handle, data: &[u8]) -> Result<(), XrceError>;

    /// Pull at most one batch of samples, invoking `on_sample` for each.
    /// Returns the number of samples delivered.
    fn read(
        &self,
        handle: Handle,
        spec: &ReadSpec,
        on_sample: &mut dyn FnMut(&[u8]),
    ) -> Result<usize, XrceError>;
}

/// A middleware that does nothing: creation always succeeds with a
/// monotonically increasing handle, matches never succeed, reads never
/// produce samples. Useful for tests and for running the protocol engine
/// standalone.
#[derive(Default)]
pub struct NullMiddleware {
    next_handle: std::sync::atomic::AtomicU64,
}

impl NullMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&self) -> Handle {
        self.next_handle
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1
    }
}

impl Middleware for NullMiddleware {
    fn create_by_ref(
        &self,
        _kind: ObjectKind,
        _id: ObjectId,
        _parent_handles: &[Handle],
        _ref_string: &str,
    ) -> Result<Handle, XrceError> {
        Ok(self.alloc())
    }

    fn create_by_xml(
        &self,
        _kind: ObjectKind,
        _id: ObjectId,
        _parent_handles: &[Handle],
        _xml: &str,
    ) -> Result<Handle, XrceError> {
        Ok(self.alloc())
    }

    fn create_by_binary(
        &self,
        _kind: ObjectKind,
        _id: ObjectId,
        _parent_handles: &[Handle],
        _data: &[u8],
    ) -> Result<Handle, XrceError> {
        Ok(self.alloc())
    }

    fn delete(&self, _handle: Handle) -> Result<(), XrceError> {
        Ok(())
    }

    fn match_ref(&self, _handle: Handle, _ref_string: &str) -> bool {
        false
    }

    fn match_xml(&self, _handle: Handle, _xml: &str) -> bool {
        false
    }

    fn write(&self, _handle: Handle, _data: &[u8]) -> Result<(), XrceError> {
        Ok(())
    }

    fn read(
        &self,
        _handle: Handle,
        _spec: &ReadSpec,
        _on_sample: &mut dyn FnMut(&[u8]),
    ) -> Result<usize, XrceError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_middleware_allocates_distinct_handles() {
        let mw = NullMiddleware::new();
        let a = mw
            .create_by_ref(ObjectKind::Participant, ObjectId::new(1, ObjectKind::Participant), &[], "x")
            .unwrap();
        let b = mw
            .create_by_ref(ObjectKind::Participant, ObjectId::new(2, ObjectKind::Participant), &[], "y")
            .unwrap();
        assert_ne!(a, b);
    }
}
