// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// ProxyClient: one client key's object graph, stream set and liveliness.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::graph::ObjectGraph;
use crate::streams::{Stream, StreamSet};
use crate::wire::{ClientKey, SessionId, StreamId};

/// Liveliness classification for a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveliness {
    Alive,
    Dead,
    ToRemove,
}

/// Classifies liveliness from elapsed time alone, so that a session with no
/// inbound traffic for `dead_threshold + remove_attempts * probe_interval`
/// is always `ToRemove` regardless of how often `tick` is called.
pub fn classify_liveliness(
    elapsed: Duration,
    dead_threshold: Duration,
    probe_interval: Duration,
    remove_attempts: u32,
) -> Liveliness {
    if elapsed < dead_threshold {
        return Liveliness::Alive;
    }
    let dead_for = elapsed - dead_threshold;
    let cycle = probe_interval.max(Duration::from_nanos(1));
    let cycles_elapsed = dead_for.as_nanos() / cycle.as_nanos();
    if cycles_elapsed >= remove_attempts as u128 {
        Liveliness::ToRemove
    } else {
        Liveliness::Dead
    }
}

/// One client's agent-side state: object graph, stream set and liveliness.
pub struct ProxyClient {
    pub client_key: ClientKey,
    pub session_id: SessionId,
    pub properties: Vec<(String, String)>,
    graph: Mutex<ObjectGraph>,
    streams: Mutex<HashMap<u8, Arc<Mutex<Stream>>>>,
    retention_window: usize,
    last_activity: Mutex<Instant>,
}

impl ProxyClient {
    pub fn new(
        client_key: ClientKey,
        session_id: SessionId,
        properties: Vec<(String, String)>,
        retention_window: usize,
    ) -> Self {
        Self {
            client_key,
            session_id,
            properties,
            graph: Mutex::new(ObjectGraph::new()),
            streams: Mutex::new(HashMap::new()),
            retention_window,
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn graph(&self) -> std::sync::MutexGuard<'_, ObjectGraph> {
        self.graph.lock().unwrap()
    }

    /// Returns this stream's own mutex, creating it on first use. Distinct
    /// streams never contend with each other: locking is serialized
    /// per-stream, not over the whole stream map.
    pub fn stream(&self, stream_id: StreamId) -> Arc<Mutex<Stream>> {
        let mut streams = self.streams.lock().unwrap();
        streams
            .entry(stream_id.0)
            .or_insert_with(|| Arc::new(Mutex::new(Stream::new(stream_id, self.retention_window))))
            .clone()
    }

    pub fn stream_ids(&self) -> Vec<u8> {
        self.streams.lock().unwrap().keys().copied().collect()
    }

    pub fn reset_all_streams(&self) {
        for s in self.streams.lock().unwrap().values() {
            s.lock().unwrap().reset();
        }
    }

    pub fn touch(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    pub fn elapsed_since_activity(&self) -> Duration {
        self.last_activity.lock().unwrap().elapsed()
    }
}
