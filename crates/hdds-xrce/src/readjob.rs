// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Cooperative READ_DATA subscription jobs.
//
// A job never blocks the processor: `ready_to_poll`/`is_done` are checked
// at each suspension point and the job simply isn't polled again until its
// pacing budget refills, waiting until the next tick without blocking the
// processor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::middleware::{Handle, Middleware, ReadSpec};
use crate::submessage::{DataFormat, DeliveryControl, ReadDataPayload};
use crate::wire::{ObjectId, RequestId, StreamId};

/// Repackages a batch of raw middleware samples per the requested
/// [`DataFormat`] into the payload(s) a DATA submessage should carry.
pub fn format_batch(format: DataFormat, samples: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    match format {
        DataFormat::Data => samples,
        DataFormat::DataWithInfo => samples
            .into_iter()
            .map(|s| {
                let mut out = Vec::with_capacity(8 + s.len());
                out.extend_from_slice(&(s.len() as u64).to_le_bytes());
                out.extend_from_slice(&s);
                out
            })
            .collect(),
        DataFormat::DataSeq | DataFormat::PackedSamples => {
            if samples.is_empty() {
                return Vec::new();
            }
            let mut out = Vec::new();
            out.extend_from_slice(&(samples.len() as u32).to_le_bytes());
            for s in &samples {
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s);
            }
            vec![out]
        }
    }
}

/// A running READ_DATA subscription against one DataReader/Requester/Replier.
pub struct ReadJob {
    pub request_id: RequestId,
    pub reader_id: ObjectId,
    pub preferred_stream_id: StreamId,
    pub handle: Handle,
    data_format: DataFormat,
    delivery: DeliveryControl,
    samples_delivered: u32,
    bytes_delivered: u64,
    started: Instant,
    last_sample_at: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl ReadJob {
    pub fn new(req: &ReadDataPayload, handle: Handle) -> Self {
        Self {
            request_id: req.request_id,
            reader_id: req.reader_id,
            preferred_stream_id: req.preferred_stream_id,
            handle,
            data_format: req.data_format,
            delivery: req.delivery_control,
            samples_delivered: 0,
            bytes_delivered: 0,
            started: Instant::now(),
            last_sample_at: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A cloneable flag a session's destruction can flip to cancel this job
    /// without touching the job itself.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// True once the job's delivery control bound is satisfied or it was
    /// cancelled; the caller should drop the job without further polling.
    pub fn is_done(&self) -> bool {
        if self.is_cancelled() {
            return true;
        }
        if self.delivery.max_samples != 0 && self.samples_delivered >= self.delivery.max_samples as u32
        {
            return true;
        }
        if self.delivery.max_elapsed_time_ms != 0
            && self.started.elapsed().as_millis() as u32 >= self.delivery.max_elapsed_time_ms
        {
            return true;
        }
        false
    }

    /// Whether the pacing budget (`min_pace_period_ms` / `max_bytes_per_sec`)
    /// allows another poll right now.
    pub fn ready_to_poll(&self) -> bool {
        if let Some(last) = self.last_sample_at {
            if self.delivery.min_pace_period_ms != 0
                && (last.elapsed().as_millis() as u32) < self.delivery.min_pace_period_ms
            {
                return false;
            }
        }
        if self.delivery.max_bytes_per_sec != 0 {
            let elapsed_secs = self.started.elapsed().as_secs_f64().max(1e-6);
            let rate = self.bytes_delivered as f64 / elapsed_secs;
            if rate >= self.delivery.max_bytes_per_sec as f64 {
                return false;
            }
        }
        true
    }

    /// Pull one batch from the middleware and return formatted DATA
    /// submessage payloads, bounded by whatever samples remain under
    /// `max_samples`.
    pub fn poll(&mut self, mw: &dyn Middleware) -> Vec<Vec<u8>> {
        if self.is_done() || !self.ready_to_poll() {
            return Vec::new();
        }
        let mut samples = Vec::new();
        let spec = ReadSpec {
            data_format: self.data_format,
        };
        let _ = mw.read(self.handle, &spec, &mut |sample| {
            let remaining = self.delivery.max_samples as usize;
            if self.delivery.max_samples == 0 || samples.len() < remaining {
                samples.push(sample.to_vec());
            }
        });
        if samples.is_empty() {
            return Vec::new();
        }
        self.samples_delivered += samples.len() as u32;
        self.bytes_delivered += samples.iter().map(|s| s.len() as u64).sum::<u64>();
        self.last_sample_at = Some(Instant::now());
        format_batch(self.data_format, samples)
    }
}
