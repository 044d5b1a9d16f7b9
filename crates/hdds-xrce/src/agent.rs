// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// XRCE agent engine: ties Root + Processor to a transport through a small
// set of background workers.
//
// Transport I/O runs on its own OS thread, since `XrceTransport` impls are
// either non-blocking-poll (UDP/TCP) or flat-out blocking (serial). The
// heartbeat, liveliness and READ_DATA workers are plain tokio tasks driven
// by timers, all sharing the same `Root`/`Processor` behind `Arc`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};

use crate::config::XrceAgentConfig;
use crate::error::XrceError;
use crate::message::{self, InputMessage, MessageHeader, OutputMessage, MESSAGE_HEADER_SIZE, SUBMESSAGE_HEADER_SIZE};
use crate::middleware::Middleware;
use crate::processor::{Outbound, Processor};
use crate::proxy_client::ProxyClient;
use crate::root::Root;
use crate::submessage::{FragmentPayload, Submessage};
use crate::transport::{TransportAddr, XrceTransport};
use crate::wire::{ClientKey, SessionId, StreamId, StreamKindTag};

/// Cloneable stop switch for a running [`XrceAgent`]: any clone can call
/// `stop`, every worker task polls it on its own schedule.
#[derive(Clone)]
pub struct AgentHandle {
    shutdown: Arc<AtomicBool>,
}

impl AgentHandle {
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Bridges XRCE clients on one transport to DDS via a [`Middleware`].
pub struct XrceAgent {
    config: XrceAgentConfig,
    root: Arc<Root>,
    processor: Arc<Processor>,
    /// Last transport address a client key was heard from; tick-driven
    /// output (heartbeats, liveliness probes, READ_DATA samples) has no
    /// inbound message to piggyback a reply address on, so it looks here.
    addrs: Mutex<HashMap<ClientKey, TransportAddr>>,
    shutdown: Arc<AtomicBool>,
}

impl XrceAgent {
    pub fn new(config: XrceAgentConfig, middleware: Arc<dyn Middleware>) -> Result<Self, XrceError> {
        config.validate()?;
        let root = Arc::new(Root::new(config.max_clients, config.retention_window));
        let processor = Arc::new(Processor::new(middleware));
        Ok(Self {
            config,
            root,
            processor,
            addrs: Mutex::new(HashMap::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn handle(&self) -> AgentHandle {
        AgentHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    pub fn config(&self) -> &XrceAgentConfig {
        &self.config
    }

    pub fn session_count(&self) -> usize {
        self.root.len()
    }

    #[cfg(test)]
    pub(crate) fn root_for_test(&self) -> &Root {
        &self.root
    }

    #[cfg(test)]
    pub(crate) fn send_fresh_for_test(
        &self,
        client: &ProxyClient,
        session_id: SessionId,
        stream_id: StreamId,
        sub: &Submessage,
        addr: &TransportAddr,
    ) -> Vec<(TransportAddr, Vec<u8>)> {
        self.send_fresh(client, session_id, stream_id, sub, addr)
    }

    /// Process one inbound datagram, returning every `(address, bytes)`
    /// reply it produced. Pure and synchronous; [`Self::run`] is the async
    /// driver that feeds this from the transport thread.
    pub fn process_incoming(&self, from: &TransportAddr, data: &[u8]) -> Vec<(TransportAddr, Vec<u8>)> {
        let header = match MessageHeader::parse(data) {
            Ok(h) => h,
            Err(e) => {
                warn!("failed to parse message header from {from:?}: {e}");
                return Vec::new();
            }
        };
        let mut input = match InputMessage::parse(data) {
            Ok(i) => i,
            Err(e) => {
                warn!("failed to parse message from {from:?}: {e}");
                return Vec::new();
            }
        };

        if let Some(client) = self.root.get_client(header.client_key) {
            client.touch();
        }
        self.addrs
            .lock()
            .unwrap()
            .insert(header.client_key, from.clone());

        let outbound = self.processor.process_message(&self.root, &header, &mut input);
        self.frame_replies(header.client_key, header.session_id, outbound, from)
    }

    fn frame_replies(
        &self,
        key: ClientKey,
        session_id: SessionId,
        outbound: Vec<Outbound>,
        addr: &TransportAddr,
    ) -> Vec<(TransportAddr, Vec<u8>)> {
        let Some(client) = self.root.get_client(key) else {
            return Vec::new();
        };
        let mut replies = Vec::new();
        for item in outbound {
            match item {
                Outbound::Fresh(stream_id, sub) => {
                    replies.extend(self.send_fresh(&client, session_id, stream_id, &sub, addr));
                }
                Outbound::Retransmit(stream_id, seq, bytes) => {
                    let header = MessageHeader {
                        client_key: key,
                        session_id,
                        stream_id,
                        sequence_nr: seq,
                    };
                    let mut out = OutputMessage::new(header, self.config.output_mtu);
                    if out.append_raw(&bytes) {
                        replies.push((addr.clone(), out.into_bytes()));
                    } else {
                        warn!("retransmit of seq {seq} on stream {stream_id:?} exceeds output_mtu");
                    }
                }
            }
        }
        replies
    }

    /// Send one fresh submessage as its own message, assigning it the next
    /// sequence number on `stream_id`. Splits into FRAGMENTs when the framed
    /// submessage would not fit in `output_mtu` on a reliable stream;
    /// non-reliable streams never fragment and are sent as-is even if
    /// oversized.
    fn send_fresh(
        &self,
        client: &ProxyClient,
        session_id: SessionId,
        stream_id: StreamId,
        sub: &Submessage,
        addr: &TransportAddr,
    ) -> Vec<(TransportAddr, Vec<u8>)> {
        let Some(frame) = message::frame_submessage(sub, true) else {
            warn!("submessage payload too large to frame at all, dropping");
            return Vec::new();
        };
        let budget = self.config.output_mtu.saturating_sub(MESSAGE_HEADER_SIZE);
        let stream_lock = client.stream(stream_id);

        if frame.len() <= budget || stream_id.kind() != StreamKindTag::Reliable {
            let seq = stream_lock.lock().unwrap().send(frame.clone());
            let header = MessageHeader {
                client_key: client.client_key,
                session_id,
                stream_id,
                sequence_nr: seq,
            };
            let mut out = OutputMessage::new(header, self.config.output_mtu);
            return if out.append_raw(&frame) {
                vec![(addr.clone(), out.into_bytes())]
            } else {
                warn!("submessage exceeds output_mtu even alone, dropping");
                Vec::new()
            };
        }

        let overhead = SUBMESSAGE_HEADER_SIZE + 8;
        let chunk_size = budget.saturating_sub(overhead).max(1);
        let chunks: Vec<&[u8]> = frame.chunks(chunk_size).collect();
        let last_index = chunks.len().saturating_sub(1);
        let mut replies = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.into_iter().enumerate() {
            let fragment = Submessage::Fragment(FragmentPayload {
                fragment_nr: i as u16,
                last: i == last_index,
                data: chunk.to_vec(),
            });
            let Some(fragment_frame) = message::frame_submessage(&fragment, true) else {
                warn!("fragment {i} too large to frame, dropping it");
                continue;
            };
            let seq = stream_lock.lock().unwrap().send(fragment_frame.clone());
            let header = MessageHeader {
                client_key: client.client_key,
                session_id,
                stream_id,
                sequence_nr: seq,
            };
            let mut out = OutputMessage::new(header, self.config.output_mtu);
            if out.append_raw(&fragment_frame) {
                replies.push((addr.clone(), out.into_bytes()));
            } else {
                warn!("fragment {i} still exceeds output_mtu after splitting, dropping");
            }
        }
        replies
    }

    /// Route a batch of per-client tick output (heartbeats, liveliness
    /// probes, READ_DATA samples) to that client's last known address.
    fn route_tick_output(&self, batches: Vec<(ClientKey, Vec<Outbound>)>) -> Vec<(TransportAddr, Vec<u8>)> {
        let mut replies = Vec::new();
        for (key, outbound) in batches {
            let addr = self.addrs.lock().unwrap().get(&key).cloned();
            let Some(addr) = addr else {
                debug!("no known address for client {key:?}, dropping tick output");
                continue;
            };
            let Some(client) = self.root.get_client(key) else {
                continue;
            };
            replies.extend(self.frame_replies(key, client.session_id, outbound, &addr));
        }
        replies
    }

    /// Run the agent against `transport` until [`AgentHandle::stop`] is
    /// called on a handle obtained via [`Self::handle`].
    pub async fn run(self: Arc<Self>, mut transport: Box<dyn XrceTransport>) {
        let (inbound_tx, inbound_rx) = std::sync::mpsc::channel::<(TransportAddr, Vec<u8>)>();
        let (outbound_tx, outbound_rx) = std::sync::mpsc::channel::<(TransportAddr, Vec<u8>)>();

        let reader_shutdown = self.shutdown.clone();
        let transport_thread = std::thread::spawn(move || {
            let mut buf = vec![0u8; 65536];
            loop {
                if reader_shutdown.load(Ordering::SeqCst) {
                    break;
                }
                match transport.recv(&mut buf) {
                    Ok((n, from)) => {
                        if inbound_tx.send((from, buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(_) => std::thread::sleep(Duration::from_millis(5)),
                }
                while let Ok((addr, data)) = outbound_rx.try_recv() {
                    if let Err(e) = transport.send(&addr, &data) {
                        warn!("failed to send reply to {addr:?}: {e}");
                    }
                }
            }
        });

        let dispatch_agent = self.clone();
        let dispatch_tx = outbound_tx.clone();
        let dispatch_shutdown = self.shutdown.clone();
        let dispatch_task = tokio::task::spawn_blocking(move || {
            while !dispatch_shutdown.load(Ordering::SeqCst) {
                match inbound_rx.recv_timeout(Duration::from_millis(50)) {
                    Ok((from, data)) => {
                        for reply in dispatch_agent.process_incoming(&from, &data) {
                            let _ = dispatch_tx.send(reply);
                        }
                    }
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        let heartbeat_agent = self.clone();
        let heartbeat_tx = outbound_tx.clone();
        let heartbeat_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat_agent.config.heartbeat_period());
            while !heartbeat_agent.shutdown.load(Ordering::SeqCst) {
                interval.tick().await;
                let batches = heartbeat_agent.processor.tick_heartbeats(&heartbeat_agent.root);
                for reply in heartbeat_agent.route_tick_output(batches) {
                    let _ = heartbeat_tx.send(reply);
                }
            }
        });

        let liveliness_agent = self.clone();
        let liveliness_tx = outbound_tx.clone();
        let liveliness_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(liveliness_agent.config.liveliness_probe_interval());
            while !liveliness_agent.shutdown.load(Ordering::SeqCst) {
                interval.tick().await;
                let batches = liveliness_agent.processor.scan_liveliness(
                    &liveliness_agent.root,
                    liveliness_agent.config.liveliness_dead_threshold(),
                    liveliness_agent.config.liveliness_probe_interval(),
                    liveliness_agent.config.liveliness_remove_attempts,
                );
                for reply in liveliness_agent.route_tick_output(batches) {
                    let _ = liveliness_tx.send(reply);
                }
            }
        });

        let readjob_agent = self.clone();
        let readjob_tx = outbound_tx.clone();
        let readjob_task = tokio::spawn(async move {
            while !readjob_agent.shutdown.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let batches = readjob_agent.processor.poll_read_jobs();
                for reply in readjob_agent.route_tick_output(batches) {
                    let _ = readjob_tx.send(reply);
                }
            }
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let _ = dispatch_task.await;
        let _ = heartbeat_task.await;
        let _ = liveliness_task.await;
        let _ = readjob_task.await;
        let _ = transport_thread.join();
    }
}
