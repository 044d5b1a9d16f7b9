// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// End-to-end scenarios driving the agent engine through full messages,
// exercising session establishment, object CRUD, reliable delivery with
// loss, fragmentation, cascading delete and out-of-session requests.

use std::sync::Arc;

use crate::agent::XrceAgent;
use crate::config::XrceAgentConfig;
use crate::message::{InputMessage, MessageHeader, OutputMessage, MESSAGE_HEADER_SIZE};
use crate::middleware::NullMiddleware;
use crate::streams::ReliableInput;
use crate::submessage::{
    CreateClientPayload, CreatePayload, CreationMode, DeletePayload, ObjectRepresentation,
    StatusValue, Submessage, WriteDataPayload, XRCE_COOKIE, XRCE_VERSION,
};
use crate::transport::TransportAddr;
use crate::wire::{ClientKey, ObjectId, ObjectKind, RequestId, SessionId, StreamId};

fn agent() -> XrceAgent {
    XrceAgent::new(XrceAgentConfig::default(), Arc::new(NullMiddleware::new())).unwrap()
}

fn addr() -> TransportAddr {
    TransportAddr::Udp("127.0.0.1:9999".parse().unwrap())
}

fn message(
    key: [u8; 4],
    session_id: SessionId,
    stream_id: StreamId,
    sub: &Submessage,
) -> Vec<u8> {
    let header = MessageHeader {
        client_key: ClientKey(key),
        session_id,
        stream_id,
        sequence_nr: 0,
    };
    let mut out = OutputMessage::new(header, 2048);
    assert!(out.append(sub, true));
    out.into_bytes()
}

fn decode_reply(bytes: &[u8]) -> Submessage {
    let mut input = InputMessage::parse(bytes).unwrap();
    assert!(input.prepare_next_submessage().unwrap());
    input.current_submessage().unwrap()
}

fn reply_header(bytes: &[u8]) -> MessageHeader {
    MessageHeader::parse(bytes).unwrap()
}

// CREATE_CLIENT round trip establishes a session and returns OK.
#[test]
fn create_client_round_trip() {
    let agent = agent();
    let key = [1, 1, 1, 1];
    let bytes = message(
        key,
        SessionId::NONE_WITH_KEY,
        StreamId::BUILTIN_BEST_EFFORT,
        &Submessage::CreateClient(CreateClientPayload {
            request_id: RequestId(1),
            client_key: ClientKey(key),
            cookie: XRCE_COOKIE,
            version: XRCE_VERSION,
            requested_session_id: SessionId(0x81),
            properties: vec![],
        }),
    );
    let replies = agent.process_incoming(&addr(), &bytes);
    assert_eq!(replies.len(), 1);
    match decode_reply(&replies[0].1) {
        Submessage::StatusAgent(s) => assert_eq!(s.result, StatusValue::Ok),
        other => panic!("expected StatusAgent, got {other:?}"),
    }
    assert_eq!(agent.session_count(), 1);
}

// CREATE's {reuse,replace} table driven end-to-end through the wire.
#[test]
fn create_mode_table_end_to_end() {
    let agent = agent();
    let key = [2, 2, 2, 2];
    establish(&agent, key);

    let participant = ObjectId::new(1, ObjectKind::Participant);
    let create = |mode: CreationMode, reference: &str, req: u16| {
        message(
            key,
            SessionId(0x81),
            StreamId::BUILTIN_RELIABLE,
            &Submessage::Create(CreatePayload {
                request_id: RequestId(req),
                object_id: participant,
                parent_ids: vec![],
                creation_mode: mode,
                representation: ObjectRepresentation::ByRef(reference.to_string()),
            }),
        )
    };

    let r1 = agent.process_incoming(&addr(), &create(CreationMode::default(), "p", 1));
    match decode_reply(&r1[0].1) {
        Submessage::Status(s) => assert_eq!(s.result, StatusValue::Ok),
        other => panic!("unexpected {other:?}"),
    }

    // (0,0) again: AlreadyExists
    let r2 = agent.process_incoming(&addr(), &create(CreationMode::default(), "p", 2));
    match decode_reply(&r2[0].1) {
        Submessage::Status(s) => assert_eq!(s.result, StatusValue::AlreadyExistsError),
        other => panic!("unexpected {other:?}"),
    }

    // (1,0) matching: OkMatched
    let reuse = CreationMode {
        reuse: true,
        replace: false,
    };
    let r3 = agent.process_incoming(&addr(), &create(reuse, "p", 3));
    match decode_reply(&r3[0].1) {
        Submessage::Status(s) => assert_eq!(s.result, StatusValue::OkMatched),
        other => panic!("unexpected {other:?}"),
    }
}

// A lost reliable submessage is recovered via ACKNACK-triggered retransmit.
// Drives the real receive path on both ends: the agent sends ten messages,
// a `ReliableInput` standing in for the client's receiver ingests everything
// but #3 and #7 and produces its own ACKNACK via `make_acknack`, and the
// agent is expected to retransmit exactly the two it names.
#[test]
fn reliable_stream_recovers_from_nacked_loss() {
    let agent = agent();
    let key = [3, 3, 3, 3];
    let client_arc = establish(&agent, key);

    let mut sent = Vec::new();
    for i in 0..10u8 {
        let sub = Submessage::WriteData(WriteDataPayload {
            writer_id: ObjectId::new(1, ObjectKind::DataWriter),
            data: vec![i],
        });
        let replies = agent.send_fresh_for_test(
            client_arc.as_ref(),
            SessionId(0x81),
            StreamId::BUILTIN_RELIABLE,
            &sub,
            &addr(),
        );
        assert_eq!(replies.len(), 1);
        sent.push(replies[0].1.clone());
    }

    let mut receiver = ReliableInput::default();
    for bytes in &sent {
        let seq = reply_header(bytes).sequence_nr;
        if seq == 3 || seq == 7 {
            continue; // dropped in transit
        }
        receiver.accept(seq, bytes[MESSAGE_HEADER_SIZE..].to_vec());
    }
    let ack = receiver.make_acknack();
    assert_eq!(ack.first_unacked, 3);

    let ack_bytes = message(
        key,
        SessionId(0x81),
        StreamId::BUILTIN_RELIABLE,
        &Submessage::Acknack(ack),
    );
    let replies = agent.process_incoming(&addr(), &ack_bytes);
    let mut seqs: Vec<u16> = replies.iter().map(|(_, b)| reply_header(b).sequence_nr).collect();
    seqs.sort_unstable();
    assert_eq!(seqs, vec![3, 7]);
}

// A 1800-byte WRITE_DATA over a 512-byte MTU is split into FRAGMENTs, the
// last one flagged.
#[test]
fn oversized_write_data_is_fragmented_over_mtu() {
    let mut config = XrceAgentConfig::default();
    config.output_mtu = 512;
    let agent = XrceAgent::new(config, Arc::new(NullMiddleware::new())).unwrap();
    let key = [4, 4, 4, 4];
    let client_arc = establish(&agent, key);

    let oversized = Submessage::WriteData(crate::submessage::WriteDataPayload {
        writer_id: ObjectId::new(1, ObjectKind::DataWriter),
        data: vec![0xCD; 1800],
    });
    let replies = agent.send_fresh_for_test(client_arc.as_ref(), SessionId(0x81), StreamId::BUILTIN_RELIABLE, &oversized, &addr());
    assert!(replies.len() >= 4, "expected at least 4 fragments, got {}", replies.len());
    for (_, bytes) in &replies {
        assert!(bytes.len() <= 512);
    }
    let last = decode_reply(&replies.last().unwrap().1);
    match last {
        Submessage::Fragment(f) => assert!(f.last),
        other => panic!("expected Fragment, got {other:?}"),
    }
}

// Deleting a participant cascades through topics/publishers/writers.
#[test]
fn cascade_delete_through_wire() {
    let agent = agent();
    let key = [5, 5, 5, 5];
    establish(&agent, key);

    let participant = ObjectId::new(1, ObjectKind::Participant);
    let topic = ObjectId::new(2, ObjectKind::Topic);
    let publisher = ObjectId::new(3, ObjectKind::Publisher);
    let writer = ObjectId::new(4, ObjectKind::DataWriter);

    let creates = [
        (participant, vec![], ObjectKind::Participant),
        (topic, vec![participant], ObjectKind::Topic),
        (publisher, vec![participant], ObjectKind::Publisher),
        (writer, vec![publisher, topic], ObjectKind::DataWriter),
    ];
    for (i, (id, parents, _kind)) in creates.iter().enumerate() {
        let bytes = message(
            key,
            SessionId(0x81),
            StreamId::BUILTIN_RELIABLE,
            &Submessage::Create(CreatePayload {
                request_id: RequestId(i as u16 + 1),
                object_id: *id,
                parent_ids: parents.clone(),
                creation_mode: CreationMode::default(),
                representation: ObjectRepresentation::ByRef(format!("obj{i}")),
            }),
        );
        let r = agent.process_incoming(&addr(), &bytes);
        match decode_reply(&r[0].1) {
            Submessage::Status(s) => assert_eq!(s.result, StatusValue::Ok),
            other => panic!("unexpected {other:?}"),
        }
    }

    let del = message(
        key,
        SessionId(0x81),
        StreamId::BUILTIN_RELIABLE,
        &Submessage::Delete(DeletePayload {
            request_id: RequestId(99),
            object_id: participant,
        }),
    );
    let r = agent.process_incoming(&addr(), &del);
    match decode_reply(&r[0].1) {
        Submessage::Status(s) => assert_eq!(s.result, StatusValue::Ok),
        other => panic!("unexpected {other:?}"),
    }

    let client = agent_client(&agent, key);
    assert!(client.graph().get(topic).is_none());
    assert!(client.graph().get(publisher).is_none());
    assert!(client.graph().get(writer).is_none());
}

// GET_INFO from a client with no established session still gets a reply.
#[test]
fn get_info_out_of_session() {
    let agent = agent();
    let bytes = message(
        [6, 6, 6, 6],
        SessionId::NONE_WITH_KEY,
        StreamId::BUILTIN_BEST_EFFORT,
        &Submessage::GetInfo(crate::submessage::GetInfoPayload {
            request_id: RequestId(1),
        }),
    );
    let replies = agent.process_incoming(&addr(), &bytes);
    assert_eq!(replies.len(), 1);
    match decode_reply(&replies[0].1) {
        Submessage::Info(i) => assert_eq!(i.related_request, RequestId(1)),
        other => panic!("expected Info, got {other:?}"),
    }
    assert_eq!(agent.session_count(), 0);
}

// Malformed frames never panic the dispatch path.
#[test]
fn malformed_frame_is_dropped() {
    let agent = agent();
    assert!(agent.process_incoming(&addr(), &[]).is_empty());
    assert!(agent.process_incoming(&addr(), &[1, 2]).is_empty());
}

fn establish(agent: &XrceAgent, key: [u8; 4]) -> Arc<crate::proxy_client::ProxyClient> {
    let bytes = message(
        key,
        SessionId::NONE_WITH_KEY,
        StreamId::BUILTIN_BEST_EFFORT,
        &Submessage::CreateClient(CreateClientPayload {
            request_id: RequestId(0),
            client_key: ClientKey(key),
            cookie: XRCE_COOKIE,
            version: XRCE_VERSION,
            requested_session_id: SessionId(0x81),
            properties: vec![],
        }),
    );
    agent.process_incoming(&addr(), &bytes);
    agent_client(agent, key)
}

fn agent_client(agent: &XrceAgent, key: [u8; 4]) -> Arc<crate::proxy_client::ProxyClient> {
    agent.root_for_test().get_client(ClientKey(key)).unwrap()
}
