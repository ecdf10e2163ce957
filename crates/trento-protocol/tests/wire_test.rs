// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Plugin frames over an in-memory pipe and broker envelopes as raw JSON.

use trento_protocol::contracts::{FactsGatheringRequested, OperatorExecutionRequested};
use trento_protocol::plugin_proto::{
    CancelRequest, FactRequest, GATHERER_CAPABILITY, GatherRequest, Handshake, MAGIC_COOKIE_KEY,
    MAGIC_COOKIE_VALUE, PROTOCOL_VERSION,
};
use trento_protocol::{
    Envelope, EventError, EventType, Frame, FrameError, MessageType, read_frame, write_frame,
};

#[tokio::test]
async fn test_frame_sequence_over_pipe() {
    let (mut agent, mut plugin) = tokio::io::duplex(64);

    let writer = tokio::spawn(async move {
        let handshake = Handshake {
            protocol_version: PROTOCOL_VERSION,
            magic_cookie_key: MAGIC_COOKIE_KEY.to_string(),
            magic_cookie_value: MAGIC_COOKIE_VALUE.to_string(),
        };
        write_frame(&mut agent, &Frame::new(MessageType::Handshake, &handshake).unwrap())
            .await
            .unwrap();

        // Larger than the pipe buffer, so the reader sees partial reads
        let request = GatherRequest {
            id: 7,
            capability: GATHERER_CAPABILITY.to_string(),
            requests: (0..20)
                .map(|i| FactRequest {
                    name: format!("fact_{}", i),
                    check_id: "check".to_string(),
                    gatherer: "corosync.conf".to_string(),
                    argument: "totem.token".to_string(),
                })
                .collect(),
        };
        write_frame(&mut agent, &Frame::new(MessageType::Request, &request).unwrap())
            .await
            .unwrap();

        write_frame(
            &mut agent,
            &Frame::new(MessageType::Cancel, &CancelRequest { id: 7 }).unwrap(),
        )
        .await
        .unwrap();
    });

    let frame = read_frame(&mut plugin).await.unwrap();
    let handshake: Handshake = frame.decode_as(MessageType::Handshake).unwrap();
    assert_eq!(handshake.protocol_version, PROTOCOL_VERSION);
    assert_eq!(handshake.magic_cookie_value, "gatherer");

    let frame = read_frame(&mut plugin).await.unwrap();
    let request: GatherRequest = frame.decode_as(MessageType::Request).unwrap();
    assert_eq!(request.id, 7);
    assert_eq!(request.requests.len(), 20);
    assert_eq!(request.requests[19].name, "fact_19");

    let frame = read_frame(&mut plugin).await.unwrap();
    let err = frame.decode_as::<CancelRequest>(MessageType::Request).unwrap_err();
    assert!(matches!(err, FrameError::UnexpectedMessageType { .. }));
    assert_eq!(frame.decode::<CancelRequest>().unwrap().id, 7);

    writer.await.unwrap();

    // Writer side dropped
    assert!(matches!(
        read_frame(&mut plugin).await,
        Err(FrameError::ConnectionClosed)
    ));
}

#[test]
fn test_control_plane_request_envelopes() {
    let facts = serde_json::json!({
        "specversion": "1.0",
        "id": "8f3c7c5e-7d0e-4b6a-9c2e-1f0f5d1e2a3b",
        "source": "https://github.com/trento-project/web",
        "type": "Trento.Checks.V1.FactsGatheringRequested",
        "time": "2024-05-02T10:00:00Z",
        "datacontenttype": "application/json",
        "data": {
            "execution_id": "e",
            "group_id": "g",
            "targets": [{"agent_id": "a", "fact_requests": [
                {"check_id": "156F64", "name": "corosync_token_timeout", "gatherer": "corosync.conf", "argument": "totem.token"}
            ]}]
        }
    });
    let envelope = Envelope::from_slice(facts.to_string().as_bytes()).unwrap();
    assert_eq!(envelope.kind().unwrap(), EventType::FactsGatheringRequested);
    let body: FactsGatheringRequested = envelope.decode_data().unwrap();
    assert_eq!(body.targets[0].fact_requests[0].check_id, "156F64");

    let operation = serde_json::json!({
        "specversion": "1.0",
        "id": "1",
        "source": "https://github.com/trento-project/web",
        "type": "Trento.Operations.V1.OperatorExecutionRequested",
        "data": {
            "operation_id": "op",
            "group_id": "g",
            "step_number": 3,
            "operator": "saptuneapplysolution@v1",
            "targets": [{"agent_id": "a", "arguments": {"solution": "HANA"}}]
        }
    });
    let envelope = Envelope::from_slice(operation.to_string().as_bytes()).unwrap();
    let body: OperatorExecutionRequested = envelope.decode_data().unwrap();
    assert_eq!(body.step_number, 3);
    assert_eq!(body.targets[0].arguments["solution"], "HANA");
}

#[test]
fn test_envelope_validation_errors() {
    let missing_source = serde_json::json!({
        "specversion": "1.0",
        "id": "1",
        "source": "",
        "type": "Trento.Checks.V1.FactsGatheringRequested"
    });
    assert!(matches!(
        Envelope::from_slice(missing_source.to_string().as_bytes()),
        Err(EventError::MissingAttribute("source"))
    ));

    let old_version = serde_json::json!({
        "specversion": "0.3",
        "id": "1",
        "source": "s",
        "type": "Trento.Checks.V1.FactsGatheringRequested"
    });
    assert!(matches!(
        Envelope::from_slice(old_version.to_string().as_bytes()),
        Err(EventError::UnsupportedSpecVersion(_))
    ));

    let no_data = serde_json::json!({
        "specversion": "1.0",
        "id": "1",
        "source": "s",
        "type": "Trento.Checks.V1.FactsGatheringRequested"
    });
    let envelope = Envelope::from_slice(no_data.to_string().as_bytes()).unwrap();
    assert!(matches!(
        envelope.decode_data::<FactsGatheringRequested>(),
        Err(EventError::MissingData)
    ));
}
