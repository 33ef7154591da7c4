// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic

//! Client runtime against a served device and against a scripted peer.

mod common;

use common::{serve, zebra, zebra_builder, WAIT};
use malcolm::client::{Client, ClientConfig};
use malcolm::model::{DState, Method, VType};
use malcolm::transport::{MemoryHub, PeerId, ServerEndpoint, TransportEvent};
use malcolm::Error;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::sync::mpsc;

async fn client(hub: &MemoryHub) -> Client {
    Client::with_transport(hub.connect().unwrap(), "zebra1", ClientConfig::default())
        .await
        .unwrap()
}

fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("Not an object: {}", other),
    }
}

/// Peer that greets as `zebra1` and then does only what the test says.
struct ScriptedServer {
    endpoint: ServerEndpoint,
    peer: PeerId,
}

impl ScriptedServer {
    async fn accept(mut endpoint: ServerEndpoint) -> Self {
        let peer = match endpoint.recv().await {
            Some(TransportEvent::Connected(peer)) => peer,
            other => panic!("Unexpected event: {:?}", other),
        };
        endpoint
            .sender()
            .send(&peer, br#"{"type":"Ready","device":"zebra1"}"#.to_vec())
            .unwrap();
        Self { endpoint, peer }
    }

    async fn request(&mut self) -> Value {
        match tokio::time::timeout(WAIT, self.endpoint.recv()).await.unwrap() {
            Some(TransportEvent::Message(_, payload)) => serde_json::from_slice(&payload).unwrap(),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    fn reply(&self, frame: &str) {
        self.endpoint
            .sender()
            .send(&self.peer, frame.as_bytes().to_vec())
            .unwrap();
    }
}

async fn scripted(config: ClientConfig) -> (Client, ScriptedServer) {
    let (hub, endpoint) = MemoryHub::new();
    let transport = hub.connect().unwrap();
    let (server, client) = tokio::join!(
        ScriptedServer::accept(endpoint),
        Client::with_transport(transport, "zebra1", config)
    );
    (client.unwrap(), server)
}

#[tokio::test]
async fn test_ids_are_monotonic() {
    let served = serve(zebra());
    let client = client(&served.hub).await;

    let ids: Vec<u64> = (0..3)
        .map(|_| client.request_get("zebra1.status").unwrap().id())
        .collect();
    assert_eq!(ids, [0, 1, 2]);

    let stream = client.request_get("zebra1.CONNECTED").unwrap();
    assert_eq!(stream.id(), 3);
    assert_eq!(stream.collect().await.unwrap().len(), 1);
    served.handle.stop();
}

#[tokio::test]
async fn test_get_and_call() {
    let served = serve(zebra());
    let client = client(&served.hub).await;

    let status = client.get("status").await.unwrap();
    assert_eq!(status["state"]["index"], 1);
    let attr = client.get("zebra1.PC_TSPRE").await.unwrap();
    assert_eq!(attr["type"], "str");

    let result = client
        .call("configure", args(json!({"PC_BIT_CAP": 3})))
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(served.device.status().state(), "Configuring");
    assert_eq!(served.device.attribute("PC_TSPRE").unwrap().value(), "ms");
    assert_eq!(client.pending_count(), 0);
    served.handle.stop();
}

#[tokio::test]
async fn test_remote_errors() {
    let served = serve(zebra());
    let client = client(&served.hub).await;

    match client.call("run", Map::new()).await {
        Err(Error::Remote(message)) => assert_eq!(message, "Cannot call run from state Idle"),
        other => panic!("Unexpected result: {:?}", other),
    }
    match client.get("nothing").await {
        Err(Error::Remote(message)) => assert_eq!(message, "No such path zebra1.nothing"),
        other => panic!("Unexpected result: {:?}", other),
    }
    match client.call("configure", Map::new()).await {
        Err(Error::Remote(message)) => {
            assert_eq!(message, "Arguments not supplied: [\"PC_BIT_CAP\"]")
        }
        other => panic!("Unexpected result: {:?}", other),
    }
    assert!(!client.is_closed());
    served.handle.stop();
}

#[tokio::test]
async fn test_subscribe_and_unsubscribe() {
    let served = serve(zebra());
    let client = client(&served.hub).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let subscription = client
        .subscribe("CONNECTED", move |value| {
            let _ = tx.send(value);
        })
        .await
        .unwrap();
    let first = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert!(first["value"].is_null());

    served.device.attribute("CONNECTED").unwrap().set(1).unwrap();
    let second = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(second["value"], 1);

    subscription.unsubscribe().await.unwrap();
    served.device.attribute("CONNECTED").unwrap().set(2).unwrap();
    assert!(tokio::time::timeout(Duration::from_millis(100), rx.recv())
        .await
        .map_or(true, |v| v.is_none()));
    served.handle.stop();
}

#[tokio::test]
async fn test_status_subscription_sees_transitions() {
    let served = serve(zebra());
    let client = client(&served.hub).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let subscription = client
        .subscribe("status", move |value| {
            let _ = tx.send(value["state"]["index"].clone());
        })
        .await
        .unwrap();
    client
        .call("configure", args(json!({"PC_BIT_CAP": 1})))
        .await
        .unwrap();

    let mut seen = Vec::new();
    while seen.len() < 2 {
        seen.push(tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap());
    }
    assert_eq!(seen, [json!(1), json!(2)]);
    subscription.unsubscribe().await.unwrap();
    served.handle.stop();
}

#[tokio::test]
async fn test_timeout_keeps_request_pending() {
    let config = ClientConfig {
        request_timeout_ms: 50,
        ..ClientConfig::default()
    };
    let (client, mut server) = scripted(config).await;

    let mut stream = client.request_get("zebra1.status").unwrap();
    assert_eq!(server.request().await, json!({"type": "Get", "id": 0, "param": "zebra1.status"}));

    assert!(matches!(stream.next().await, Some(Err(Error::Timeout(_)))));
    assert_eq!(client.pending_count(), 1);

    server.reply(r#"{"type":"Return","id":0,"val":"late"}"#);
    assert_eq!(stream.next().await.unwrap().unwrap(), "late");
    assert!(stream.next().await.is_none());
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_streamed_values_before_return() {
    let (client, mut server) = scripted(ClientConfig::default()).await;

    let mut stream = client.request_call("scan", Map::new()).unwrap();
    assert_eq!(server.request().await, json!({"type": "Call", "id": 0, "method": "zebra1.scan"}));

    server.reply(r#"{"type":"Value","id":0,"val":1}"#);
    server.reply(r#"{"type":"Value","id":0,"val":2}"#);
    server.reply(r#"{"type":"Return","id":0}"#);
    assert_eq!(stream.next().await.unwrap().unwrap(), 1);
    assert_eq!(stream.next().await.unwrap().unwrap(), 2);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_unknown_id_closes_connection() {
    let (client, mut server) = scripted(ClientConfig::default()).await;

    let stream = client.request_get("zebra1.status").unwrap();
    server.request().await;
    server.reply(r#"{"type":"Value","id":42,"val":null}"#);

    match tokio::time::timeout(WAIT, stream.collect()).await.unwrap() {
        Err(Error::TransportDead(reason)) => assert!(reason.contains("unknown request 42")),
        other => panic!("Unexpected result: {:?}", other),
    }
    assert!(client.is_closed());
    assert!(matches!(
        client.request_get("zebra1.status"),
        Err(Error::TransportDead(_))
    ));
}

#[tokio::test]
async fn test_malformed_frame_closes_connection() {
    let (client, mut server) = scripted(ClientConfig::default()).await;

    let stream = client.request_get("zebra1.status").unwrap();
    server.request().await;
    server.reply("{{{");

    match tokio::time::timeout(WAIT, stream.collect()).await.unwrap() {
        Err(Error::TransportDead(reason)) => assert!(reason.starts_with("Malformed message")),
        other => panic!("Unexpected result: {:?}", other),
    }
    assert!(client.is_closed());
}

#[tokio::test]
async fn test_subscribe_timeout_cancels_server_side() {
    let config = ClientConfig {
        request_timeout_ms: 50,
        ..ClientConfig::default()
    };
    let (client, mut server) = scripted(config).await;

    let (result, request) = tokio::join!(client.subscribe("status", |_| {}), server.request());
    assert_eq!(
        request,
        json!({"type": "Subscribe", "id": 0, "param": "zebra1.status"})
    );
    assert!(matches!(result, Err(Error::Timeout(_))));
    assert_eq!(server.request().await, json!({"type": "Unsubscribe", "id": 0}));

    // The late snapshot and the Return are absorbed without a protocol error.
    server.reply(r#"{"type":"Value","id":0,"val":{}}"#);
    server.reply(r#"{"type":"Return","id":0}"#);
    tokio::time::timeout(WAIT, async {
        while client.pending_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(!client.is_closed());
}

#[tokio::test]
async fn test_handler_panic_becomes_error() {
    let device = zebra_builder()
        .method(
            Method::builder("boom", |_device, args| async move {
                if args.bool("now")? {
                    panic!("kaboom");
                }
                Ok::<_, Error>(None)
            })
            .typed_arg("now", VType::Bool, "Panic right away", Some(json!(true))),
        )
        .build()
        .unwrap();
    let served = serve(device);
    let client = client(&served.hub).await;

    match client.call("boom", Map::new()).await {
        Err(Error::Remote(message)) => assert_eq!(message, "kaboom"),
        other => panic!("Unexpected result: {:?}", other),
    }
    // The server keeps serving.
    assert_eq!(client.get("status").await.unwrap()["state"]["index"], 1);
    served.handle.stop();
}

#[tokio::test]
async fn test_remote_stop() {
    let served = serve(zebra());
    let client = client(&served.hub).await;

    assert!(client.call("stop", Map::new()).await.unwrap().is_none());
    tokio::time::timeout(WAIT, served.task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let outcome = tokio::time::timeout(WAIT, async {
        loop {
            match client.get("status").await {
                Err(Error::TransportDead(_)) => break,
                _ => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
    })
    .await;
    assert!(outcome.is_ok());
}

#[tokio::test]
async fn test_wrong_device() {
    let served = serve(zebra());
    let result = Client::with_transport(
        served.hub.connect().unwrap(),
        "zebra2",
        ClientConfig::default(),
    )
    .await;
    match result {
        Err(Error::WrongDevice(name)) => assert_eq!(name, "zebra1"),
        other => panic!("Unexpected result: {:?}", other),
    }
    served.handle.stop();
}

#[tokio::test]
async fn test_ready_timeout() {
    let (hub, _endpoint) = MemoryHub::new();
    let config = ClientConfig {
        ready_timeout_ms: 50,
        ..ClientConfig::default()
    };
    let result = Client::with_transport(hub.connect().unwrap(), "zebra1", config).await;
    assert!(matches!(result, Err(Error::Timeout(_))));
}

#[tokio::test]
async fn test_close_fails_pending() {
    let (client, mut server) = scripted(ClientConfig::default()).await;

    let stream = client.request_get("zebra1.status").unwrap();
    server.request().await;
    client.close();

    assert!(matches!(stream.collect().await, Err(Error::TransportDead(_))));
    assert!(client.is_closed());
    assert_eq!(client.pending_count(), 0);
    assert!(matches!(
        client.call("configure", Map::new()).await,
        Err(Error::TransportDead(_))
    ));
}

#[tokio::test]
async fn test_state_index_on_ready_device() {
    let served = serve(
        zebra_builder()
            .initial_state(&DState::Ready)
            .build()
            .unwrap(),
    );
    let client = client(&served.hub).await;
    client.call("run", Map::new()).await.unwrap();
    assert_eq!(client.get("status").await.unwrap()["state"]["index"], 4);
    served.handle.stop();
}
