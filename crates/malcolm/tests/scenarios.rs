// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::unreadable_literal)] // Timestamps copied from captured traffic

//! End-to-end request scenarios against a served device, checked at the
//! raw frame level.

mod common;

use common::{serve, zebra, zebra_builder, RawPeer};
use malcolm::model::DState;
use malcolm::server::{Server, ServerConfig};
use malcolm::transport::Endpoint;
use malcolm::{serialize_error, Error};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_configure_streams_status_then_returns() {
    let served = serve(zebra());
    let mut peer = RawPeer::connect(&served.hub).ready().await;

    peer.send(r#"{"type":"Subscribe","id":100,"param":"zebra1.status"}"#);
    let initial = peer.recv().await;
    assert_eq!(initial["type"], "Value");
    assert_eq!(initial["id"], 100);
    assert_eq!(initial["val"]["state"]["index"], 1);

    peer.send(
        r#"{"type":"Call","id":0,"method":"zebra1.configure","args":{"PC_BIT_CAP":1,"PC_TSPRE":"ms"}}"#,
    );
    let change = peer.recv().await;
    assert_eq!(change["type"], "Value");
    assert_eq!(change["id"], 100);
    assert_eq!(change["val"]["state"]["index"], 2);
    assert_eq!(change["val"]["message"], "Configuring started");

    assert_eq!(peer.recv_raw().await, r#"{"type":"Return","id":0}"#);

    let device = &served.device;
    assert_eq!(device.attribute("PC_BIT_CAP").unwrap().value(), json!(1));
    assert_eq!(device.attribute("PC_TSPRE").unwrap().value(), json!("ms"));
    served.handle.stop();
}

#[tokio::test]
async fn test_configure_from_running_is_refused() {
    let served = serve(
        zebra_builder()
            .initial_state(&DState::Running)
            .build()
            .unwrap(),
    );
    let mut peer = RawPeer::connect(&served.hub).ready().await;

    peer.send(r#"{"type":"Call","id":3,"method":"zebra1.configure","args":{"PC_BIT_CAP":1}}"#);
    assert_eq!(
        peer.recv().await,
        json!({"type": "Error", "id": 3, "message": "Cannot call configure from state Running"})
    );
    assert!(served.device.attribute("PC_BIT_CAP").unwrap().value().is_null());
    assert_eq!(served.device.status().state(), "Running");
    served.handle.stop();
}

#[tokio::test]
async fn test_get_status() {
    let served = serve(zebra());
    let mut peer = RawPeer::connect(&served.hub).ready().await;

    peer.send(r#"{"type":"Get","id":5,"param":"zebra1.status"}"#);
    let reply = peer.recv().await;
    assert_eq!(reply["type"], "Return");
    assert_eq!(reply["id"], 5);
    assert_eq!(reply["val"]["state"]["index"], 1);
    assert_eq!(reply["val"]["state"]["choices"][1], "Idle");
    assert!(reply["val"]["timeStamp"]["secondsPastEpoch"].is_u64());
    served.handle.stop();
}

#[tokio::test]
async fn test_get_errors() {
    let served = serve(zebra());
    let mut peer = RawPeer::connect(&served.hub).ready().await;

    peer.send(r#"{"type":"Get","id":1,"param":"zebra1.nothing"}"#);
    assert_eq!(
        peer.recv().await,
        json!({"type": "Error", "id": 1, "message": "No such path zebra1.nothing"})
    );

    peer.send(r#"{"type":"Call","id":2,"method":"zebra1.fly"}"#);
    assert_eq!(peer.recv().await["message"], "Invalid function fly");

    peer.send(r#"{"type":"Call","id":3,"method":"zebra2.run"}"#);
    assert_eq!(peer.recv().await["message"], "Wrong device name zebra2");
    served.handle.stop();
}

#[tokio::test]
async fn test_attribute_subscription_lifecycle() {
    let device = zebra();
    device.attribute("CONNECTED").unwrap().set(5).unwrap();
    let served = serve(device);
    let mut peer = RawPeer::connect(&served.hub).ready().await;

    peer.send(r#"{"type":"Subscribe","id":7,"param":"zebra1.CONNECTED"}"#);
    let first = peer.recv().await;
    assert_eq!(first["type"], "Value");
    assert_eq!(first["id"], 7);
    assert_eq!(first["val"]["value"], 5);

    served.device.attribute("CONNECTED").unwrap().set(9).unwrap();
    let second = peer.recv().await;
    assert_eq!(second["id"], 7);
    assert_eq!(second["val"]["value"], 9);

    peer.send(r#"{"type":"Unsubscribe","id":7}"#);
    assert_eq!(peer.recv_raw().await, r#"{"type":"Return","id":7}"#);

    // No further values after the Return.
    served.device.attribute("CONNECTED").unwrap().set(11).unwrap();
    peer.assert_silent(Duration::from_millis(100)).await;
    served.handle.stop();
}

#[tokio::test]
async fn test_subscriptions_are_per_peer() {
    let served = serve(zebra());
    let mut first = RawPeer::connect(&served.hub).ready().await;
    let mut second = RawPeer::connect(&served.hub).ready().await;

    // Same id on two connections is two subscriptions.
    first.send(r#"{"type":"Subscribe","id":1,"param":"zebra1.CONNECTED"}"#);
    second.send(r#"{"type":"Subscribe","id":1,"param":"zebra1.CONNECTED"}"#);
    assert_eq!(first.recv().await["type"], "Value");
    assert_eq!(second.recv().await["type"], "Value");

    served.device.attribute("CONNECTED").unwrap().set(1).unwrap();
    assert_eq!(first.recv().await["val"]["value"], 1);
    assert_eq!(second.recv().await["val"]["value"], 1);

    first.send(r#"{"type":"Unsubscribe","id":1}"#);
    assert_eq!(first.recv().await["type"], "Return");

    served.device.attribute("CONNECTED").unwrap().set(2).unwrap();
    assert_eq!(second.recv().await["val"]["value"], 2);
    first.assert_silent(Duration::from_millis(100)).await;
    served.handle.stop();
}

#[tokio::test]
async fn test_attributes_subscription_sends_whole_map() {
    let served = serve(zebra());
    let mut peer = RawPeer::connect(&served.hub).ready().await;

    peer.send(r#"{"type":"Subscribe","id":4,"param":"zebra1.attributes"}"#);
    let first = peer.recv().await;
    let names: Vec<&String> = first["val"].as_object().unwrap().keys().collect();
    assert_eq!(names, ["PC_BIT_CAP", "PC_TSPRE", "CONNECTED"]);

    served.device.attribute("PC_TSPRE").unwrap().set("s").unwrap();
    let change = peer.recv().await;
    assert_eq!(change["val"]["PC_TSPRE"]["value"], "s");
    assert!(change["val"]["CONNECTED"].is_object());

    // Status changes do not touch the attributes map.
    served
        .device
        .status()
        .transition(&DState::Ready, "Ready")
        .unwrap();
    peer.assert_silent(Duration::from_millis(100)).await;
    served.handle.stop();
}

#[test]
fn test_serialize_error() {
    let err = Error::Remote("No device named foo registered".into());
    assert_eq!(
        serde_json::to_string(&serialize_error(1, &err)).unwrap(),
        r#"{"type":"Error","id":1,"message":"No device named foo registered"}"#
    );
}

#[tokio::test]
async fn test_ready_is_first_frame_in_memory() {
    let served = serve(zebra());
    let mut peer = RawPeer::connect(&served.hub);
    assert_eq!(peer.recv_raw().await, r#"{"type":"Ready","device":"zebra1"}"#);
    served.handle.stop();
}

#[tokio::test]
async fn test_ready_is_first_frame_over_tcp() {
    let config = ServerConfig {
        endpoint: "tcp://127.0.0.1:0".into(),
        ..ServerConfig::default()
    };
    let max = config.max_message_size;
    let server = Server::bind(zebra(), config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = server.handle();
    let task = tokio::spawn(server.serve());

    let mut client = Endpoint::parse(&format!("tcp://{}", addr))
        .unwrap()
        .connect(max)
        .await
        .unwrap();
    let greeting = tokio::time::timeout(common::WAIT, client.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(greeting, br#"{"type":"Ready","device":"zebra1"}"#);

    client
        .send(br#"{"type":"Get","id":2,"param":"zebra1.CONNECTED"}"#.to_vec())
        .unwrap();
    let reply = tokio::time::timeout(common::WAIT, client.recv())
        .await
        .unwrap()
        .unwrap();
    let reply: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(reply["type"], "Return");
    assert_eq!(reply["val"]["type"], "int");

    handle.stop();
    tokio::time::timeout(common::WAIT, task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_remote_stop_ends_serve() {
    let served = serve(zebra());
    let mut peer = RawPeer::connect(&served.hub).ready().await;

    peer.send(r#"{"type":"Call","id":9,"method":"zebra1.stop"}"#);
    assert_eq!(peer.recv_raw().await, r#"{"type":"Return","id":9}"#);

    tokio::time::timeout(common::WAIT, served.task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(served.handle.is_stopped());
}
