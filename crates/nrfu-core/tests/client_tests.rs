//! Device client behavior: state machine, caching, batching and error
//! semantics.

mod common;

use common::{device_config, established_client, MockTransport, SharedTransport};
use nrfu_core::device::ConnectionState;
use nrfu_core::error::NrfuError;
use nrfu_core::{Command, EapiClient};
use serde_json::json;

#[tokio::test]
async fn execute_requires_established() {
    let transport = MockTransport::new();
    let client = EapiClient::with_transport(device_config("leaf1"), Box::new(SharedTransport::new(transport)));

    let err = client.execute(&Command::new("show version")).await.unwrap_err();
    assert!(matches!(err, NrfuError::NotConnected(_)));
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn connect_populates_model_and_is_idempotent() {
    let transport = MockTransport::new();
    transport.respond_probe("DCS-7050SX");
    let client = EapiClient::with_transport(device_config("leaf1"), Box::new(SharedTransport::new(transport.clone())));

    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Established);
    assert_eq!(client.model().as_deref(), Some("DCS-7050SX"));
    assert_eq!(transport.request_count(), 1);

    // A second connect must not probe again
    client.connect().await.unwrap();
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn probe_failure_transitions_to_error() {
    let transport = MockTransport::new();
    transport.fail_transport(true);
    let client = EapiClient::with_transport(device_config("leaf1"), Box::new(SharedTransport::new(transport)));

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, NrfuError::ConnectError { .. }));
    assert_eq!(client.state(), ConnectionState::Error);
}

#[tokio::test]
async fn probe_without_model_field_is_a_connect_failure() {
    let transport = MockTransport::new();
    transport.respond("show version", json!({ "version": "4.31.1F" }));
    let client = EapiClient::with_transport(device_config("leaf1"), Box::new(SharedTransport::new(transport)));

    let err = client.connect().await.unwrap_err();
    assert!(err.to_string().contains("modelName"));
    assert_eq!(client.state(), ConnectionState::Error);
}

#[tokio::test]
async fn second_execute_is_served_from_cache() {
    let transport = MockTransport::new();
    transport.respond_probe("DCS-7050SX");
    transport.respond("show ntp status", json!({ "status": "synchronised" }));
    let client = established_client("leaf1", transport.clone()).await;

    let first = client.execute(&Command::new("show ntp status")).await.unwrap();
    assert!(!first.cached);
    assert_eq!(transport.request_count(), 2);

    let second = client.execute(&Command::new("show ntp status")).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.output, first.output);
    // No extra round trip
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn no_cache_command_always_hits_the_wire() {
    let transport = MockTransport::new();
    transport.respond_probe("DCS-7050SX");
    let client = established_client("leaf1", transport.clone()).await;

    let cmd = Command::new("show processes top once").no_cache();
    client.execute(&cmd).await.unwrap();
    client.execute(&cmd).await.unwrap();
    assert_eq!(transport.request_count(), 3); // probe + two executes
}

#[tokio::test]
async fn disabled_cache_config_never_caches() {
    let transport = MockTransport::new();
    transport.respond_probe("DCS-7050SX");
    let mut config = device_config("leaf1");
    config.disable_cache = true;
    let client = EapiClient::with_transport(config, Box::new(SharedTransport::new(transport.clone())));
    client.connect().await.unwrap();

    client.execute(&Command::new("show mlag")).await.unwrap();
    let again = client.execute(&Command::new("show mlag")).await.unwrap();
    assert!(!again.cached);
    assert_eq!(transport.request_count(), 3);
}

#[tokio::test]
async fn batch_splices_cache_hits_in_order() {
    let transport = MockTransport::new();
    transport.respond_probe("DCS-7050SX");
    transport.respond("show mlag", json!({ "state": "active" }));
    transport.respond("show ntp status", json!({ "status": "synchronised" }));
    transport.respond("show port-channel", json!({ "portChannels": {} }));
    let client = established_client("leaf1", transport.clone()).await;

    // Warm the cache for the middle command only
    client.execute(&Command::new("show ntp status")).await.unwrap();
    let before = transport.request_count();

    let commands = [
        Command::new("show mlag"),
        Command::new("show ntp status"),
        Command::new("show port-channel"),
    ];
    let results = client.execute_batch(&commands).await.unwrap();

    // One batched RPC for the two misses
    assert_eq!(transport.request_count(), before + 1);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].command, "show mlag");
    assert!(!results[0].cached);
    assert_eq!(results[1].command, "show ntp status");
    assert!(results[1].cached);
    assert_eq!(results[2].command, "show port-channel");
    assert_eq!(results[2].output, json!({ "portChannels": {} }));
}

#[tokio::test]
async fn fully_cached_batch_makes_no_rpc() {
    let transport = MockTransport::new();
    transport.respond_probe("DCS-7050SX");
    let client = established_client("leaf1", transport.clone()).await;

    client.execute(&Command::new("show mlag")).await.unwrap();
    let before = transport.request_count();

    let results = client
        .execute_batch(&[Command::new("show mlag")])
        .await
        .unwrap();
    assert_eq!(transport.request_count(), before);
    assert!(results[0].cached);
}

#[tokio::test]
async fn rpc_error_surfaces_and_client_stays_established() {
    let transport = MockTransport::new();
    transport.respond_probe("DCS-7050SX");
    let client = established_client("leaf1", transport.clone()).await;

    transport.fail_rpc(1002, "invalid command");
    let err = client.execute(&Command::new("show bogus")).await.unwrap_err();
    assert!(matches!(err, NrfuError::RpcError { code: 1002, .. }));
    assert_eq!(client.state(), ConnectionState::Established);

    // Later commands still work
    transport.clear_rpc_error();
    assert!(client.execute(&Command::new("show mlag")).await.is_ok());
}

#[tokio::test]
async fn transport_error_does_not_invalidate_connection() {
    let transport = MockTransport::new();
    transport.respond_probe("DCS-7050SX");
    let client = established_client("leaf1", transport.clone()).await;

    transport.fail_transport(true);
    let err = client.execute(&Command::new("show mlag")).await.unwrap_err();
    assert!(matches!(err, NrfuError::TransportError(_)));
    assert_eq!(client.state(), ConnectionState::Established);

    transport.fail_transport(false);
    assert!(client.execute(&Command::new("show mlag")).await.is_ok());
}

#[tokio::test]
async fn disconnect_clears_cache_and_is_reentrant() {
    let transport = MockTransport::new();
    transport.respond_probe("DCS-7050SX");
    let client = established_client("leaf1", transport.clone()).await;

    client.execute(&Command::new("show mlag")).await.unwrap();
    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Closed);
    client.disconnect();

    // Reconnect; the earlier cache entry must be gone
    client.connect().await.unwrap();
    let before = transport.request_count();
    let result = client.execute(&Command::new("show mlag")).await.unwrap();
    assert!(!result.cached);
    assert_eq!(transport.request_count(), before + 1);
}

#[tokio::test]
async fn refresh_updates_model() {
    let transport = MockTransport::new();
    transport.respond_probe("DCS-7050SX");
    let client = established_client("leaf1", transport.clone()).await;

    transport.respond_probe("DCS-7280SR");
    client.refresh().await.unwrap();
    assert_eq!(client.model().as_deref(), Some("DCS-7280SR"));
    assert_eq!(client.state(), ConnectionState::Established);
}

#[tokio::test]
async fn template_expansion_reaches_the_wire() {
    let transport = MockTransport::new();
    transport.respond_probe("DCS-7050SX");
    transport.respond(
        "show bgp summary vrf PROD",
        json!({ "vrfs": { "PROD": { "peers": {} } } }),
    );
    let client = established_client("leaf1", transport.clone()).await;

    let cmd = Command::new("show bgp summary vrf {vrf}").with_param("vrf", "PROD");
    let result = client.execute(&cmd).await.unwrap();
    assert_eq!(result.command, "show bgp summary vrf PROD");
    assert_eq!(result.output["vrfs"]["PROD"]["peers"], json!({}));
}
