//! Protocol-level tests: frames in, frames out, exactly-once reporting.

use mockito::Server;
use serde_json::json;

use sendgrid_provider::config::ProviderConfig;
use sendgrid_provider::resources::builtin_registry;
use sendgrid_provider::server::ProviderServer;
use sendgrid_provider::{
    CrudOrchestrator, ProviderRequest, ProviderResponse, ResourceSpec, RetryPolicy,
};

fn provider_server() -> ProviderServer {
    ProviderServer::new(
        CrudOrchestrator::new(builtin_registry()).with_retry_policy(RetryPolicy::no_retries()),
    )
}

fn configure_frame(base_url: &str) -> ProviderRequest {
    let config: ProviderConfig = serde_json::from_value(json!({
        "api_key": "SG.test-key",
        "base_url": base_url,
    }))
    .unwrap();
    ProviderRequest::Configure { config }
}

#[tokio::test]
async fn test_operations_require_configuration_first() {
    let server = provider_server();
    let spec = ResourceSpec::new("api_key", "myKey").with_property("name", json!("k"));

    let response = server
        .handle(ProviderRequest::Read {
            state: sendgrid_provider::ResourceState::new(
                "api_key",
                "k1",
                spec.properties.clone(),
            ),
        })
        .await;
    match response {
        ProviderResponse::Error { code, .. } => assert_eq!(code, "configuration"),
        other => panic!("unexpected response: {:?}", other),
    }
}

#[tokio::test]
async fn test_full_frame_flow_configure_create_replay() {
    let mut api = Server::new_async().await;
    let create = api
        .mock("POST", "/v3/api_keys")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "api_key": "SG.secret",
                "api_key_id": "k1",
                "name": "ci key",
                "scopes": [],
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let server = provider_server();
    let configured = server.handle(configure_frame(&api.url())).await;
    assert_eq!(configured, ProviderResponse::Configured);

    let spec = ResourceSpec::new("api_key", "myKey").with_property("name", json!("ci key"));
    let first = server
        .handle(ProviderRequest::Create {
            request_id: "req-1".to_string(),
            spec: spec.clone(),
        })
        .await;
    let state = match &first {
        ProviderResponse::State { state: Some(state) } => state.clone(),
        other => panic!("unexpected response: {:?}", other),
    };
    assert_eq!(state.id, "k1");

    // A retried frame with the same request id replays the recorded state;
    // the mock's expect(1) proves no second POST happened.
    let replayed = server
        .handle(ProviderRequest::Create {
            request_id: "req-1".to_string(),
            spec,
        })
        .await;
    assert_eq!(replayed, first);
    create.assert_async().await;
}

#[tokio::test]
async fn test_delete_frame_reports_deleted_and_replays() {
    let mut api = Server::new_async().await;
    let delete = api
        .mock("DELETE", "/v3/api_keys/k1")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let server = provider_server();
    assert_eq!(
        server.handle(configure_frame(&api.url())).await,
        ProviderResponse::Configured
    );

    let state = sendgrid_provider::ResourceState::new(
        "api_key",
        "k1",
        sendgrid_provider::PropertyBag::new(),
    );
    let frame = ProviderRequest::Delete {
        request_id: "req-del".to_string(),
        state,
    };
    let first = server.handle(frame.clone()).await;
    assert_eq!(first, ProviderResponse::Deleted);

    let replayed = server.handle(frame).await;
    assert_eq!(replayed, ProviderResponse::Deleted);
    delete.assert_async().await;
}

#[tokio::test]
async fn test_malformed_and_unknown_frames() {
    // Unknown ops fail at the serde boundary.
    let parsed = serde_json::from_str::<ProviderRequest>(r#"{"op": "import_state"}"#);
    assert!(parsed.is_err());

    // Validate surfaces diagnostics rather than an error frame.
    let server = provider_server();
    let spec = ResourceSpec::new("template", "welcome")
        .with_property("name", json!("welcome"))
        .with_property("generation", json!("v5"));
    let response = server.handle(ProviderRequest::Validate { spec }).await;
    match response {
        ProviderResponse::Diagnostics { diagnostics } => {
            assert_eq!(diagnostics.len(), 1);
            assert_eq!(diagnostics[0].attribute.as_deref(), Some("generation"));
        },
        other => panic!("unexpected response: {:?}", other),
    }
}
