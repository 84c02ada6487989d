//! End-to-end CRUD flows against a mock SendGrid API.

use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;

use sendgrid_provider::testing::{
    assert_plan_replaces, assert_plan_updates_in_place, ProviderTester,
};
use sendgrid_provider::types::{PropertyBag, ResourceState};
use sendgrid_provider::{ProviderError, RetryPolicy};

fn tester_for(server: &ServerGuard) -> ProviderTester {
    let tester = ProviderTester::builtin();
    tester.configure_for("SG.test-key", &server.url());
    tester
}

fn template_state(id: &str, name: &str, generation: &str) -> ResourceState {
    let mut bag = PropertyBag::new();
    bag.insert("name".to_string(), json!(name));
    bag.insert("generation".to_string(), json!(generation));
    ResourceState::new("template", id, bag)
}

#[tokio::test]
async fn test_api_key_create_then_update_scopes_keeps_identity() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("POST", "/v3/api_keys")
        .match_body(Matcher::Json(
            json!({"name": "ci key", "scopes": ["mail.send"]}),
        ))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "api_key": "SG.secret-value",
                "api_key_id": "k1",
                "name": "ci key",
                "scopes": ["mail.send"],
            })
            .to_string(),
        )
        .create_async()
        .await;
    let update = server
        .mock("PUT", "/v3/api_keys/k1")
        .match_body(Matcher::Json(
            json!({"name": "ci key", "scopes": ["mail.send", "alerts.read"]}),
        ))
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "api_key_id": "k1",
                "name": "ci key",
                "scopes": ["mail.send", "alerts.read"],
            })
            .to_string(),
        )
        .create_async()
        .await;

    let tester = tester_for(&server);
    let state = tester
        .create(
            "api_key",
            "myKey",
            json!({"name": "ci key", "scopes": ["mail.send"]}),
        )
        .await
        .unwrap();
    assert_eq!(state.id, "k1");
    assert_eq!(state.properties["api_key"], json!("SG.secret-value"));

    let plan = tester
        .plan_update(
            &state,
            json!({"name": "ci key", "scopes": ["mail.send", "alerts.read"]}),
        )
        .unwrap();
    assert_plan_updates_in_place(&plan);

    let updated = tester
        .update(
            &state,
            json!({"name": "ci key", "scopes": ["mail.send", "alerts.read"]}),
        )
        .await
        .unwrap();
    assert_eq!(updated.id, "k1", "update must not change the remote identity");
    assert_eq!(
        updated.properties["scopes"],
        json!(["mail.send", "alerts.read"])
    );
    // The secret never comes back from the API after creation; the updated
    // state carries it forward.
    assert_eq!(updated.properties["api_key"], json!("SG.secret-value"));

    create.assert_async().await;
    update.assert_async().await;
}

#[tokio::test]
async fn test_create_then_read_round_trips_observed_state() {
    let mut server = Server::new_async().await;
    let body = json!({"id": "t1", "name": "welcome", "generation": "dynamic"});
    server
        .mock("POST", "/v3/templates")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await;
    server
        .mock("GET", "/v3/templates/t1")
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await;

    let tester = tester_for(&server);
    let created = tester
        .create("template", "welcome", json!({"name": "welcome"}))
        .await
        .unwrap();
    let observed = tester.read(&created).await.unwrap().unwrap();
    assert_eq!(observed, created);
}

#[tokio::test]
async fn test_read_of_deleted_entity_reports_orphan() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/v3/templates/t-gone")
        .with_status(404)
        .with_body(json!({"errors": [{"message": "template not found"}]}).to_string())
        .create_async()
        .await;

    let tester = tester_for(&server);
    let observed = tester
        .read(&template_state("t-gone", "welcome", "dynamic"))
        .await
        .unwrap();
    assert!(observed.is_none());
}

#[tokio::test]
async fn test_create_with_identity_override_never_duplicates() {
    let mut server = Server::new_async().await;
    let probe = server
        .mock("GET", "/v3/api_keys/k9")
        .with_header("content-type", "application/json")
        .with_body(json!({"api_key_id": "k9", "name": "ci key", "scopes": []}).to_string())
        .create_async()
        .await;
    let post = server
        .mock("POST", "/v3/api_keys")
        .expect(0)
        .create_async()
        .await;

    let tester = tester_for(&server);
    let err = tester
        .create_with_identity("api_key", "myKey", "k9", json!({"name": "ci key"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::AlreadyExists(_)));

    probe.assert_async().await;
    post.assert_async().await;
}

#[tokio::test]
async fn test_replace_plan_deletes_and_recreates_without_update() {
    let mut server = Server::new_async().await;
    let delete = server
        .mock("DELETE", "/v3/templates/t1")
        .with_status(204)
        .create_async()
        .await;
    let create = server
        .mock("POST", "/v3/templates")
        .match_body(Matcher::Json(json!({"name": "welcome", "generation": "legacy"})))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(json!({"id": "t2", "name": "welcome", "generation": "legacy"}).to_string())
        .create_async()
        .await;
    let patch = server
        .mock("PATCH", "/v3/templates/t1")
        .expect(0)
        .create_async()
        .await;

    let tester = tester_for(&server);
    let state = template_state("t1", "welcome", "dynamic");

    let plan = tester
        .plan_update(&state, json!({"name": "welcome", "generation": "legacy"}))
        .unwrap();
    assert_plan_replaces(&plan);

    let replaced = tester
        .apply(
            Some(&state),
            "template",
            "welcome",
            json!({"name": "welcome", "generation": "legacy"}),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(replaced.id, "t2");
    assert_eq!(replaced.properties["generation"], json!("legacy"));

    delete.assert_async().await;
    create.assert_async().await;
    patch.assert_async().await;
}

#[tokio::test]
async fn test_update_rejecting_replace_required_change_makes_no_calls() {
    let mut server = Server::new_async().await;
    let patch = server
        .mock("PATCH", "/v3/templates/t1")
        .expect(0)
        .create_async()
        .await;

    let tester = tester_for(&server);
    let state = template_state("t1", "welcome", "dynamic");
    let err = tester
        .update(&state, json!({"name": "welcome", "generation": "legacy"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::FailedPrecondition(_)));

    patch.assert_async().await;
}

#[tokio::test]
async fn test_delete_of_already_gone_entity_succeeds() {
    let mut server = Server::new_async().await;
    server
        .mock("DELETE", "/v3/api_keys/k1")
        .with_status(404)
        .with_body(json!({"errors": [{"message": "not found"}]}).to_string())
        .create_async()
        .await;

    let tester = tester_for(&server);
    let mut bag = PropertyBag::new();
    bag.insert("name".to_string(), json!("ci key"));
    let state = ResourceState::new("api_key", "k1", bag);

    tester.delete(&state).await.unwrap();
}

#[tokio::test]
async fn test_transient_errors_are_retried_until_exhaustion() {
    let mut server = Server::new_async().await;
    let flaky = server
        .mock("GET", "/v3/templates/t1")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let tester = ProviderTester::builtin().with_retry_policy(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    });
    tester.configure_for("SG.test-key", &server.url());

    let err = tester
        .read(&template_state("t1", "welcome", "dynamic"))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    flaky.assert_async().await;
}

#[tokio::test]
async fn test_remote_rejection_is_not_retried() {
    let mut server = Server::new_async().await;
    let rejected = server
        .mock("POST", "/v3/api_keys")
        .with_status(400)
        .with_body(json!({"errors": [{"message": "invalid scope", "field": "scopes"}]}).to_string())
        .expect(1)
        .create_async()
        .await;

    let tester = ProviderTester::builtin().with_retry_policy(RetryPolicy {
        max_attempts: 4,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    });
    tester.configure_for("SG.test-key", &server.url());

    let err = tester
        .create("api_key", "myKey", json!({"name": "k", "scopes": ["bogus"]}))
        .await
        .unwrap_err();
    match err {
        ProviderError::RemoteRejected { status, field, .. } => {
            assert_eq!(status, 400);
            assert_eq!(field.as_deref(), Some("scopes"));
        },
        other => panic!("expected RemoteRejected, got {:?}", other),
    }
    rejected.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_mutations_on_same_identity_conflict() {
    let mut server = Server::new_async().await;
    let response = json!({"id": "t1", "name": "hello", "generation": "dynamic"}).to_string();
    // The update answer is held back long enough for the delete to arrive
    // while the identity lock is still held.
    server
        .mock("PATCH", "/v3/templates/t1")
        .with_header("content-type", "application/json")
        .with_chunked_body(move |w| {
            std::thread::sleep(Duration::from_millis(300));
            w.write_all(response.as_bytes())
        })
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/v3/templates/t1")
        .expect(0)
        .create_async()
        .await;

    let tester = Arc::new(tester_for(&server));
    let state = template_state("t1", "welcome", "dynamic");

    let update_tester = Arc::clone(&tester);
    let update_state = state.clone();
    let update_task = tokio::spawn(async move {
        update_tester
            .update(&update_state, json!({"name": "hello"}))
            .await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let delete_result = tester.delete(&state).await;
    assert!(
        matches!(delete_result, Err(ProviderError::Conflict(_))),
        "expected the concurrent delete to conflict, got {:?}",
        delete_result
    );

    let updated = update_task.await.unwrap().unwrap();
    assert_eq!(updated.properties["name"], json!("hello"));
    delete.assert_async().await;
}

#[tokio::test]
async fn test_paged_listing_walks_offsets() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/v3/templates")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("limit".to_string(), "2".to_string()),
            Matcher::UrlEncoded("offset".to_string(), "0".to_string()),
        ]))
        .with_header("content-type", "application/json")
        .with_body(json!({"result": [{"id": "t1"}, {"id": "t2"}]}).to_string())
        .create_async()
        .await;
    server
        .mock("GET", "/v3/templates")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("limit".to_string(), "2".to_string()),
            Matcher::UrlEncoded("offset".to_string(), "2".to_string()),
        ]))
        .with_header("content-type", "application/json")
        .with_body(json!({"result": [{"id": "t3"}]}).to_string())
        .create_async()
        .await;

    let client = sendgrid_provider::SendGridClient::new("SG.test-key", server.url()).unwrap();
    let items = client.get_paged("/v3/templates", 2).await.unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[2]["id"], json!("t3"));
}
