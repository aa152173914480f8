//! Integration tests for the resource controller using wiremock
//!
//! These tests run the real client and controller against a mocked console,
//! checking request bodies, read-back and NotFound handling.

use pcc_provider::api::apispec::resolve_api_spec;
use pcc_provider::api::client::ConsoleClient;
use pcc_provider::api::collections::get_collection_by_name;
use pcc_provider::config::ProviderConfig;
use pcc_provider::error::ProviderError;
use pcc_provider::resource::{PolicyType, ResourceController};
use pcc_provider::schema::{apply_defaults, Record, Value};
use serde_json::json;
use wiremock::matchers::{bearer_token, body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn token_client(server: &MockServer) -> ConsoleClient {
    ConsoleClient::new(&ProviderConfig {
        console_url: server.uri(),
        token: Some("test-token".to_string()),
        ..Default::default()
    })
    .expect("client should build")
}

fn string(value: &str) -> Value {
    Value::String(value.to_string())
}

mod collection_tests {
    use super::*;

    /// A collection missing from the console reads as absent, not as an error
    #[tokio::test]
    async fn test_read_not_found_clears_identity() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/collections"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "collection").unwrap();

        let state = controller.read("My Collection").await.expect("read should not fail");
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn test_read_missing_from_list() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/collections"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "other"}])))
            .mount(&server)
            .await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "collection").unwrap();

        assert!(controller.read("web").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_lifts_every_field() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/collections"))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "web", "hosts": ["web-*"], "owner": "admin", "unknownField": 1}
            ])))
            .mount(&server)
            .await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "collection").unwrap();

        let state = controller.read("web").await.unwrap().expect("collection exists");
        assert_eq!(state.id, "web");
        assert_eq!(state.record.get("hosts"), Some(&Value::List(vec![string("web-*")])));
        assert_eq!(state.record.get("description"), Some(&string("")));
        assert_eq!(state.record.get("owner"), Some(&string("admin")));
        assert!(state.record.get("unknown_field").is_none());
    }

    #[tokio::test]
    async fn test_create_sends_defaults_and_reads_back() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/collections"))
            .and(body_partial_json(json!({
                "name": "web",
                "hosts": ["web-*"],
                "images": ["*"],
                "accountIDs": ["*"]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/collections"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "web", "hosts": ["web-*"], "images": ["*"], "accountIDs": ["*"]}
            ])))
            .mount(&server)
            .await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "collection").unwrap();

        let mut desired = Record::new().with("name", "web").with("hosts", vec!["web-*"]);
        apply_defaults(&mut desired, &controller.def().fields).unwrap();

        let state = controller.create(&desired).await.expect("create should succeed");
        assert_eq!(state.id, "web");
        assert_eq!(state.record.get("account_ids"), Some(&Value::List(vec![string("*")])));
    }

    #[tokio::test]
    async fn test_update_of_missing_collection_fails() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/collections"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "collection").unwrap();

        let err = controller
            .update("web", &Record::new().with("name", "web"))
            .await
            .expect_err("update of a missing collection should fail");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("update collection"));
    }

    #[tokio::test]
    async fn test_update_cannot_rename() {
        let server = MockServer::start().await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "collection").unwrap();

        let err = controller
            .update("web", &Record::new().with("name", "api"))
            .await
            .expect_err("rename should be rejected");
        assert!(matches!(err.root(), ProviderError::Configuration { .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_collection_by_name() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/collections"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "All", "hosts": ["*"], "system": true},
                {"name": "web", "hosts": ["web-*"]}
            ])))
            .mount(&server)
            .await;

        let client = token_client(&server);

        let collection = get_collection_by_name(&client, "web").await.unwrap();
        assert_eq!(collection.hosts, vec!["web-*"]);
        assert!(!collection.system);

        let err = get_collection_by_name(&client, "WEB").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_replaces_collection() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/collections"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "My Collection", "description": "frontends", "hosts": ["web-*"]}
            ])))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/api/v1/collections/My%20Collection"))
            .and(body_partial_json(json!({
                "name": "My Collection",
                "description": "frontends",
                "hosts": ["web-*"]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "collection").unwrap();

        let desired = Record::new()
            .with("name", "My Collection")
            .with("description", "frontends")
            .with("hosts", vec!["web-*"]);

        let state = controller.update("My Collection", &desired).await.expect("update should succeed");
        assert_eq!(state.id, "My Collection");
        assert_eq!(state.record.get("description"), Some(&string("frontends")));
        assert_eq!(state.record.get("hosts"), Some(&Value::List(vec![string("web-*")])));
    }
}

mod credential_tests {
    use super::*;

    /// Deleting twice succeeds both times; the second call sees NotFound
    #[tokio::test]
    async fn test_delete_twice_succeeds() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/api/v1/credentials/aws-prod"))
            .respond_with(ResponseTemplate::new(200))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/api/v1/credentials/aws-prod"))
            .respond_with(ResponseTemplate::new(404))
            .with_priority(2)
            .expect(1)
            .mount(&server)
            .await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "credential").unwrap();

        controller.delete("aws-prod").await.expect("first delete");
        controller.delete("aws-prod").await.expect("second delete");
    }

    #[tokio::test]
    async fn test_delete_server_error_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/api/v1/credentials/aws-prod"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "credential").unwrap();

        let err = controller.delete("aws-prod").await.unwrap_err();
        assert_eq!(err.status().map(|s| s.as_u16()), Some(500));
    }

    #[tokio::test]
    async fn test_secret_sent_plain_and_kept_after_read() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/credentials"))
            .and(body_partial_json(json!({
                "_id": "aws-prod",
                "type": "aws",
                "secret": {"plain": "s3cr3t"}
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"_id": "aws-prod", "type": "aws", "secret": {"encrypted": "AAAA"}}
            ])))
            .mount(&server)
            .await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "credential").unwrap();

        let desired = Record::new()
            .with("id", "aws-prod")
            .with("type", "aws")
            .with("secret", "s3cr3t");

        let state = controller.create(&desired).await.unwrap();
        assert_eq!(state.record.get("secret"), Some(&string("s3cr3t")));

        let plain_read = controller.read("aws-prod").await.unwrap().unwrap();
        assert_eq!(plain_read.record.get("secret"), Some(&string("")));

        let refreshed = controller.refresh(&state).await.unwrap().unwrap();
        assert_eq!(refreshed.record.get("secret"), Some(&string("s3cr3t")));
    }

    #[tokio::test]
    async fn test_import_existing_credential() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"_id": "aws-prod", "type": "aws", "accountID": "AKIA1"}
            ])))
            .mount(&server)
            .await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "credential").unwrap();

        let state = controller.import("aws-prod").await.unwrap();
        assert_eq!(state.id, "aws-prod");
        assert_eq!(state.record.get("type"), Some(&string("aws")));
        assert_eq!(state.record.get("account_id"), Some(&string("AKIA1")));
    }

    #[tokio::test]
    async fn test_import_missing_credential_fails() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "credential").unwrap();

        let err = controller.import("aws-prod").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("import credential"));
    }
}

mod policy_tests {
    use super::*;

    #[tokio::test]
    async fn test_policy_write_carries_type_and_rules() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/api/v1/policies/compliance/container"))
            .and(body_partial_json(json!({
                "_id": "containerCompliance",
                "policyType": "containerCompliance",
                "rules": [{"name": "r1", "effect": "alert", "collections": [{"name": "All"}]}]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/policies/compliance/container"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_id": "containerCompliance",
                "policyType": "containerCompliance",
                "rules": [{
                    "name": "r1",
                    "effect": "alert",
                    "collections": [{"name": "All", "hosts": ["*"]}],
                    "owner": "admin"
                }]
            })))
            .mount(&server)
            .await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "compliance_container_policy").unwrap();

        let rule = Record::new()
            .with("name", "r1")
            .with("effect", "alert")
            .with("collections", vec!["All"]);
        let desired = Record::new().with("rule", vec![rule]);

        let state = controller.create(&desired).await.unwrap();
        assert_eq!(state.id, "containerCompliance");

        let rules = state.record.get("rule").and_then(Value::as_list).expect("rule list");
        assert_eq!(rules.len(), 1);
        let lifted = rules[0].as_record().unwrap();
        assert_eq!(lifted.get("name"), Some(&string("r1")));
        assert_eq!(lifted.get("collections"), Some(&Value::List(vec![string("All")])));
        assert_eq!(lifted.get("owner"), Some(&string("admin")));
        assert_eq!(lifted.get("disabled"), Some(&Value::Bool(false)));
    }

    /// Empty rules read back as an empty list
    #[tokio::test]
    async fn test_read_empty_rules() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/policies/runtime/host"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_id": "hostRuntime",
                "rules": []
            })))
            .mount(&server)
            .await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "runtime_host_policy").unwrap();

        let state = controller.read("hostRuntime").await.unwrap().unwrap();
        assert_eq!(state.record.get("rule"), Some(&Value::List(Vec::new())));
    }

    #[tokio::test]
    async fn test_delete_resets_policy() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/api/v1/policies/runtime/host"))
            .and(body_json(json!({
                "_id": "hostRuntime",
                "policyType": "hostRuntime",
                "rules": []
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "runtime_host_policy").unwrap();

        controller.delete("hostRuntime").await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_rule_names_rejected_before_request() {
        let server = MockServer::start().await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "compliance_host_policy").unwrap();

        let desired = Record::new().with(
            "rule",
            vec![
                Record::new().with("name", "same"),
                Record::new().with("name", "same"),
            ],
        );

        let err = controller.create(&desired).await.unwrap_err();
        assert!(matches!(err.root(), ProviderError::Configuration { .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_singleton_id_rejected() {
        let server = MockServer::start().await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "admission_policy").unwrap();

        let err = controller.read("hostRuntime").await.unwrap_err();
        assert!(matches!(err.root(), ProviderError::Configuration { .. }));
        assert!(err.to_string().starts_with("read admission_policy"));

        let err = controller.update("hostRuntime", &Record::new()).await.unwrap_err();
        assert!(err.to_string().starts_with("update admission_policy"));

        let err = controller.delete("hostRuntime").await.unwrap_err();
        assert!(err.to_string().starts_with("delete admission_policy"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_policy_update_replaces_whole_body() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/api/v1/policies/compliance/container"))
            .and(body_json(json!({
                "_id": "containerCompliance",
                "policyType": "containerCompliance",
                "rules": [{"name": "r2", "effect": "block"}]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/policies/compliance/container"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_id": "containerCompliance",
                "policyType": "containerCompliance",
                "rules": [{"name": "r2", "effect": "block"}]
            })))
            .mount(&server)
            .await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "compliance_container_policy").unwrap();

        let rule = Record::new().with("name", "r2").with("effect", "block");
        let desired = Record::new().with("rule", vec![rule]);
        let state = controller.update("containerCompliance", &desired).await.unwrap();

        let rules = state.record.get("rule").and_then(Value::as_list).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].as_record().unwrap().get("effect"), Some(&string("block")));
    }

    #[tokio::test]
    async fn test_policy_addressed_by_tag() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/policies/runtime/host"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_id": "hostRuntime",
                "policyType": "hostRuntime",
                "rules": [{"name": "default"}]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = token_client(&server);

        let by_tag = ResourceController::new(&client, "hostRuntime").unwrap();
        let state = by_tag.read("hostRuntime").await.unwrap().unwrap();
        assert_eq!(state.record.get("rule").and_then(Value::as_list).map(|r| r.len()), Some(1));

        let by_type = ResourceController::for_policy(&client, PolicyType::HostRuntime).unwrap();
        assert_eq!(by_type.read("hostRuntime").await.unwrap(), Some(state));

        assert!(matches!(
            ResourceController::new(&client, "nope").err(),
            Some(ProviderError::UnknownResource(_))
        ));
    }

    #[tokio::test]
    async fn test_read_rejects_other_policy_type() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/policies/runtime/host"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_id": "containerRuntime",
                "policyType": "containerRuntime",
                "rules": []
            })))
            .mount(&server)
            .await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "runtime_host_policy").unwrap();

        let err = controller.read("hostRuntime").await.unwrap_err();
        assert!(matches!(err.root(), ProviderError::Decode { .. }));
    }
}

mod custom_rule_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_assigns_next_id() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/custom-rules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"_id": 3, "name": "a", "script": "x", "type": "processes"},
                {"_id": 7, "name": "b", "script": "y", "type": "processes"}
            ])))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/api/v1/custom-rules/8"))
            .and(body_partial_json(json!({"_id": 8, "name": "c"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/custom-rules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"_id": 3, "name": "a", "script": "x", "type": "processes"},
                {"_id": 7, "name": "b", "script": "y", "type": "processes"},
                {"_id": 8, "name": "c", "script": "z", "type": "processes"}
            ])))
            .with_priority(2)
            .mount(&server)
            .await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "custom_rule").unwrap();

        let desired = Record::new()
            .with("name", "c")
            .with("script", "z")
            .with("type", "processes");

        let state = controller.create(&desired).await.unwrap();
        assert_eq!(state.id, "8");
        assert_eq!(state.record.get("id"), Some(&Value::Int(8)));
    }

    #[tokio::test]
    async fn test_missing_required_field_rejected() {
        let server = MockServer::start().await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "custom_rule").unwrap();

        let err = controller
            .create(&Record::new().with("name", "c"))
            .await
            .unwrap_err();
        assert!(matches!(err.root(), ProviderError::Configuration { .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_next_id_overflow_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/custom-rules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"_id": i64::MAX, "name": "a", "script": "x", "type": "processes"}
            ])))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = token_client(&server);
        let controller = ResourceController::new(&client, "custom_rule").unwrap();

        let desired = Record::new()
            .with("name", "c")
            .with("script", "z")
            .with("type", "processes");

        let err = controller.create(&desired).await.unwrap_err();
        assert!(matches!(err.root(), ProviderError::Decode { .. }));
    }
}

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn test_login_once_and_reuse_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/authenticate"))
            .and(body_json(json!({"username": "admin", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "jwt-1"})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/collections"))
            .and(bearer_token("jwt-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(2)
            .mount(&server)
            .await;

        let client = ConsoleClient::new(&ProviderConfig {
            console_url: server.uri(),
            username: Some("admin".to_string()),
            password: Some("pw".to_string()),
            ..Default::default()
        })
        .unwrap();
        let controller = ResourceController::new(&client, "collection").unwrap();

        assert!(controller.read("a").await.unwrap().is_none());
        assert!(controller.read("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_login() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/authenticate"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = ConsoleClient::new(&ProviderConfig {
            console_url: server.uri(),
            username: Some("admin".to_string()),
            password: Some("wrong".to_string()),
            ..Default::default()
        })
        .unwrap();

        let err = client.get_token().await.unwrap_err();
        assert!(matches!(err, ProviderError::Auth(_)));
    }
}

mod apispec_tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_api_spec() {
        let server = MockServer::start().await;

        let document = json!({"openapi": "3.0.0", "paths": {"/pets": {}}});

        Mock::given(method("POST"))
            .and(path("/api/v1/policies/firewall/app/apispec"))
            .and(body_json(document.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "endpoints": [{"host": "pets.example.com", "basePath": "/v1", "exposedPort": 443, "tls": true}]
            })))
            .mount(&server)
            .await;

        let client = token_client(&server);
        let endpoints = resolve_api_spec(&client, &document).await.unwrap();

        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].host, "pets.example.com");
        assert_eq!(endpoints[0].base_path, "/v1");
        assert!(endpoints[0].tls);
    }

    #[tokio::test]
    async fn test_non_object_document_rejected() {
        let server = MockServer::start().await;
        let client = token_client(&server);

        let err = resolve_api_spec(&client, &json!(["not", "a", "document"])).await.unwrap_err();
        assert!(matches!(err.root(), ProviderError::Configuration { .. }));
    }
}
