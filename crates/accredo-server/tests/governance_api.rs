//! Integration tests for the governance API

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

mod common;
use common::{address, TestApp};

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"], "memory");
    assert_eq!(body["chain_mirror"], false);
    assert!(body.get("database_healthy").is_none());
}

#[tokio::test]
async fn test_security_headers_present() {
    let app = TestApp::new().await;

    let response = app
        .router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert!(headers.get("strict-transport-security").is_none());
}

#[tokio::test]
async fn test_accreditation_by_vote_end_to_end() {
    let app = TestApp::new().await;
    let institute = address(0x11);
    let member_a = address(0x21);
    let member_b = address(0x22);
    let student = address(0x31);

    // Institutes and students may register themselves
    for (who, role) in [(institute, "institute"), (student, "student")] {
        let (status, _) = app
            .post(
                "/accounts",
                &who,
                json!({ "address": who, "role": role, "display_name": role }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    app.register(&member_a, "dao-member", 1).await;
    app.register(&member_b, "dao-member", 1).await;

    let (status, issuer) = app
        .post("/issuers", &institute, json!({ "name": "Polytechnic" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{issuer}");

    let uri = format!("/issuers/{institute}/eligibility");
    let (_, eligibility) = app.get(&uri, None).await;
    assert_eq!(eligibility["eligible"], false);
    assert_eq!(eligibility["state"], "registered");

    // Not yet accredited
    let (status, _) = app
        .post(
            "/credentials",
            &institute,
            json!({ "token_id": 1, "holder": student }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, proposal) = app
        .post(
            "/proposals",
            &member_a,
            json!({
                "action": { "kind": "AccreditIssuer" },
                "target": institute,
                "description": "Accredit the Polytechnic",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{proposal}");
    assert_eq!(proposal["current_state"], "Pending");
    let id = proposal["id"].as_str().unwrap().to_string();

    app.clock.advance_blocks(1);
    let (_, view) = app.get(&format!("/proposals/{id}"), None).await;
    assert_eq!(view["current_state"], "Active");

    for member in [&member_a, &member_b] {
        let (status, vote) = app
            .post(
                &format!("/proposals/{id}/votes"),
                member,
                json!({ "support": 1, "reason": "meets the criteria" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{vote}");
        assert_eq!(vote["weight"], 1);
    }

    let (status, _) = app
        .post(&format!("/proposals/{id}/votes"), &member_a, json!({ "support": 0 }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "second vote must be rejected");

    let (status, _) = app
        .post(&format!("/proposals/{id}/queue"), &member_a, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "voting still open");

    app.clock.advance_blocks(11);
    let (status, resolved) = app
        .post(&format!("/proposals/{id}/resolve"), &member_b, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["state"], "Succeeded");

    let (status, entry) = app
        .post(&format!("/proposals/{id}/queue"), &member_a, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{entry}");
    assert_eq!(entry["status"], "queued");

    let (status, _) = app
        .post(&format!("/proposals/{id}/execute"), &member_a, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "timelock has not elapsed");

    app.clock.advance_secs(100);
    let (status, executed) = app
        .post(&format!("/proposals/{id}/execute"), &member_b, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{executed}");
    assert_eq!(executed["state"], "Executed");

    let (_, eligibility) = app.get(&uri, None).await;
    assert_eq!(eligibility["eligible"], true);
    assert_eq!(eligibility["state"], "accredited");

    let (status, credential) = app
        .post(
            "/credentials",
            &institute,
            json!({ "token_id": 7, "holder": student, "metadata_uri": "ipfs://diploma" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{credential}");

    let (status, credential) = app.get("/credentials/7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(credential["holder"], json!(student));

    let (_, issued) = app.get(&format!("/issuers/{institute}/credentials"), None).await;
    assert_eq!(issued.as_array().unwrap().len(), 1);

    let (_, votes) = app.get(&format!("/proposals/{id}/votes"), None).await;
    assert_eq!(votes.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_authentication_required() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .method("POST")
        .uri("/issuers")
        .header("Content-Type", "application/json")
        .body(Body::from(json!({ "name": "x" }).to_string()))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "authorization");

    let request = Request::builder()
        .uri("/audit")
        .header("Authorization", "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_roles_are_enforced() {
    let app = TestApp::new().await;
    let student = address(0x31);
    let institute = address(0x11);
    app.register(&student, "student", 1).await;
    app.register(&institute, "institute", 1).await;

    // Privileged roles cannot be self-assigned
    let stranger = address(0x41);
    let (status, body) = app
        .post(
            "/accounts",
            &stranger,
            json!({ "address": stranger, "role": "admin", "display_name": "me" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    let (status, _) = app
        .post(&format!("/issuers/{institute}/accredit"), &student, json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post(
            "/proposals",
            &student,
            json!({ "action": { "kind": "RevokeIssuer" }, "target": institute, "description": "no" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/audit", Some(&student)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Direct admin path
    let (status, _) = app
        .post("/issuers", &institute, json!({ "name": "Institute" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, record) = app
        .post(&format!("/issuers/{institute}/accredit"), &app.admin, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{record}");

    let (status, _) = app
        .post(
            &format!("/issuers/{institute}/suspend"),
            &app.admin,
            json!({ "reason": "audit pending" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, eligibility) = app.get(&format!("/issuers/{institute}/eligibility"), None).await;
    assert_eq!(eligibility["eligible"], false);
    assert_eq!(eligibility["state"], "suspended");
}

#[tokio::test]
async fn test_not_found_and_bad_input() {
    let app = TestApp::new().await;

    let unknown = address(0x77);
    let (status, body) = app.get(&format!("/issuers/{unknown}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["retryable"], false);

    let (_, eligibility) = app.get(&format!("/issuers/{unknown}/eligibility"), None).await;
    assert_eq!(eligibility["eligible"], false);
    assert_eq!(eligibility["state"], "unregistered");

    let (status, _) = app.get("/issuers/not-an-address", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get(&format!("/proposals/{}", "ab".repeat(32)), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get("/proposals/xyz", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get("/credentials/42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_voting_weight_management() {
    let app = TestApp::new().await;
    let member = address(0x21);
    app.register(&member, "dao-member", 1).await;

    let (status, account) = app
        .post(
            &format!("/accounts/{member}/weight"),
            &app.admin,
            json!({ "voting_weight": 5 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(account["voting_weight"], 5);

    let (status, account) = app
        .post(&format!("/accounts/{member}/deactivate"), &app.admin, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(account["active"], false);

    // Deactivated members lose their voice
    let (status, _) = app
        .post(
            "/proposals",
            &member,
            json!({
                "action": { "kind": "UpdateParameters", "update": { "quorum": 3 } },
                "description": "raise quorum",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post(&format!("/accounts/{member}/reactivate"), &app.admin, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, proposal) = app
        .post(
            "/proposals",
            &member,
            json!({
                "action": { "kind": "UpdateParameters", "update": { "quorum": 3 } },
                "description": "raise quorum",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{proposal}");

    let (_, listed) = app.get("/proposals?state=Pending", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    let (_, listed) = app.get("/proposals?state=Active", None).await;
    assert!(listed.as_array().unwrap().is_empty());

    let id = proposal["id"].as_str().unwrap();
    let (status, canceled) = app
        .post(&format!("/proposals/{id}/cancel"), &member, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(canceled["state"], "Canceled");

    let (_, params) = app.get("/governance/params", None).await;
    assert_eq!(params["quorum"], 2);
}

#[tokio::test]
async fn test_rate_limit_per_caller() {
    let app = TestApp::with_rate_limit(accredo_server::config::RateLimitSettings {
        max_requests: 2,
        window_secs: 60,
        burst: 0,
    })
    .await;

    for _ in 0..2 {
        let (status, _) = app.get("/audit", Some(&app.admin)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let request = Request::builder()
        .uri("/audit")
        .header("Authorization", format!("Bearer {}", app.token(&app.admin)))
        .body(Body::empty())
        .unwrap();
    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));

    // Unauthenticated reads are not charged
    let (status, _) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_audit_log_records_events() {
    let app = TestApp::new().await;
    app.register(&address(0x21), "dao-member", 1).await;

    let mut entries = Value::Null;
    for _ in 0..50 {
        let (status, body) = app.get("/audit", Some(&app.admin)).await;
        assert_eq!(status, StatusCode::OK);
        if body.as_array().map_or(0, Vec::len) >= 2 {
            entries = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let entries = entries.as_array().expect("audit entries were not recorded");
    assert!(entries
        .iter()
        .all(|e| e["event_type"].as_str().is_some_and(|t| !t.is_empty())));
}

#[tokio::test]
async fn test_restarted_server_keeps_block_height() {
    use accredo_governance::{ParameterStore, Stores};
    use accredo_server::config::ServerConfig;
    use accredo_server::state::AppState;

    let config = ServerConfig {
        jwt_secret: common::JWT_SECRET.to_string(),
        governance: common::test_params(),
        ..ServerConfig::default()
    };
    let stores = Stores::in_memory();
    let genesis = chrono::Utc::now() - chrono::Duration::hours(1);
    stores.parameters.genesis(genesis).await.unwrap();

    let first = AppState::anchored(&config, stores.clone(), None).await.unwrap();
    let height = first.clock.block_number();
    assert!(height >= 299);
    drop(first);

    let second = AppState::anchored(&config, stores, None).await.unwrap();
    assert!(second.clock.block_number() >= height);
}
