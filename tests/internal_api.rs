//! Service-to-service APIs and the remote refresh token store

mod common;

use std::time::Duration;

use common::{refresh_cookie, refresh_cookie_value, spawn_app, spawn_remote_app};
use serde_json::{json, Value};
use tokenkeeper::remote::{CallPolicy, HttpTokenStore};
use tokenkeeper::token_store::{RefreshTokenEntry, RefreshTokenStore};

fn entry(subject_id: i64, token_hash: &str, expires_in_secs: i64) -> RefreshTokenEntry {
    RefreshTokenEntry {
        subject_id,
        token_hash: token_hash.to_string(),
        groups: ["g1".to_string()].into_iter().collect(),
        expires_at: chrono::Utc::now() + chrono::Duration::seconds(expires_in_secs),
    }
}

// --- Listener separation ---

#[tokio::test]
async fn internal_routes_are_not_served_publicly() {
    let app = spawn_app();
    let client = &app.api_client;
    app.register("mallory", "s3cret").await;

    let find = client
        .get(&format!("{}/credentials/mallory", app.address))
        .send()
        .await
        .unwrap();
    let groups = client
        .put(&format!("{}/credentials/1/groups", app.address))
        .json(&json!(["ROLE_ADMIN"]))
        .send()
        .await
        .unwrap();
    let put = client
        .put(&format!("{}/tokens", app.address))
        .json(&entry(1, "abc", 3600))
        .send()
        .await
        .unwrap();
    let pop = client
        .get(&format!("{}/tokens/1?token-hash=abc", app.address))
        .send()
        .await
        .unwrap();

    for response in [find, groups, put, pop] {
        assert_eq!(404, response.status().as_u16());
    }

    // the groups were not touched
    let body: Value = client
        .get(&format!("{}/credentials/mallory", app.internal_address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["groups"], json!([]));
}

// --- /credentials ---

#[tokio::test]
async fn credentials_lifecycle() {
    let app = spawn_app();
    let client = &app.api_client;

    let response = app
        .post_internal_json(
            "/credentials",
            &json!({ "username": "alice", "secretHash": "$2b$10$hash" }),
        )
        .await;
    assert_eq!(200, response.status().as_u16());
    let id: i64 = response.text().await.unwrap().parse().unwrap();

    let response = app
        .post_internal_json(
            "/credentials",
            &json!({ "username": "alice", "secretHash": "$2b$10$other" }),
        )
        .await;
    assert_eq!(409, response.status().as_u16());

    let response = client
        .get(&format!("{}/credentials/alice", app.internal_address))
        .send()
        .await
        .unwrap();
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], id);
    assert_eq!(body["secretHash"], "$2b$10$hash");
    assert_eq!(body["groups"], json!([]));

    let response = client
        .put(&format!("{}/credentials/{}/groups", app.internal_address, id))
        .json(&json!(["g1", "g2"]))
        .send()
        .await
        .unwrap();
    assert_eq!(204, response.status().as_u16());

    let response = client
        .put(&format!("{}/credentials/{}/username", app.internal_address, id))
        .body("alice2")
        .send()
        .await
        .unwrap();
    assert_eq!(204, response.status().as_u16());

    let body: Value = client
        .get(&format!("{}/credentials/alice2", app.internal_address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["groups"], json!(["g1", "g2"]));

    let response = client
        .delete(&format!("{}/credentials/{}", app.internal_address, id))
        .send()
        .await
        .unwrap();
    assert_eq!(204, response.status().as_u16());

    let response = client
        .get(&format!("{}/credentials/alice2", app.internal_address))
        .send()
        .await
        .unwrap();
    assert_eq!(404, response.status().as_u16());
}

#[tokio::test]
async fn credential_updates_on_unknown_id_are_not_found() {
    let app = spawn_app();
    let client = &app.api_client;

    let secret = client
        .put(&format!("{}/credentials/404/secret", app.internal_address))
        .body("$2b$10$hash")
        .send()
        .await
        .unwrap();
    let delete = client
        .delete(&format!("{}/credentials/404", app.internal_address))
        .send()
        .await
        .unwrap();

    assert_eq!(404, secret.status().as_u16());
    assert_eq!(404, delete.status().as_u16());
}

// --- /tokens ---

#[tokio::test]
async fn token_api_pops_once() {
    let app = spawn_app();
    let client = &app.api_client;

    let response = client
        .put(&format!("{}/tokens", app.internal_address))
        .json(&entry(42, "abc", 3600))
        .send()
        .await
        .unwrap();
    assert_eq!(204, response.status().as_u16());

    let address = app.internal_address.as_str();
    let pop = || async move {
        client
            .get(&format!("{}/tokens/42?token-hash=abc", address))
            .send()
            .await
            .unwrap()
    };

    let first = pop().await;
    assert_eq!(200, first.status().as_u16());
    let groups: Value = first.json().await.unwrap();
    assert_eq!(groups, json!(["g1"]));

    assert_eq!(404, pop().await.status().as_u16());
}

#[tokio::test]
async fn token_api_validates_input() {
    let app = spawn_app();
    let client = &app.api_client;

    let empty_hash = client
        .put(&format!("{}/tokens", app.internal_address))
        .json(&entry(42, "", 3600))
        .send()
        .await
        .unwrap();
    let missing_query = client
        .get(&format!("{}/tokens/42", app.internal_address))
        .send()
        .await
        .unwrap();

    assert_eq!(400, empty_hash.status().as_u16());
    assert_eq!(400, missing_query.status().as_u16());
}

#[tokio::test]
async fn token_api_deletes_and_sweeps() {
    let app = spawn_app();
    let client = &app.api_client;
    for e in [entry(42, "a", 3600), entry(42, "b", 3600), entry(7, "old", -10)] {
        app.token_store.put(&e).await.unwrap();
    }

    let swept = client
        .delete(&format!("{}/tokens/expired", app.internal_address))
        .send()
        .await
        .unwrap();
    assert_eq!(200, swept.status().as_u16());
    assert_eq!(swept.text().await.unwrap(), "1");

    let deleted = client
        .delete(&format!("{}/tokens/42", app.internal_address))
        .send()
        .await
        .unwrap();
    assert_eq!(200, deleted.status().as_u16());
    assert_eq!(deleted.text().await.unwrap(), "2");
}

// --- Remote store ---

#[tokio::test]
async fn http_token_store_honours_the_store_contract() {
    let owner = spawn_app();
    let store = HttpTokenStore::new(
        owner.internal_address.clone(),
        Duration::from_secs(5),
        CallPolicy::new(1, Duration::from_millis(10)),
    )
    .unwrap();

    assert!(store.put(&entry(42, "live", 3600)).await.unwrap());
    assert!(store.put(&entry(42, "other", 3600)).await.unwrap());
    assert!(store.put(&entry(9, "old", -5)).await.unwrap());

    assert_eq!(store.pop_groups(9, "old").await.unwrap(), None);
    assert!(store.pop_groups(42, "live").await.unwrap().is_some());
    assert_eq!(store.pop_groups(42, "live").await.unwrap(), None);

    assert_eq!(store.delete_for_subject(42).await.unwrap(), 1);
    assert_eq!(store.sweep_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn rotation_through_a_remote_store() {
    let owner = spawn_app();
    let remote = spawn_remote_app(&owner);
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/auth/generate", remote.internal_address))
        .json(&json!({ "subjectId": 42, "groups": ["g1"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    let original = body["refreshToken"].as_str().unwrap().to_string();

    let refresh = |token: String| {
        let client = client.clone();
        let url = format!("{}/auth/refresh", remote.address);
        async move {
            client
                .post(&url)
                .header("Cookie", format!("r_token={}", token))
                .send()
                .await
                .unwrap()
        }
    };

    let response = refresh(original.clone()).await;
    assert_eq!(200, response.status().as_u16());
    let rotated = refresh_cookie_value(&refresh_cookie(&response).unwrap());

    assert_eq!(401, refresh(original).await.status().as_u16());
    assert_eq!(200, refresh(rotated).await.status().as_u16());

    // the remote instance does not serve /tokens itself
    let response = client
        .delete(&format!("{}/tokens/expired", remote.internal_address))
        .send()
        .await
        .unwrap();
    assert_eq!(404, response.status().as_u16());
}
