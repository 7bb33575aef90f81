//! Shared harness: the real servers on random ports with in-memory stores

#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use tokenkeeper::auth::TokenSigner;
use tokenkeeper::configuration::{JwtSettings, LoginSettings};
use tokenkeeper::credentials::InMemoryCredentialStore;
use tokenkeeper::issuance::TokenService;
use tokenkeeper::remote::{CallPolicy, HttpTokenStore};
use tokenkeeper::startup::{run, run_internal, Services};
use tokenkeeper::token_store::{InMemoryTokenStore, RefreshTokenStore};

pub const MISMATCH_DELAY_MILLIS: u64 = 200;

pub struct TestApp {
    pub address: String,
    pub internal_address: String,
    pub signer: TokenSigner,
    pub token_store: Arc<InMemoryTokenStore>,
    pub api_client: reqwest::Client,
}

pub fn jwt_settings() -> JwtSettings {
    JwtSettings {
        secret: "integration-test-secret-key".to_string(),
        issuer: "tokenkeeper-test".to_string(),
        access_token_expiry: 900,
        refresh_token_expiry: 7_776_000,
    }
}

/// Public and internal addresses of a running instance
pub struct Addresses {
    pub address: String,
    pub internal_address: String,
}

fn bind_random_port() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    (listener, format!("http://127.0.0.1:{}", port))
}

fn spawn_with(
    token_store: Arc<dyn RefreshTokenStore>,
    local_token_store: Option<Arc<dyn RefreshTokenStore>>,
) -> (Addresses, TokenSigner) {
    let (listener, address) = bind_random_port();
    let (internal_listener, internal_address) = bind_random_port();

    let signer = TokenSigner::new(&jwt_settings()).expect("Failed to build signer");
    let services = Services {
        credentials: Arc::new(InMemoryCredentialStore::new()),
        tokens: TokenService::new(signer.clone(), token_store),
        local_token_store,
        login: LoginSettings {
            mismatch_delay_millis: MISMATCH_DELAY_MILLIS,
        },
    };

    let server = run(listener, services.clone()).expect("Failed to bind address");
    let _ = tokio::spawn(server);
    let internal_server =
        run_internal(internal_listener, services).expect("Failed to bind internal address");
    let _ = tokio::spawn(internal_server);

    (
        Addresses {
            address,
            internal_address,
        },
        signer,
    )
}

/// An instance owning its refresh token store
pub fn spawn_app() -> TestApp {
    let token_store = Arc::new(InMemoryTokenStore::new());
    let (addresses, signer) = spawn_with(token_store.clone(), Some(token_store.clone()));

    TestApp {
        address: addresses.address,
        internal_address: addresses.internal_address,
        signer,
        token_store,
        api_client: reqwest::Client::new(),
    }
}

/// An instance whose refresh tokens live on `owner`
pub fn spawn_remote_app(owner: &TestApp) -> Addresses {
    let remote = HttpTokenStore::new(
        owner.internal_address.clone(),
        Duration::from_secs(5),
        CallPolicy::new(1, Duration::from_millis(10)),
    )
    .expect("Failed to build token store client");
    let (addresses, _) = spawn_with(Arc::new(remote), None);
    addresses
}

/// The `r_token` value from a Set-Cookie header, if any
pub fn refresh_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("r_token="))
        .map(str::to_string)
}

pub fn refresh_cookie_value(set_cookie: &str) -> String {
    set_cookie
        .trim_start_matches("r_token=")
        .split(';')
        .next()
        .unwrap_or_default()
        .to_string()
}

impl TestApp {
    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.api_client
            .post(&format!("{}{}", &self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_internal_json(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.api_client
            .post(&format!("{}{}", &self.internal_address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Token pair issued through the internal API
    pub async fn generate(&self, subject_id: i64, groups: &[&str]) -> serde_json::Value {
        let response = self
            .post_internal_json(
                "/auth/generate",
                &serde_json::json!({ "subjectId": subject_id, "groups": groups }),
            )
            .await;
        assert_eq!(200, response.status().as_u16());
        response.json().await.expect("Failed to parse response")
    }

    pub async fn refresh_with_cookie(&self, refresh_token: &str) -> reqwest::Response {
        self.api_client
            .post(&format!("{}/auth/refresh", &self.address))
            .header("Cookie", format!("r_token={}", refresh_token))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Register `username` and return its subject id
    pub async fn register(&self, username: &str, secret: &str) -> i64 {
        let response = self
            .api_client
            .post(&format!("{}/auth/register?no-login=true", &self.address))
            .json(&serde_json::json!({ "username": username, "secret": secret }))
            .send()
            .await
            .expect("Failed to execute request.");
        assert_eq!(200, response.status().as_u16());
        response.text().await.unwrap().parse().unwrap()
    }

    /// Access token for a subject with the given groups
    pub fn access_token(&self, subject_id: i64, groups: &[&str]) -> String {
        let groups = groups.iter().map(|g| g.to_string()).collect();
        self.signer.issue_access(subject_id, &groups).unwrap().token
    }
}
