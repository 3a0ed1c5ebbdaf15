//! E2E tests for the OAuth login flows

mod common;

use common::{FAILURE_URL, FRONTEND_URL, TestServer, cookie_pair, location};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

// =============================================================================
// Initiation
// =============================================================================

#[tokio::test]
async fn test_google_login_redirects_with_profile_scope() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/auth/google"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 302);
    let location = location(&response).unwrap();
    assert!(location.starts_with(&format!("{}/google/authorize?", server.provider.uri())));
    assert_eq!(query_param(&location, "scope").as_deref(), Some("profile"));
    assert_eq!(
        query_param(&location, "client_id").as_deref(),
        Some("google-client-id")
    );
    assert_eq!(
        query_param(&location, "redirect_uri").as_deref(),
        Some("http://authgate.test/auth/google/callback")
    );
    assert_eq!(
        query_param(&location, "code_challenge_method").as_deref(),
        Some("S256")
    );
    assert!(query_param(&location, "state").is_some());
    assert!(query_param(&location, "code_challenge").is_some());
    assert!(cookie_pair(&response, "oauth_state").is_some());
}

#[tokio::test]
async fn test_github_login_redirects_without_scope() {
    let server = TestServer::new().await;

    let pending = server.begin_login("github").await;
    assert!(!pending.state.is_empty());

    let response = server
        .client
        .get(server.url("/auth/github"))
        .send()
        .await
        .unwrap();
    let location = location(&response).unwrap();
    assert!(location.starts_with(&format!("{}/github/authorize?", server.provider.uri())));
    assert_eq!(query_param(&location, "scope"), None);
}

#[tokio::test]
async fn test_twitter_login_redirects_with_read_scopes() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/auth/twitter"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 302);
    let location = location(&response).unwrap();
    assert_eq!(
        query_param(&location, "scope").as_deref(),
        Some("users.read tweet.read")
    );
    assert_eq!(
        query_param(&location, "client_id").as_deref(),
        Some("twitter-client-id")
    );
}

#[tokio::test]
async fn test_each_login_gets_fresh_state() {
    let server = TestServer::new().await;

    let first = server.begin_login("google").await;
    let second = server.begin_login("google").await;

    assert_ne!(first.state, second.state);
    assert_ne!(first.cookie, second.cookie);
}

#[tokio::test]
async fn test_unknown_provider_is_404() {
    let server = TestServer::new().await;

    for path in ["/auth/myspace", "/auth/myspace/callback?code=x&state=y"] {
        let response = server.client.get(server.url(path)).send().await.unwrap();
        assert_eq!(response.status(), 404, "{path}");
    }
}

#[tokio::test]
async fn test_unconfigured_provider_is_404() {
    let server = TestServer::with_config(|config| {
        config.providers.twitter = None;
    })
    .await;

    let response = server
        .client
        .get(server.url("/auth/twitter"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // Other providers are unaffected
    let pending = server.begin_login("google").await;
    assert!(!pending.state.is_empty());
}

// =============================================================================
// Callback failures
// =============================================================================

async fn assert_failure_redirect(response: reqwest::Response) {
    assert_eq!(response.status(), 302);
    assert_eq!(location(&response).as_deref(), Some(FAILURE_URL));
    assert!(cookie_pair(&response, "session").is_none());
}

#[tokio::test]
async fn test_callback_without_state_cookie_fails() {
    let server = TestServer::new().await;
    server
        .mock_provider("google", json!({"sub": "g1", "given_name": "Ann"}))
        .await;
    let pending = server.begin_login("google").await;

    let response = server
        .client
        .get(server.url(&format!(
            "/auth/google/callback?code=test-code&state={}",
            pending.state
        )))
        .send()
        .await
        .unwrap();

    assert_failure_redirect(response).await;
    assert_eq!(server.user_count().await, 0);
}

#[tokio::test]
async fn test_callback_with_provider_error_fails() {
    let server = TestServer::new().await;
    let pending = server.begin_login("github").await;

    let response = server
        .client
        .get(server.url(&format!(
            "/auth/github/callback?error=access_denied&state={}",
            pending.state
        )))
        .header("Cookie", &pending.cookie)
        .send()
        .await
        .unwrap();

    assert_failure_redirect(response).await;
}

#[tokio::test]
async fn test_callback_with_mismatched_state_fails() {
    let server = TestServer::new().await;
    server
        .mock_provider("github", json!({"id": 1, "login": "octocat"}))
        .await;
    let mut pending = server.begin_login("github").await;
    pending.state = "forged-state".to_string();

    let response = server.callback("github", &pending).await;

    assert_failure_redirect(response).await;
    assert_eq!(server.user_count().await, 0);
}

#[tokio::test]
async fn test_callback_for_other_provider_fails() {
    let server = TestServer::new().await;
    server
        .mock_provider("github", json!({"id": 1, "login": "octocat"}))
        .await;
    let pending = server.begin_login("google").await;

    let response = server.callback("github", &pending).await;

    assert_failure_redirect(response).await;
}

#[tokio::test]
async fn test_callback_with_rejected_code_fails() {
    let server = TestServer::new().await;
    Mock::given(method("POST"))
        .and(path("/google/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Bad code"
        })))
        .mount(&server.provider)
        .await;
    let pending = server.begin_login("google").await;

    let response = server.callback("google", &pending).await;

    assert_failure_redirect(response).await;
    assert_eq!(server.user_count().await, 0);
}

#[tokio::test]
async fn test_callback_with_unreadable_profile_fails() {
    let server = TestServer::new().await;
    // Google profile without a subject
    server
        .mock_provider("google", json!({"given_name": "Ann"}))
        .await;
    let pending = server.begin_login("google").await;

    let response = server.callback("google", &pending).await;

    assert_failure_redirect(response).await;
}

#[tokio::test]
async fn test_callback_with_store_failure_is_500() {
    let server = TestServer::new().await;
    server
        .mock_provider("google", json!({"sub": "g1", "given_name": "Ann"}))
        .await;
    let pending = server.begin_login("google").await;

    sqlx::query("DROP TABLE users")
        .execute(server.state.db.pool())
        .await
        .unwrap();

    let response = server.callback("google", &pending).await;

    assert_eq!(response.status(), 500);
    assert!(cookie_pair(&response, "session").is_none());
    let state_cleared = common::set_cookie_headers(&response)
        .into_iter()
        .any(|raw| raw.starts_with("oauth_state=") && raw.contains("Max-Age=0"));
    assert!(state_cleared);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}

// =============================================================================
// Identity resolution
// =============================================================================

#[tokio::test]
async fn test_google_login_creates_user() {
    let server = TestServer::new().await;

    let cookie = server
        .login("google", json!({"sub": "g1", "given_name": "Ann", "name": "Ann Lee"}))
        .await;

    let user = server.get_user(Some(&cookie)).await.unwrap();
    assert_eq!(user["googleId"], "g1");
    assert_eq!(user["username"], "Ann");
    assert!(user.get("twitterId").is_none());
    assert!(user.get("githubId").is_none());
    assert_eq!(server.user_count().await, 1);
}

#[tokio::test]
async fn test_twitter_login_creates_user() {
    let server = TestServer::new().await;

    let cookie = server
        .login(
            "twitter",
            json!({"data": {"id": "t42", "username": "jack", "name": "Jack"}}),
        )
        .await;

    let user = server.get_user(Some(&cookie)).await.unwrap();
    assert_eq!(user["twitterId"], "t42");
    assert_eq!(user["username"], "jack");
    assert!(user.get("googleId").is_none());
}

#[tokio::test]
async fn test_github_login_creates_user() {
    let server = TestServer::new().await;

    let cookie = server
        .login("github", json!({"id": 583231, "login": "octocat", "name": null}))
        .await;

    let user = server.get_user(Some(&cookie)).await.unwrap();
    assert_eq!(user["githubId"], "583231");
    assert_eq!(user["username"], "octocat");
}

#[tokio::test]
async fn test_repeat_login_reuses_user() {
    let server = TestServer::new().await;
    let profile = json!({"id": 9, "login": "returning"});

    let first = server.login("github", profile.clone()).await;
    let second = server.login("github", profile).await;

    assert_ne!(first, second);
    let first_user = server.get_user(Some(&first)).await.unwrap();
    let second_user = server.get_user(Some(&second)).await.unwrap();
    assert_eq!(first_user["id"], second_user["id"]);
    assert_eq!(server.user_count().await, 1);
}

#[tokio::test]
async fn test_same_external_id_on_different_providers_is_two_users() {
    let server = TestServer::new().await;

    let google = server
        .login("google", json!({"sub": "1", "given_name": "Same"}))
        .await;
    let github = server
        .login("github", json!({"id": 1, "login": "same"}))
        .await;

    let google_user = server.get_user(Some(&google)).await.unwrap();
    let github_user = server.get_user(Some(&github)).await.unwrap();
    assert_ne!(google_user["id"], github_user["id"]);
    assert_eq!(server.user_count().await, 2);
}

#[tokio::test]
async fn test_concurrent_first_logins_create_one_user() {
    let server = TestServer::new().await;
    server
        .mock_provider("google", json!({"sub": "race", "given_name": "Racer"}))
        .await;

    let mut pending = Vec::new();
    for _ in 0..8 {
        pending.push(server.begin_login("google").await);
    }

    let responses =
        futures::future::join_all(pending.iter().map(|p| server.callback("google", p))).await;

    let mut ids = Vec::new();
    for response in responses {
        assert_eq!(response.status(), 302);
        assert_eq!(location(&response).as_deref(), Some(FRONTEND_URL));
        let cookie = cookie_pair(&response, "session").unwrap();
        let user = server.get_user(Some(&cookie)).await.unwrap();
        ids.push(user["id"].clone());
    }

    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(server.user_count().await, 1);
}

#[tokio::test]
async fn test_state_cookie_is_cleared_after_callback() {
    let server = TestServer::new().await;
    server
        .mock_provider("github", json!({"id": 3, "login": "clean"}))
        .await;
    let pending = server.begin_login("github").await;

    let response = server.callback("github", &pending).await;

    let cleared = common::set_cookie_headers(&response)
        .into_iter()
        .any(|raw| raw.starts_with("oauth_state=") && raw.contains("Max-Age=0"));
    assert!(cleared);
}
