//! Common test utilities for E2E tests

#![allow(dead_code)]

use authgate::{AppState, config};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const FRONTEND_URL: &str = "http://frontend.test:3000";
pub const FAILURE_URL: &str = "http://frontend.test:3000/login";

/// A handshake started with `GET /auth/{provider}`
#[derive(Debug, Clone)]
pub struct PendingLogin {
    /// `state` query parameter sent to the provider
    pub state: String,
    /// `oauth_state=...` cookie pair
    pub cookie: String,
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
    /// Stands in for all three providers
    pub provider: MockServer,
}

fn provider_credentials(provider_uri: &str, name: &str) -> config::ProviderCredentials {
    config::ProviderCredentials {
        client_id: format!("{name}-client-id"),
        client_secret: format!("{name}-client-secret"),
        authorize_url: Some(format!("{provider_uri}/{name}/authorize")),
        token_url: Some(format!("{provider_uri}/{name}/token")),
        profile_url: Some(format!("{provider_uri}/{name}/profile")),
    }
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server after adjusting the default test configuration
    pub async fn with_config(adjust: impl FnOnce(&mut config::AppConfig)) -> Self {
        let provider = MockServer::start().await;

        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let mut config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                public_url: Some("http://authgate.test".to_string()),
            },
            database: config::DatabaseConfig {
                url: format!("sqlite://{}?mode=rwc", db_path.display()),
            },
            frontend: config::FrontendConfig {
                url: FRONTEND_URL.to_string(),
                failure_path: "/login".to_string(),
            },
            session: config::SessionConfig {
                secret: "test-secret-key-32-bytes-long!!!".to_string(),
                max_age: 604800,
                secure: true,
                same_site: config::SameSitePolicy::None,
                cleanup_interval_seconds: 3600,
            },
            providers: config::ProvidersConfig {
                google: Some(provider_credentials(&provider.uri(), "google")),
                twitter: Some(provider_credentials(&provider.uri(), "twitter")),
                github: Some(provider_credentials(&provider.uri(), "github")),
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };
        adjust(&mut config);

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Redirects are asserted on, never followed
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = authgate::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
            provider,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Make the mock provider accept any code and return `profile`
    pub async fn mock_provider(&self, provider: &str, profile: Value) {
        let access_token = format!("{provider}-access-token");

        Mock::given(method("POST"))
            .and(path(format!("/{provider}/token")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": access_token,
                "token_type": "bearer",
            })))
            .mount(&self.provider)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("/{provider}/profile")))
            .and(header("authorization", format!("Bearer {access_token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile))
            .mount(&self.provider)
            .await;
    }

    /// `GET /auth/{provider}` and capture the handshake state
    pub async fn begin_login(&self, provider: &str) -> PendingLogin {
        let response = self
            .client
            .get(self.url(&format!("/auth/{provider}")))
            .send()
            .await
            .expect("request succeeds");
        assert_eq!(response.status(), 302);

        let location = location(&response).expect("location header");
        let state = url::Url::parse(&location)
            .expect("absolute provider URL")
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .expect("state parameter");
        let cookie = cookie_pair(&response, "oauth_state").expect("oauth_state cookie");

        PendingLogin { state, cookie }
    }

    /// Return from the provider to `GET /auth/{provider}/callback`
    pub async fn callback(&self, provider: &str, pending: &PendingLogin) -> reqwest::Response {
        self.client
            .get(self.url(&format!(
                "/auth/{provider}/callback?code=test-code&state={}",
                pending.state
            )))
            .header("Cookie", &pending.cookie)
            .send()
            .await
            .expect("request succeeds")
    }

    /// Full login; returns the `session=...` cookie pair
    pub async fn login(&self, provider: &str, profile: Value) -> String {
        self.mock_provider(provider, profile).await;
        let pending = self.begin_login(provider).await;
        let response = self.callback(provider, &pending).await;

        assert_eq!(response.status(), 302);
        assert_eq!(location(&response).as_deref(), Some(FRONTEND_URL));
        cookie_pair(&response, "session").expect("session cookie")
    }

    /// `GET /getuser`; `None` when the body is empty
    pub async fn get_user(&self, cookie: Option<&str>) -> Option<Value> {
        let mut request = self.client.get(self.url("/getuser"));
        if let Some(cookie) = cookie {
            request = request.header("Cookie", cookie);
        }

        let response = request.send().await.expect("request succeeds");
        assert_eq!(response.status(), 200);

        let body = response.text().await.expect("response body");
        if body.is_empty() {
            None
        } else {
            Some(serde_json::from_str(&body).expect("user JSON"))
        }
    }

    /// Number of stored users
    pub async fn user_count(&self) -> i64 {
        self.state.db.count_users().await.unwrap()
    }
}

/// `Location` header of a response
pub fn location(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

/// The `name=value` pair of a non-empty `Set-Cookie` for `name`
pub fn cookie_pair(response: &reqwest::Response, name: &str) -> Option<String> {
    set_cookie_headers(response).into_iter().find_map(|raw| {
        let pair = raw.split(';').next()?.trim().to_string();
        let (cookie_name, value) = pair.split_once('=')?;
        (cookie_name == name && !value.is_empty()).then_some(pair)
    })
}

/// All `Set-Cookie` header values of a response
pub fn set_cookie_headers(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok().map(ToString::to_string))
        .collect()
}
