use std::net::TcpListener;

use base64::Engine as _;
use odo_auth::{AuthChange, AuthError, ClinicBackend, Credentials, RestBackend, TokenStore};
use odo_config::BackendConfig;
use odo_core::ClinicRole;
use pretty_assertions::assert_eq;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ANON_KEY: &str = "anon-key";

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn jwt_expiring_in(secs: i64) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let exp = chrono::Utc::now().timestamp() + secs;
    format!(
        "{}.{}.{}",
        engine.encode(r#"{"alg":"HS256"}"#),
        engine.encode(format!(r#"{{"sub":"user-1","exp":{exp}}}"#)),
        engine.encode("sig")
    )
}

fn config(url: &str) -> BackendConfig {
    BackendConfig {
        url: url.to_string(),
        anon_key: ANON_KEY.to_string(),
        timeout_secs: 5,
    }
}

/// Backend with stored credentials whose access token is `access_token`.
fn signed_in_backend(server: &MockServer, tmp: &TempDir, access_token: &str) -> RestBackend {
    let tokens = TokenStore::file_only(tmp.path().join("credentials"));
    tokens
        .store(&Credentials {
            access_token: SecretString::from(access_token.to_string()),
            refresh_token: SecretString::from("refresh-1"),
        })
        .expect("seed credentials");
    RestBackend::new(&config(&server.uri()), tokens).expect("backend")
}

fn token_response(access_token: &str, refresh_token: &str) -> serde_json::Value {
    json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
        "token_type": "bearer",
        "expires_in": 3600,
        "user": {
            "id": "user-1",
            "email": "ana@example.com",
            "user_metadata": {"first_name": "Ana", "last_name": "Ruiz"}
        }
    })
}

#[test]
fn missing_backend_config_is_rejected() {
    let tmp = TempDir::new().expect("tmp dir");
    let result = RestBackend::new(
        &BackendConfig::default(),
        TokenStore::file_only(tmp.path().join("credentials")),
    );
    assert!(matches!(result, Err(AuthError::Config(_))));
}

#[tokio::test]
async fn password_sign_in_stores_credentials() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    let access_token = jwt_expiring_in(3600);

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", ANON_KEY))
        .and(body_json(json!({"email": "ana@example.com", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response(&access_token, "refresh-1")))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = TempDir::new().expect("tmp dir");
    let tokens = TokenStore::file_only(tmp.path().join("credentials"));
    let backend = RestBackend::new(&config(&server.uri()), tokens.clone()).expect("backend");

    let identity = backend
        .sign_in_with_password("ana@example.com", &SecretString::from("secret"))
        .await
        .expect("sign in");

    assert_eq!(identity.id, "user-1");
    assert_eq!(identity.display_name, "Ana Ruiz");
    assert!(backend.has_credentials().await);
    let stored = tokens.load().expect("stored credentials");
    assert_eq!(stored.access_token.expose_secret(), access_token.as_str());
}

#[tokio::test]
async fn rejected_password_is_invalid_credentials() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .mount(&server)
        .await;

    let tmp = TempDir::new().expect("tmp dir");
    let backend = RestBackend::new(
        &config(&server.uri()),
        TokenStore::file_only(tmp.path().join("credentials")),
    )
    .expect("backend");

    let result = backend
        .sign_in_with_password("ana@example.com", &SecretString::from("wrong"))
        .await;
    assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    assert!(!backend.has_credentials().await);
}

#[tokio::test]
async fn unreachable_backend_is_network_error() {
    // Bind then drop to get a local port with nothing listening.
    let Ok(listener) = TcpListener::bind("127.0.0.1:0") else {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    };
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    let tmp = TempDir::new().expect("tmp dir");
    let backend = RestBackend::new(
        &config(&format!("http://127.0.0.1:{port}")),
        TokenStore::file_only(tmp.path().join("credentials")),
    )
    .expect("backend");

    let result = backend
        .sign_in_with_password("ana@example.com", &SecretString::from("secret"))
        .await;
    assert!(matches!(result, Err(AuthError::Network(_))));
}

#[tokio::test]
async fn memberships_skip_unknown_roles() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    let access_token = jwt_expiring_in(3600);

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/list_user_clinics"))
        .and(header("apikey", ANON_KEY))
        .and(header("authorization", format!("Bearer {access_token}").as_str()))
        .and(body_json(json!({"p_user_id": "user-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"clinic_id": "c1", "clinic_name": "Clinic One", "role": "admin", "provider_id": null},
            {"clinic_id": "c2", "clinic_name": "Clinic Two", "role": "Provider", "provider_id": "p-7"},
            {"clinic_id": "c3", "clinic_name": "Clinic Three", "role": "owner"}
        ])))
        .mount(&server)
        .await;

    let tmp = TempDir::new().expect("tmp dir");
    let backend = signed_in_backend(&server, &tmp, &access_token);

    let memberships = backend
        .list_memberships_for_user("user-1")
        .await
        .expect("memberships");

    assert_eq!(memberships.len(), 2);
    assert_eq!(memberships[0].role, ClinicRole::Admin);
    assert_eq!(memberships[1].role, ClinicRole::Provider);
    assert_eq!(memberships[1].provider_id.as_deref(), Some("p-7"));
}

#[tokio::test]
async fn current_clinic_reads_scalar_or_null() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/get_current_clinic_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("c1")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/get_current_clinic_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(null)))
        .mount(&server)
        .await;

    let tmp = TempDir::new().expect("tmp dir");
    let backend = signed_in_backend(&server, &tmp, &jwt_expiring_in(3600));

    assert_eq!(
        backend.get_current_active_clinic().await.expect("first"),
        Some("c1".to_string())
    );
    assert_eq!(backend.get_current_active_clinic().await.expect("second"), None);
}

#[tokio::test]
async fn establish_maps_denials_and_failures() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/establish_clinic_session"))
        .and(body_json(json!({"p_clinic_id": "c1", "p_duration_hours": 8})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("scope-abc")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/establish_clinic_session"))
        .and(body_json(json!({"p_clinic_id": "c3", "p_duration_hours": 8})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "P0001",
            "message": "user is not a member of this clinic"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/establish_clinic_session"))
        .and(body_json(json!({"p_clinic_id": "c4", "p_duration_hours": 8})))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "JWT expired"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/establish_clinic_session"))
        .and(body_json(json!({"p_clinic_id": "c5", "p_duration_hours": 8})))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let tmp = TempDir::new().expect("tmp dir");
    let backend = signed_in_backend(&server, &tmp, &jwt_expiring_in(3600));

    let token = backend.establish_active_clinic("c1", 8).await.expect("c1");
    assert_eq!(token.0, "scope-abc");

    match backend.establish_active_clinic("c3", 8).await {
        Err(AuthError::AccessDenied(message)) => {
            assert_eq!(message, "user is not a member of this clinic");
        }
        other => panic!("expected access denied, got {other:?}"),
    }
    assert!(matches!(
        backend.establish_active_clinic("c4", 8).await,
        Err(AuthError::Unauthorized)
    ));
    match backend.establish_active_clinic("c5", 8).await {
        Err(AuthError::Http { status, message }) => {
            assert_eq!(status, 503);
            assert_eq!(message, "upstream unavailable");
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn rpc_without_credentials_is_unauthorized() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    let tmp = TempDir::new().expect("tmp dir");
    let backend = RestBackend::new(
        &config(&server.uri()),
        TokenStore::file_only(tmp.path().join("credentials")),
    )
    .expect("backend");

    assert!(matches!(
        backend.get_current_active_clinic().await,
        Err(AuthError::Unauthorized)
    ));
}

#[tokio::test]
async fn expiring_token_is_refreshed_before_the_call() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    let fresh = jwt_expiring_in(3600);

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_json(json!({"refresh_token": "refresh-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response(&fresh, "refresh-2")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/get_current_clinic_id"))
        .and(header("authorization", format!("Bearer {fresh}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("c1")))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = TempDir::new().expect("tmp dir");
    let backend = signed_in_backend(&server, &tmp, &jwt_expiring_in(10));
    let mut changes = backend.auth_changes();

    let current = backend.get_current_active_clinic().await.expect("call");

    assert_eq!(current.as_deref(), Some("c1"));
    assert_eq!(changes.try_recv().expect("change"), AuthChange::TokenRefreshed);
    let stored = TokenStore::file_only(tmp.path().join("credentials"))
        .load()
        .expect("stored");
    assert_eq!(stored.refresh_token.expose_secret(), "refresh-2");
}

#[tokio::test]
async fn rejected_refresh_signs_out() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Refresh Token Not Found"
        })))
        .mount(&server)
        .await;

    let tmp = TempDir::new().expect("tmp dir");
    let backend = signed_in_backend(&server, &tmp, &jwt_expiring_in(-30));
    let mut changes = backend.auth_changes();

    assert!(matches!(
        backend.list_memberships_for_user("user-1").await,
        Err(AuthError::Unauthorized)
    ));
    assert_eq!(changes.try_recv().expect("change"), AuthChange::SignedOut);
    assert!(!backend.has_credentials().await);
    assert!(!tmp.path().join("credentials").exists());
}

#[tokio::test]
async fn restore_checks_user_endpoint() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    let access_token = jwt_expiring_in(3600);

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", format!("Bearer {access_token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "user-1",
            "email": "ana@example.com",
            "user_metadata": {"first_name": "Ana"}
        })))
        .mount(&server)
        .await;

    let tmp = TempDir::new().expect("tmp dir");
    let backend = signed_in_backend(&server, &tmp, &access_token);

    let identity = backend.restore_session().await.expect("restore");
    assert_eq!(identity.map(|i| i.display_name), Some("Ana".to_string()));
}

#[tokio::test]
async fn restore_with_revoked_token_forgets_credentials() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"msg": "invalid JWT"})))
        .mount(&server)
        .await;

    let tmp = TempDir::new().expect("tmp dir");
    let backend = signed_in_backend(&server, &tmp, &jwt_expiring_in(3600));

    assert_eq!(backend.restore_session().await.expect("restore"), None);
    assert!(!backend.has_credentials().await);
    assert!(!tmp.path().join("credentials").exists());
}

#[tokio::test]
async fn restore_without_credentials_skips_the_network() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let tmp = TempDir::new().expect("tmp dir");
    let backend = RestBackend::new(
        &config(&server.uri()),
        TokenStore::file_only(tmp.path().join("credentials")),
    )
    .expect("backend");

    assert_eq!(backend.restore_session().await.expect("restore"), None);
}

#[tokio::test]
async fn sign_out_forgets_credentials_even_when_token_is_stale() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/expire_user_sessions"))
        .and(body_json(json!({"p_user_id": "user-1"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = TempDir::new().expect("tmp dir");
    let backend = signed_in_backend(&server, &tmp, &jwt_expiring_in(3600));

    backend
        .expire_session_records("user-1")
        .await
        .expect("expire");
    backend.sign_out().await.expect("sign out");

    assert!(!backend.has_credentials().await);
    assert!(!tmp.path().join("credentials").exists());
}
