use std::io::Write;

use axum::http::{header, HeaderValue, StatusCode};
use axum_test::TestServer;
use base64::{engine::general_purpose::STANDARD, Engine};
use internal_acme_dns::api::{create_router, AppState, ChallengeRequest};
use internal_acme_dns::store::ValidationStore;
use tempfile::NamedTempFile;

const CREDENTIALS: &str = r#"
[api_keys.certbot]
key = "s3cret"
domains = ["*.internal.example.com"]

[api_keys.nodomains]
key = "nothing"
"#;

struct Harness {
    server: TestServer,
    store: ValidationStore,
    config: NamedTempFile,
}

fn setup() -> Harness {
    let mut config = NamedTempFile::new().expect("Failed to create config file");
    config
        .write_all(CREDENTIALS.as_bytes())
        .expect("Failed to write config file");

    let store = ValidationStore::new();
    let app = create_router(AppState::new(store.clone(), config.path()));
    let server = TestServer::new(app).expect("Failed to create test server");
    Harness {
        server,
        store,
        config,
    }
}

fn basic(credentials: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Basic {}", STANDARD.encode(credentials))).unwrap()
}

fn challenge(fqdn: &str, value: &str) -> ChallengeRequest {
    ChallengeRequest {
        fqdn: fqdn.to_string(),
        value: value.to_string(),
    }
}

const FQDN: &str = "_acme-challenge.host.internal.example.com.";

mod present {
    use super::*;

    #[tokio::test]
    async fn stores_the_value() {
        let h = setup();

        let response = h
            .server
            .post("/present")
            .add_header(header::AUTHORIZATION, basic("certbot:s3cret"))
            .json(&challenge(FQDN, "token-1"))
            .await;

        response.assert_status_ok();
        assert_eq!(h.store.lookup(FQDN), vec!["token-1"]);
    }

    #[tokio::test]
    async fn keeps_multiple_values_for_one_name() {
        let h = setup();

        for value in ["wildcard", "apex"] {
            h.server
                .post("/present")
                .add_header(header::AUTHORIZATION, basic("certbot:s3cret"))
                .json(&challenge(FQDN, value))
                .await
                .assert_status_ok();
        }

        assert_eq!(h.store.lookup(FQDN), vec!["wildcard", "apex"]);
    }

    #[tokio::test]
    async fn rejects_domains_outside_the_key_patterns() {
        let h = setup();

        let response = h
            .server
            .post("/present")
            .add_header(header::AUTHORIZATION, basic("certbot:s3cret"))
            .json(&challenge("_acme-challenge.host.example.org.", "token"))
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.text(),
            "This API key is not allowed to request that domain"
        );
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn key_without_domains_is_rejected() {
        let h = setup();

        let response = h
            .server
            .post("/present")
            .add_header(header::AUTHORIZATION, basic("nodomains:nothing"))
            .json(&challenge(FQDN, "token"))
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        assert!(h.store.is_empty());
    }
}

mod cleanup {
    use super::*;

    #[tokio::test]
    async fn removes_only_the_given_value() {
        let h = setup();
        h.store.present(FQDN, "wildcard");
        h.store.present(FQDN, "apex");

        h.server
            .post("/cleanup")
            .add_header(header::AUTHORIZATION, basic("certbot:s3cret"))
            .json(&challenge(FQDN, "wildcard"))
            .await
            .assert_status_ok();

        assert_eq!(h.store.lookup(FQDN), vec!["apex"]);
    }

    #[tokio::test]
    async fn unknown_record_is_not_an_error() {
        let h = setup();

        h.server
            .post("/cleanup")
            .add_header(header::AUTHORIZATION, basic("certbot:s3cret"))
            .json(&challenge(FQDN, "never-presented"))
            .await
            .assert_status_ok();
    }
}

mod authentication {
    use super::*;

    async fn rejected_with(h: &Harness, authorization: Option<HeaderValue>, message: &str) {
        let mut request = h.server.post("/present").json(&challenge(FQDN, "token"));
        if let Some(value) = authorization {
            request = request.add_header(header::AUTHORIZATION, value);
        }
        let response = request.await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.text(), message);
        assert_eq!(
            response.header(header::WWW_AUTHENTICATE),
            r#"Basic realm="internal-acme-dns""#
        );
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn missing_header() {
        let h = setup();
        rejected_with(&h, None, "No Authorization header passed").await;
    }

    #[tokio::test]
    async fn header_without_scheme() {
        let h = setup();
        let value = HeaderValue::from_static("justonetoken");
        rejected_with(&h, Some(value), "Invalid Authorization header").await;
    }

    #[tokio::test]
    async fn bearer_scheme() {
        let h = setup();
        let value = HeaderValue::from_static("Bearer s3cret");
        rejected_with(&h, Some(value), "Non-basic auth authorization attempted").await;
    }

    #[tokio::test]
    async fn wrong_secret() {
        let h = setup();
        rejected_with(&h, Some(basic("certbot:wrong")), "Invalid basic auth credentials").await;
    }

    #[tokio::test]
    async fn unknown_key() {
        let h = setup();
        rejected_with(&h, Some(basic("stranger:s3cret")), "Invalid basic auth credentials").await;
    }

    #[tokio::test]
    async fn credentials_without_colon() {
        let h = setup();
        rejected_with(&h, Some(basic("certbot")), "Invalid basic auth credentials").await;
    }

    #[tokio::test]
    async fn auth_is_checked_before_the_body() {
        let h = setup();

        let response = h.server.post("/present").text("{not json").await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.text(), "No Authorization header passed");
    }
}

mod request_body {
    use super::*;

    #[tokio::test]
    async fn invalid_json_is_bad_request() {
        let h = setup();

        let response = h
            .server
            .post("/present")
            .add_header(header::AUTHORIZATION, basic("certbot:s3cret"))
            .text("{not json")
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.text(), "Could not decode JSON");
    }

    #[tokio::test]
    async fn missing_value_is_bad_request() {
        let h = setup();

        let response = h
            .server
            .post("/present")
            .add_header(header::AUTHORIZATION, basic("certbot:s3cret"))
            .json(&serde_json::json!({ "fqdn": FQDN }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            response.text(),
            "Missing at least one of the fqdn/value keyvals"
        );
    }
}

mod configuration {
    use super::*;

    #[tokio::test]
    async fn edits_apply_without_restart() {
        let h = setup();

        std::fs::write(
            h.config.path(),
            r#"
            [api_keys.certbot]
            key = "rotated"
            domains = ["*.internal.example.com"]
            "#,
        )
        .expect("Failed to rewrite config");

        h.server
            .post("/present")
            .add_header(header::AUTHORIZATION, basic("certbot:s3cret"))
            .json(&challenge(FQDN, "token"))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        h.server
            .post("/present")
            .add_header(header::AUTHORIZATION, basic("certbot:rotated"))
            .json(&challenge(FQDN, "token"))
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn unparsable_config_is_internal_error() {
        let h = setup();
        std::fs::write(h.config.path(), "[api_keys.certbot\nkey = ").expect("Failed to rewrite config");

        let response = h
            .server
            .post("/present")
            .add_header(header::AUTHORIZATION, basic("certbot:s3cret"))
            .json(&challenge(FQDN, "token"))
            .await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.text(), "Internal server error");
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn entry_without_secret_only_locks_out_itself() {
        let h = setup();
        std::fs::write(
            h.config.path(),
            r#"
            [api_keys.broken]
            domains = ["*.internal.example.com"]

            [api_keys.certbot]
            key = "s3cret"
            domains = ["*.internal.example.com"]
            "#,
        )
        .expect("Failed to rewrite config");

        let response = h
            .server
            .post("/present")
            .add_header(header::AUTHORIZATION, basic("broken:"))
            .json(&challenge(FQDN, "token"))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.text(), "Invalid basic auth credentials");

        h.server
            .post("/present")
            .add_header(header::AUTHORIZATION, basic("certbot:s3cret"))
            .json(&challenge(FQDN, "token"))
            .await
            .assert_status_ok();
        assert_eq!(h.store.lookup(FQDN), vec!["token"]);
    }

    #[tokio::test]
    async fn unreadable_config_is_internal_error() {
        let h = setup();
        let app = create_router(AppState::new(h.store.clone(), "/nonexistent/config.toml"));
        let server = TestServer::new(app).expect("Failed to create test server");

        let response = server
            .post("/present")
            .add_header(header::AUTHORIZATION, basic("certbot:s3cret"))
            .json(&challenge(FQDN, "token"))
            .await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.text(), "Internal server error");
    }
}

mod routing {
    use super::*;

    #[tokio::test]
    async fn health_reports_validation_count() {
        let h = setup();
        h.store.present(FQDN, "token");

        let response = h.server.get("/health").await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["validations"], 1);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let h = setup();

        h.server
            .post("/remove")
            .add_header(header::AUTHORIZATION, basic("certbot:s3cret"))
            .json(&challenge(FQDN, "token"))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_on_present_is_method_not_allowed() {
        let h = setup();

        h.server
            .get("/present")
            .await
            .assert_status(StatusCode::METHOD_NOT_ALLOWED);
    }
}
