//! HTTP API tests driving the router against an in-memory SurrealDB.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http_body_util::BodyExt;
use idmsvc_server::{AppState, Config, bootstrap, create_router};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

const ORG: &str = "12345";
const BASE: &str = "/api/idmsvc/v1";

struct TestApp {
    state: Arc<AppState>,
    router: Router,
}

async fn setup() -> TestApp {
    let mut config = Config::default();
    config.database.url = "mem://".into();
    config.web.size_limit_request_body = 16 * 1024;
    config.web.size_limit_request_header = 4 * 1024;
    let state = bootstrap(&config).await.unwrap();
    state.service.keys().refresh().await.unwrap();
    let router = create_router(Arc::clone(&state), &config.web);
    TestApp { state, router }
}

fn user_identity(org_id: &str) -> String {
    STANDARD.encode(
        json!({"identity": {"org_id": org_id, "type": "User", "user": {"username": "admin"}}})
            .to_string(),
    )
}

fn system_identity(org_id: &str, cn: Uuid) -> String {
    STANDARD.encode(
        json!({"identity": {
            "org_id": org_id,
            "type": "System",
            "system": {"cn": cn.to_string(), "cert_type": "system"}
        }})
        .to_string(),
    )
}

fn domain_body(domain_name: &str, server_cn: Uuid) -> Value {
    json!({
        "domain_name": domain_name,
        "domain_type": "rhel-idm",
        "rhel-idm": {
            "realm_name": domain_name.to_ascii_uppercase(),
            "realm_domains": [domain_name],
            "ca_certs": [{
                "nickname": "IPA CA",
                "issuer": "CN=Certificate Authority",
                "subject": "CN=Certificate Authority",
                "serial_number": "1",
                "not_before": "2024-01-01T00:00:00Z",
                "not_after": "2044-01-01T00:00:00Z",
                "pem": "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n"
            }],
            "servers": [{
                "fqdn": format!("s1.{domain_name}"),
                "subscription_manager_id": server_cn,
                "location": null,
                "ca_server": true,
                "hcc_enrollment_server": true,
                "hcc_update_server": true,
                "pkinit_server": true
            }],
            "locations": []
        }
    })
}

async fn send(
    app: &TestApp,
    method: Method,
    path: &str,
    headers: &[(&str, String)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(format!("{BASE}{path}"));
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Mint a token, register as `server_cn` and enable auto-enrollment.
async fn register(app: &TestApp, domain_name: &str, server_cn: Uuid) -> String {
    let (status, token) = send(
        app,
        Method::POST,
        "/domains/token",
        &[("x-rh-identity", user_identity(ORG))],
        Some(json!({"domain_type": "rhel-idm"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{token}");

    let (status, domain) = send(
        app,
        Method::POST,
        "/domains",
        &[
            ("x-rh-identity", system_identity(ORG, server_cn)),
            (
                "x-rh-idm-registration-token",
                token["domain_token"].as_str().unwrap().to_string(),
            ),
        ],
        Some(domain_body(domain_name, server_cn)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{domain}");
    assert_eq!(domain["domain_id"], token["domain_id"]);

    let domain_id = domain["domain_id"].as_str().unwrap().to_string();
    let (status, patched) = send(
        app,
        Method::PATCH,
        &format!("/domains/{domain_id}"),
        &[("x-rh-identity", user_identity(ORG))],
        Some(json!({"auto_enrollment_enabled": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{patched}");
    assert_eq!(patched["auto_enrollment_enabled"], true);
    domain_id
}

fn assert_envelope(body: &Value, status: StatusCode) {
    let errors = body["errors"].as_array().expect("error envelope");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["status"], status.as_u16().to_string());
    assert!(errors[0]["title"].is_string());
}

#[tokio::test]
async fn register_then_issue_host_conf() {
    let app = setup().await;
    let server_cn = Uuid::new_v4();
    let domain_id = register(&app, "ipa.test", server_cn).await;

    let host_cn = Uuid::new_v4();
    let inventory_id = Uuid::new_v4();
    let (status, conf) = send(
        &app,
        Method::POST,
        &format!("/host-conf/{inventory_id}/client.ipa.test"),
        &[("x-rh-identity", system_identity(ORG, host_cn))],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{conf}");
    assert_eq!(conf["domain_id"], domain_id.as_str());
    assert_eq!(conf["domain_name"], "ipa.test");
    assert_eq!(conf["domain_type"], "rhel-idm");
    assert_eq!(conf["auto_enrollment_enabled"], true);
    assert_eq!(conf["rhel-idm"]["realm_name"], "IPA.TEST");
    assert!(
        conf["rhel-idm"]["cabundle"]
            .as_str()
            .unwrap()
            .starts_with("-----BEGIN CERTIFICATE-----")
    );
    assert_eq!(
        conf["rhel-idm"]["enrollment_servers"],
        json!([{"fqdn": "s1.ipa.test"}])
    );

    let jws: Value = serde_json::from_str(conf["token"].as_str().unwrap()).unwrap();
    assert_eq!(jws["signatures"].as_array().unwrap().len(), 1);

    let (status, keys) = send(&app, Method::GET, "/signing_keys", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(keys["keys"].as_array().unwrap().len(), 1);
    assert!(keys.get("revoked_kids").is_none());
}

#[tokio::test]
async fn host_conf_accepts_hints_in_body() {
    let app = setup().await;
    let first = register(&app, "ipa.test", Uuid::new_v4()).await;
    register(&app, "idm.test", Uuid::new_v4()).await;
    let host = system_identity(ORG, Uuid::new_v4());
    let path = format!("/host-conf/{}/client.ipa.test", Uuid::new_v4());

    let (status, body) = send(
        &app,
        Method::POST,
        &path,
        &[("x-rh-identity", host.clone())],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_envelope(&body, StatusCode::CONFLICT);

    let (status, conf) = send(
        &app,
        Method::POST,
        &path,
        &[("x-rh-identity", host)],
        Some(json!({"domain_id": first})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{conf}");
    assert_eq!(conf["domain_id"], first.as_str());
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let app = setup().await;
    let (status, body) = send(&app, Method::GET, "/domains", &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_envelope(&body, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bad_registration_token_is_unauthorized_without_detail() {
    let app = setup().await;
    let server_cn = Uuid::new_v4();
    let (status, body) = send(
        &app,
        Method::POST,
        "/domains",
        &[
            ("x-rh-identity", system_identity(ORG, server_cn)),
            ("x-rh-idm-registration-token", "AAAAAAAAAAA.AAAA".into()),
        ],
        Some(domain_body("ipa.test", server_cn)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_envelope(&body, StatusCode::UNAUTHORIZED);
    assert_eq!(body["errors"][0]["title"], "token invalid");
    assert!(body["errors"][0].get("detail").is_none());
}

#[tokio::test]
async fn list_read_and_delete() {
    let app = setup().await;
    let domain_id = register(&app, "ipa.test", Uuid::new_v4()).await;
    let user = [("x-rh-identity", user_identity(ORG))];

    let (status, page) = send(&app, Method::GET, "/domains?limit=5", &user, None).await;
    assert_eq!(status, StatusCode::OK, "{page}");
    assert_eq!(page["meta"], json!({"count": 1, "offset": 0, "limit": 5}));
    assert_eq!(page["data"][0]["domain_id"], domain_id.as_str());

    let (status, _) = send(&app, Method::GET, "/domains?offset=1", &user, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, domain) = send(
        &app,
        Method::GET,
        &format!("/domains/{domain_id}"),
        &user,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(domain["title"], "ipa.test");
    assert_eq!(domain["rhel-idm"]["realm_name"], "IPA.TEST");

    let (status, body) = send(
        &app,
        Method::DELETE,
        &format!("/domains/{domain_id}"),
        &user,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/domains/{domain_id}"),
        &user,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_envelope(&body, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn other_tenant_cannot_read_domain() {
    let app = setup().await;
    let domain_id = register(&app, "ipa.test", Uuid::new_v4()).await;
    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/domains/{domain_id}"),
        &[("x-rh-identity", user_identity("67890"))],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn agent_update_by_unlisted_server_is_forbidden() {
    let app = setup().await;
    let domain_id = register(&app, "ipa.test", Uuid::new_v4()).await;
    let intruder = Uuid::new_v4();

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/domains/{domain_id}"),
        &[("x-rh-identity", system_identity(ORG, intruder))],
        Some(domain_body("ipa.test", intruder)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    assert_envelope(&body, StatusCode::FORBIDDEN);
}

async fn register_body(app: &TestApp, server_cn: Uuid, body: Value) -> (StatusCode, Value) {
    let (_, token) = send(
        app,
        Method::POST,
        "/domains/token",
        &[("x-rh-identity", user_identity(ORG))],
        Some(json!({"domain_type": "rhel-idm"})),
    )
    .await;
    send(
        app,
        Method::POST,
        "/domains",
        &[
            ("x-rh-identity", system_identity(ORG, server_cn)),
            (
                "x-rh-idm-registration-token",
                token["domain_token"].as_str().unwrap().to_string(),
            ),
        ],
        Some(body),
    )
    .await
}

#[tokio::test]
async fn realm_payload_uses_hyphenated_key() {
    let app = setup().await;
    let cn = Uuid::new_v4();
    let mut body = domain_body("ipa.test", cn);
    let realm = body.as_object_mut().unwrap().remove("rhel-idm").unwrap();
    body["rhel_idm"] = realm;

    let (status, err) = register_body(&app, cn, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{err}");
    assert_envelope(&err, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn repeated_subscription_manager_id_conflicts() {
    let app = setup().await;
    let cn = Uuid::new_v4();
    let mut body = domain_body("ipa.test", cn);
    let mut second = body["rhel-idm"]["servers"][0].clone();
    second["fqdn"] = json!("s2.ipa.test");
    body["rhel-idm"]["servers"].as_array_mut().unwrap().push(second);

    let (status, err) = register_body(&app, cn, body).await;
    assert_eq!(status, StatusCode::CONFLICT, "{err}");
    assert_envelope(&err, StatusCode::CONFLICT);
}

#[tokio::test]
async fn malformed_requests_are_bad_requests() {
    let app = setup().await;
    let user = [("x-rh-identity", user_identity(ORG))];

    let (status, body) = send(&app, Method::GET, "/domains/not-a-uuid", &user, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_envelope(&body, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/domains/{}", Uuid::new_v4()),
        &user,
        Some(json!({"domain_name": "renamed.test"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/domains/token",
        &user,
        Some(json!({"domain_type": "active-directory"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::GET,
        "/domains",
        &[("x-rh-identity", "%%%".into())],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_requests_are_rejected() {
    let app = setup().await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/domains/token",
        &[("x-rh-identity", user_identity(ORG))],
        Some(json!({"domain_type": "rhel-idm", "padding": "x".repeat(32 * 1024)})),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let (status, _) = send(
        &app,
        Method::GET,
        "/signing_keys",
        &[("x-padding", "y".repeat(8 * 1024))],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE);
}

#[tokio::test]
async fn revoked_key_is_published_by_id() {
    let app = setup().await;
    let keys = app.state.service.keys().list().await.unwrap();
    assert_eq!(keys.len(), 1);
    app.state
        .service
        .keys()
        .revoke(&keys[0].key_id)
        .await
        .unwrap();

    let (status, body) = send(&app, Method::GET, "/signing_keys", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["keys"], json!([]));
    assert_eq!(
        body["revoked_kids"],
        Value::from(vec![keys[0].key_id.clone()])
    );
}
