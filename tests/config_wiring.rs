//! The gateway as the binary wires it: collaborators built from a TOML
//! config, users from `[[users]]`, CRM and document server over HTTP.

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use docs_gateway::collaborators::Collaborators;
use docs_gateway::config::loader::parse_config;
use docs_gateway::{HttpServer, Shutdown};

mod common;
use common::{config_path, context_token, APP_SECRET, ADMIN, MEMBER, TENANT};

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// CRM and document server stand-ins on one port.
async fn upstream() -> String {
    let router = Router::new()
        .route(
            "/api/v1/users/me",
            get(|headers: HeaderMap| async move {
                let id = match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                    Some("Bearer token-1") => 1,
                    _ => 2,
                };
                Json(json!({
                    "success": true,
                    "data": {
                        "id": id,
                        "company_id": 42,
                        "name": format!("User {id}"),
                        "language": { "language_code": "en", "country_code": "US" },
                        "access": [{ "app": "global", "admin": id == 1 }]
                    }
                }))
            }),
        )
        .route(
            "/api/v2/deals/{id}",
            get(|| async { Json(json!({ "success": true, "data": { "id": 15, "title": "Renewal" } })) }),
        )
        .route(
            "/coauthoring/CommandService.ashx",
            post(|| async { Json(json!({ "error": 0 })) }),
        );
    serve(router).await
}

fn gateway_toml(upstream: &str) -> String {
    format!(
        r#"
        [auth]
        app_secret = "{APP_SECRET}"

        [editor]
        gateway_url = "https://gateway.example.com"
        callback_url = "https://gateway.example.com"

        [[users]]
        tenant_id = {TENANT}
        user_id = {ADMIN}
        access_token = "token-1"
        api_domain = "{upstream}"

        [[users]]
        tenant_id = {TENANT}
        user_id = {MEMBER}
        access_token = "token-2"
        api_domain = "{upstream}"
        "#
    )
}

#[tokio::test]
async fn test_configured_users_reach_every_endpoint() {
    let upstream = upstream().await;
    let config = parse_config(&gateway_toml(&upstream)).unwrap();

    let collaborators = Collaborators::from_config(&config).unwrap();
    let server = HttpServer::new(config, collaborators).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let shutdown = Shutdown::new();
    tokio::spawn(server.run(listener, shutdown.subscribe()));

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let as_user = |user: u64, method: reqwest::Method, path: &str| {
        client
            .request(method, format!("{base}{path}"))
            .header("x-app-context", context_token(user, TENANT))
    };

    let res = as_user(ADMIN, reqwest::Method::POST, "/api/settings")
        .json(&json!({
            "doc_address": upstream,
            "doc_secret": "server-secret",
            "doc_header": "Authorization",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);

    let res = as_user(MEMBER, reqwest::Method::GET, &config_path("3"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["editorConfig"]["user"]["id"], format!("{TENANT}:{MEMBER}"));
    let code = body["accessCode"].as_str().unwrap().to_string();

    let res = as_user(MEMBER, reqwest::Method::GET, &format!("/api/data?code={code}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let redeemed: Value = res.json().await.unwrap();
    assert_eq!(redeemed["data"]["title"], "Renewal");

    let res = as_user(7, reqwest::Method::GET, &config_path("3"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404, "users outside [[users]] are unknown");

    shutdown.trigger();
}
