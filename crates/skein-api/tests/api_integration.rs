//! API integration tests.
//!
//! Tests the complete request flow: HTTP → routes → catalog → entity store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use skein_api::config::{Config, CorsConfig};
use skein_api::server::{Server, ServerBuilder};

const MAINTENANCE_SECRET: &str = "maint-secret";

fn test_router() -> axum::Router {
    ServerBuilder::new()
        .jwt_hs256_secret("test-jwt-secret")
        .credential_pepper("test-pepper")
        .maintenance_secret(MAINTENANCE_SECRET)
        .orphan_grace_secs(0)
        .build()
        .test_router()
}

mod helpers {
    use super::*;

    pub struct Call<'a> {
        pub method: Method,
        pub uri: &'a str,
        pub token: Option<&'a str>,
        pub body: Option<Value>,
    }

    pub async fn send(router: &axum::Router, call: Call<'_>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder()
            .method(call.method)
            .uri(call.uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = call.token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match call.body {
            Some(v) => Body::from(serde_json::to_vec(&v).context("serialize request body")?),
            None => Body::empty(),
        };
        let request = builder.body(body).context("build request")?;

        let response = router
            .clone()
            .oneshot(request)
            .await
            .map_err(|err| -> anyhow::Error { match err {} })?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .context("read response body")?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Ok((status, value))
    }

    pub async fn get(router: &axum::Router, uri: &str) -> Result<(StatusCode, Value)> {
        send(
            router,
            Call {
                method: Method::GET,
                uri,
                token: None,
                body: None,
            },
        )
        .await
    }

    pub async fn post(
        router: &axum::Router,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> Result<(StatusCode, Value)> {
        send(
            router,
            Call {
                method: Method::POST,
                uri,
                token,
                body: Some(body),
            },
        )
        .await
    }

    pub async fn put(
        router: &axum::Router,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> Result<(StatusCode, Value)> {
        send(
            router,
            Call {
                method: Method::PUT,
                uri,
                token,
                body: Some(body),
            },
        )
        .await
    }

    pub async fn delete(
        router: &axum::Router,
        uri: &str,
        token: Option<&str>,
    ) -> Result<(StatusCode, Value)> {
        send(
            router,
            Call {
                method: Method::DELETE,
                uri,
                token,
                body: None,
            },
        )
        .await
    }

    /// Registers an author and returns `(author_id, token)`.
    pub async fn register(router: &axum::Router, handle: &str) -> Result<(String, String)> {
        let (status, body) = post(
            router,
            "/api/v1/authors",
            None,
            json!({ "handle": handle, "secret": "long-enough-secret" }),
        )
        .await?;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let id = body["author"]["id"].as_str().context("author id")?.to_string();
        let token = body["token"].as_str().context("token")?.to_string();
        Ok((id, token))
    }

    pub async fn create_listing(router: &axum::Router, token: &str) -> Result<String> {
        let (status, body) = post(
            router,
            "/api/v1/listings",
            Some(token),
            json!({
                "name": "Malabrigo Rios",
                "color": "Azul Profundo",
                "weight": "worsted",
                "brand": "Malabrigo",
                "hook_size": "5mm",
                "needle_size": "4.5mm",
                "materials": ["merino"],
            }),
        )
        .await?;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        Ok(body["id"].as_str().context("listing id")?.to_string())
    }

    pub async fn create_review(
        router: &axum::Router,
        token: &str,
        listing_id: &str,
        rating: i64,
    ) -> Result<(StatusCode, Value)> {
        post(
            router,
            "/api/v1/reviews",
            Some(token),
            json!({ "listing_id": listing_id, "content": "Lovely yarn", "rating": rating }),
        )
        .await
    }

    pub fn average(listing: &Value) -> f64 {
        listing["average_rating"].as_f64().unwrap()
    }
}

use helpers::*;

#[tokio::test]
async fn review_lifecycle_keeps_average_exact() -> Result<()> {
    let router = test_router();
    let (_, alice) = register(&router, "alice").await?;
    let (_, bob) = register(&router, "bob").await?;
    let listing_id = create_listing(&router, &alice).await?;
    let listing_uri = format!("/api/v1/listings/{listing_id}");

    let (_, listing) = get(&router, &listing_uri).await?;
    assert!(average(&listing).abs() < f64::EPSILON);

    let (status, r1) = create_review(&router, &alice, &listing_id, 4).await?;
    assert_eq!(status, StatusCode::CREATED);
    let r1_id = r1["id"].as_str().unwrap().to_string();
    let (_, listing) = get(&router, &listing_uri).await?;
    assert!((average(&listing) - 4.0).abs() < 1e-9);

    let (_, r2) = create_review(&router, &bob, &listing_id, 2).await?;
    let r2_id = r2["id"].as_str().unwrap().to_string();
    let (_, listing) = get(&router, &listing_uri).await?;
    assert!((average(&listing) - 3.0).abs() < 1e-9);

    let (status, edited) = put(
        &router,
        &format!("/api/v1/reviews/{r1_id}"),
        Some(&alice),
        json!({ "rating": 5 }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["rating"], 5);
    assert_eq!(edited["content"], "Lovely yarn");
    let (_, listing) = get(&router, &listing_uri).await?;
    assert!((average(&listing) - 3.5).abs() < 1e-9);

    let (status, _) = delete(&router, &format!("/api/v1/reviews/{r2_id}"), Some(&bob)).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, listing) = get(&router, &listing_uri).await?;
    assert!((average(&listing) - 5.0).abs() < 1e-9);
    assert_eq!(listing["review_refs"], json!([r1_id]));

    let (status, reviews) = get(&router, &format!("{listing_uri}/reviews")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reviews["reviews"].as_array().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn writes_require_a_token() -> Result<()> {
    let router = test_router();
    let (status, body) = post(
        &router,
        "/api/v1/listings",
        None,
        json!({ "name": "x", "color": "x", "weight": "x", "hook_size": "x", "needle_size": "x", "materials": ["x"] }),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");
    Ok(())
}

#[tokio::test]
async fn invalid_token_is_rejected_even_on_reads() -> Result<()> {
    let router = test_router();
    let (status, body) = send(
        &router,
        Call {
            method: Method::GET,
            uri: "/api/v1/listings",
            token: Some("not-a-token"),
            body: None,
        },
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");
    Ok(())
}

#[tokio::test]
async fn stranger_cannot_edit_or_delete() -> Result<()> {
    let router = test_router();
    let (_, alice) = register(&router, "alice").await?;
    let (_, mallory) = register(&router, "mallory").await?;
    let listing_id = create_listing(&router, &alice).await?;
    let (_, review) = create_review(&router, &alice, &listing_id, 4).await?;
    let review_uri = format!("/api/v1/reviews/{}", review["id"].as_str().unwrap());

    let (status, body) = put(&router, &review_uri, Some(&mallory), json!({ "rating": 1 })).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = delete(&router, &review_uri, Some(&mallory)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, stored) = get(&router, &review_uri).await?;
    assert_eq!(stored["rating"], 4);
    Ok(())
}

#[tokio::test]
async fn out_of_range_rating_is_a_validation_failure() -> Result<()> {
    let router = test_router();
    let (_, alice) = register(&router, "alice").await?;
    let listing_id = create_listing(&router, &alice).await?;

    for rating in [0, 6] {
        let (status, body) = create_review(&router, &alice, &listing_id, rating).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");
    }

    let (_, listing) = get(&router, &format!("/api/v1/listings/{listing_id}")).await?;
    assert_eq!(listing["review_refs"], json!([]));
    Ok(())
}

#[tokio::test]
async fn malformed_bodies_are_validation_failures() -> Result<()> {
    let router = test_router();
    let (_, alice) = register(&router, "alice").await?;
    let listing_id = create_listing(&router, &alice).await?;

    let bodies = [
        json!({ "listing_id": "not-a-ulid", "content": "Lovely yarn", "rating": 4 }),
        json!({ "listing_id": listing_id, "content": "Lovely yarn", "rating": 4.5 }),
        json!({ "listing_id": listing_id, "rating": 4 }),
    ];
    for body in bodies {
        let (status, error) = post(&router, "/api/v1/reviews", Some(&alice), body).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{error}");
        assert_eq!(error["code"], "VALIDATION_FAILED");
        assert!(error["requestId"].is_string());
    }

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/reviews")
        .header(header::AUTHORIZATION, format!("Bearer {alice}"))
        .body(Body::from(r#"{"listing_id":"x","content":"y","rating":3}"#))?;
    let response = router.clone().oneshot(request).await.map_err(|err| -> anyhow::Error { match err {} })?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().contains_key("x-request-id"));

    let (_, listing) = get(&router, &format!("/api/v1/listings/{listing_id}")).await?;
    assert_eq!(listing["review_refs"], json!([]));
    Ok(())
}

#[tokio::test]
async fn handle_rules_and_conflicts() -> Result<()> {
    let router = test_router();
    let (status, body) = post(
        &router,
        "/api/v1/authors",
        None,
        json!({ "handle": "bob!", "secret": "long-enough-secret" }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    register(&router, "bob").await?;
    let (status, body) = post(
        &router,
        "/api/v1/authors",
        None,
        json!({ "handle": "bob", "secret": "another-secret" }),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
    Ok(())
}

#[tokio::test]
async fn login_issues_working_token() -> Result<()> {
    let router = test_router();
    let (author_id, _) = register(&router, "carol").await?;

    let (status, body) = post(
        &router,
        "/api/v1/sessions",
        None,
        json!({ "handle": "carol", "secret": "wrong-secret-value" }),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let wrong_secret_message = body["message"].clone();

    let (status, body) = post(
        &router,
        "/api/v1/sessions",
        None,
        json!({ "handle": "nobody", "secret": "wrong-secret-value" }),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], wrong_secret_message);

    let (status, body) = post(
        &router,
        "/api/v1/sessions",
        None,
        json!({ "handle": "carol", "secret": "long-enough-secret" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["author_id"], author_id.as_str());
    let token = body["token"].as_str().unwrap();

    let listing_id = create_listing(&router, token).await?;
    assert!(!listing_id.is_empty());
    Ok(())
}

#[tokio::test]
async fn author_profile_hides_credential_and_updates() -> Result<()> {
    let router = test_router();
    let (author_id, token) = register(&router, "dana").await?;
    let (_, other) = register(&router, "erin").await?;
    let author_uri = format!("/api/v1/authors/{author_id}");

    let (status, profile) = get(&router, &author_uri).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["handle"], "dana");
    assert!(profile.get("credential").is_none());

    let (status, _) = put(&router, &author_uri, Some(&other), json!({ "handle": "dana2" })).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = put(&router, &author_uri, Some(&token), json!({ "handle": "erin" })).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, profile) =
        put(&router, &author_uri, Some(&token), json!({ "handle": "dana2" })).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["handle"], "dana2");
    Ok(())
}

#[tokio::test]
async fn unknown_and_malformed_ids() -> Result<()> {
    let router = test_router();
    let (status, body) = get(&router, "/api/v1/reviews/not-a-ulid").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let (status, body) = get(&router, "/api/v1/listings/01J0000000000000000000000A").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn listing_summaries_count_reviews() -> Result<()> {
    let router = test_router();
    let (_, alice) = register(&router, "alice").await?;
    let listing_id = create_listing(&router, &alice).await?;
    create_review(&router, &alice, &listing_id, 3).await?;

    let (status, body) = get(&router, "/api/v1/listings").await?;
    assert_eq!(status, StatusCode::OK);
    let listings = body["listings"].as_array().unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0]["review_count"], 1);
    assert!((listings[0]["average_rating"].as_f64().unwrap() - 3.0).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn listings_filter_by_owner() -> Result<()> {
    let router = test_router();
    let (alice_id, alice) = register(&router, "alice").await?;
    let (_, bob) = register(&router, "bob").await?;
    let mine = create_listing(&router, &alice).await?;
    create_listing(&router, &bob).await?;

    let (status, body) = get(&router, &format!("/api/v1/listings?owner={alice_id}")).await?;
    assert_eq!(status, StatusCode::OK);
    let listings = body["listings"].as_array().unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0]["id"], mine.as_str());

    let (status, body) = get(&router, "/api/v1/listings?owner=garbage").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
    Ok(())
}

#[tokio::test]
async fn maintenance_requires_secret() -> Result<()> {
    let router = test_router();
    let (status, _) = get(&router, "/api/v1/maintenance/consistency").await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/v1/maintenance/consistency")
        .header("X-Maintenance-Secret", MAINTENANCE_SECRET)
        .body(Body::empty())?;
    let response = router.clone().oneshot(request).await.map_err(|err| -> anyhow::Error { match err {} })?;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await?;
    let report: Value = serde_json::from_slice(&bytes)?;
    assert_eq!(report["issues"], json!([]));
    Ok(())
}

#[tokio::test]
async fn maintenance_disabled_without_secret() -> Result<()> {
    let router = ServerBuilder::new().debug(true).build().test_router();
    let (status, _) = get(&router, "/api/v1/maintenance/consistency").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn responses_carry_request_id() -> Result<()> {
    let router = test_router();
    let request = Request::builder()
        .uri("/api/v1/listings")
        .header("X-Request-Id", "trace-me-123")
        .body(Body::empty())?;
    let response = router.oneshot(request).await.map_err(|err| -> anyhow::Error { match err {} })?;
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("trace-me-123")
    );
    Ok(())
}

#[tokio::test]
async fn cors_preflight_with_allowed_origin() -> Result<()> {
    let config = Config {
        debug: true,
        cors: CorsConfig {
            allowed_origins: vec!["https://yarn.example".to_string()],
            max_age_seconds: 600,
        },
        ..Config::default()
    };
    let router = Server::new(config).test_router();

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/listings")
        .header(header::ORIGIN, "https://yarn.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())?;
    let response = router.oneshot(request).await.map_err(|err| -> anyhow::Error { match err {} })?;
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("https://yarn.example")
    );
    Ok(())
}
