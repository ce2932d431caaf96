#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use terko_shop::{
    app_router,
    auth::{hash_password, user},
    config::AppConfig,
    db::{self, DbConfig},
    entities::{commerce::category, product},
    events::{self, EventSender},
    services::commerce::product_catalog_service::{CategoryInput, ProductInput},
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const SHOPPER_PASSWORD: &str = "harbour-lights-42";
pub const STAFF_PASSWORD: &str = "lantern-keeper-77";

/// Helper harness running the real router over a private in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub shopper: user::Model,
    pub staff: user::Model,
    shopper_token: String,
    staff_token: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "test_secret_key_for_testing_purposes_only_with_enough_length_0123456789".to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );

        let pool = db::establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), cfg, EventSender::new(event_tx));

        let shopper = seed_user(&state, "shopper", "shopper@example.com", SHOPPER_PASSWORD, false).await;
        let staff = seed_user(&state, "manager", "manager@example.com", STAFF_PASSWORD, true).await;

        let shopper_token = state
            .auth
            .generate_token(&shopper)
            .expect("shopper token")
            .access_token;
        let staff_token = state
            .auth
            .generate_token(&staff)
            .expect("staff token")
            .access_token;

        Self {
            router: app_router(state.clone()),
            state,
            shopper,
            staff,
            shopper_token,
            staff_token,
            _event_task: event_task,
        }
    }

    pub fn shopper_token(&self) -> &str {
        &self.shopper_token
    }

    pub fn staff_token(&self) -> &str {
        &self.staff_token
    }

    /// Registers one more shopper and returns it with a bearer token.
    pub async fn another_shopper(&self, username: &str) -> (user::Model, String) {
        let user = seed_user(
            &self.state,
            username,
            &format!("{}@example.com", username),
            SHOPPER_PASSWORD,
            false,
        )
        .await;
        let token = self
            .state
            .auth
            .generate_token(&user)
            .expect("token for extra shopper")
            .access_token;
        (user, token)
    }

    /// Send a request with an optional bearer token and extra headers.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Body>,
        content_type: Option<&str>,
        token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", tok));
        }
        if let Some(ct) = content_type {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let request = builder
            .body(body.unwrap_or_else(Body::empty))
            .expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        self.send(Method::GET, uri, None, None, token, &[]).await
    }

    /// Form post as a browser would send it.
    pub async fn post_form(&self, uri: &str, fields: &[(&str, &str)], token: Option<&str>) -> Response {
        self.send(
            Method::POST,
            uri,
            Some(Body::from(encode_form(fields))),
            Some("application/x-www-form-urlencoded"),
            token,
            &[],
        )
        .await
    }

    /// Form post flagged as XHR, answered with JSON instead of a redirect.
    pub async fn post_form_ajax(
        &self,
        uri: &str,
        fields: &[(&str, &str)],
        token: Option<&str>,
    ) -> Response {
        self.send(
            Method::POST,
            uri,
            Some(Body::from(encode_form(fields))),
            Some("application/x-www-form-urlencoded"),
            token,
            &[("x-requested-with", "XMLHttpRequest")],
        )
        .await
    }

    pub async fn send_json(&self, method: Method, uri: &str, json: &Value, token: Option<&str>) -> Response {
        self.send(
            method,
            uri,
            Some(Body::from(serde_json::to_vec(json).expect("serialize json body"))),
            Some("application/json"),
            token,
            &[],
        )
        .await
    }

    pub async fn seed_category(&self, name: &str, slug: &str) -> category::Model {
        self.state
            .services
            .product_catalog
            .create_category(CategoryInput {
                name: name.to_string(),
                slug: slug.to_string(),
                description: None,
                image: None,
            })
            .await
            .expect("seed category")
    }

    /// Seeds an active product; SQLite keeps decimals as REAL so stick to whole prices.
    pub async fn seed_product(
        &self,
        category_id: Uuid,
        name: &str,
        slug: &str,
        price: Decimal,
        stock: i32,
    ) -> product::Model {
        self.state
            .services
            .product_catalog
            .create_product(ProductInput {
                name: name.to_string(),
                slug: slug.to_string(),
                description: Some(format!("{} for integration tests", name)),
                category_id,
                price,
                discount_price: None,
                stock,
                image: None,
                is_active: Some(true),
                is_featured: Some(false),
            })
            .await
            .expect("seed product")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

async fn seed_user(
    state: &AppState,
    username: &str,
    email: &str,
    password: &str,
    is_staff: bool,
) -> user::Model {
    let now = Utc::now();
    user::ActiveModel {
        id: Set(Uuid::new_v4()),
        username: Set(username.to_string()),
        email: Set(email.to_string()),
        password_hash: Set(hash_password(password).expect("hash test password")),
        first_name: Set(String::new()),
        last_name: Set(String::new()),
        is_staff: Set(is_staff),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*state.db)
    .await
    .expect("seed user")
}

fn encode_form(fields: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields)
        .finish()
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Decimal fields serialize as strings; compare numerically.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {}", other),
    }
}
