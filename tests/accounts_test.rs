//! Accounts: registration, login by username or email, logout, profile and
//! password changes.

mod common;

use axum::http::StatusCode;
use common::{response_json, TestApp, SHOPPER_PASSWORD};

const NEW_PASSWORD: &str = "quiet-meadow-318";

#[tokio::test]
async fn registration_signs_the_new_account_in() {
    let app = TestApp::new().await;

    let response = app
        .post_form(
            "/register",
            &[
                ("username", "mirjam"),
                ("email", "Mirjam@Example.com"),
                ("password1", NEW_PASSWORD),
                ("password2", NEW_PASSWORD),
                ("first_name", "Mirjam"),
            ],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["username"], "mirjam");
    assert_eq!(body["user"]["email"], "mirjam@example.com");
    assert_eq!(body["user"]["is_staff"], false);
    assert!(body["user"].get("password_hash").is_none());

    let token = body["access_token"].as_str().expect("access token");
    let profile = response_json(app.get("/profile", Some(token)).await).await;
    assert_eq!(profile["full_name"], "Mirjam");
    assert_eq!(profile["order_count"], 0);
}

#[tokio::test]
async fn registration_reports_every_problem_per_field() {
    let app = TestApp::new().await;

    let response = app
        .post_form(
            "/register",
            &[
                ("username", "shopper"),
                ("email", "shopper@example.com"),
                ("password1", "12345678"),
                ("password2", "87654321"),
            ],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let details = &response_json(response).await["details"];
    assert_eq!(details["username"][0], "A user with that username already exists");
    assert_eq!(details["email"][0], "A user with that email already exists");
    assert_eq!(details["password2"][0], "The two password fields didn't match");
    assert!(details["password1"].is_array());
}

#[tokio::test]
async fn login_accepts_username_or_email() {
    let app = TestApp::new().await;

    let by_name = app
        .post_form(
            "/login",
            &[("username", "shopper"), ("password", SHOPPER_PASSWORD)],
            None,
        )
        .await;
    assert_eq!(by_name.status(), StatusCode::OK);
    assert!(response_json(by_name).await["access_token"].is_string());

    let by_email = app
        .post_form(
            "/login",
            &[("username", "shopper@example.com"), ("password", SHOPPER_PASSWORD)],
            None,
        )
        .await;
    assert_eq!(by_email.status(), StatusCode::OK);
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = TestApp::new().await;

    let response = app
        .post_form("/login", &[("username", "shopper"), ("password", "not-it-at-all")], None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let unknown = app
        .post_form("/login", &[("username", "ghost"), ("password", SHOPPER_PASSWORD)], None)
        .await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_the_presented_token() {
    let app = TestApp::new().await;
    let login = response_json(
        app.post_form(
            "/login",
            &[("username", "shopper"), ("password", SHOPPER_PASSWORD)],
            None,
        )
        .await,
    )
    .await;
    let token = login["access_token"].as_str().expect("token").to_string();

    assert_eq!(app.get("/profile", Some(&token)).await.status(), StatusCode::OK);

    let logout = app.post_form("/logout", &[], Some(&token)).await;
    assert_eq!(logout.status(), StatusCode::OK);

    let after = app.get("/profile", Some(&token)).await;
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);

    // other sessions are unaffected
    assert_eq!(
        app.get("/profile", Some(app.shopper_token())).await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn profile_update_enforces_unique_email() {
    let app = TestApp::new().await;

    let taken = app
        .post_form(
            "/profile",
            &[
                ("first_name", "Kai"),
                ("last_name", "Tamm"),
                ("email", "MANAGER@example.com"),
            ],
            Some(app.shopper_token()),
        )
        .await;
    assert_eq!(taken.status(), StatusCode::BAD_REQUEST);

    let updated = app
        .post_form(
            "/profile",
            &[
                ("first_name", "Kai"),
                ("last_name", "Tamm"),
                ("email", "kai@example.com"),
            ],
            Some(app.shopper_token()),
        )
        .await;
    assert_eq!(updated.status(), StatusCode::OK);
    let body = response_json(updated).await;
    assert_eq!(body["full_name"], "Kai Tamm");
    assert_eq!(body["user"]["email"], "kai@example.com");
}

#[tokio::test]
async fn password_change_requires_the_current_password() {
    let app = TestApp::new().await;
    let token = app.shopper_token();

    let wrong_old = app
        .post_form(
            "/change-password",
            &[
                ("old_password", "not-my-password"),
                ("new_password1", NEW_PASSWORD),
                ("new_password2", NEW_PASSWORD),
            ],
            Some(token),
        )
        .await;
    assert_eq!(wrong_old.status(), StatusCode::BAD_REQUEST);

    let changed = app
        .post_form(
            "/change-password",
            &[
                ("old_password", SHOPPER_PASSWORD),
                ("new_password1", NEW_PASSWORD),
                ("new_password2", NEW_PASSWORD),
            ],
            Some(token),
        )
        .await;
    assert_eq!(changed.status(), StatusCode::OK);

    let old_login = app
        .post_form("/login", &[("username", "shopper"), ("password", SHOPPER_PASSWORD)], None)
        .await;
    assert_eq!(old_login.status(), StatusCode::UNAUTHORIZED);

    let new_login = app
        .post_form("/login", &[("username", "shopper"), ("password", NEW_PASSWORD)], None)
        .await;
    assert_eq!(new_login.status(), StatusCode::OK);
}
