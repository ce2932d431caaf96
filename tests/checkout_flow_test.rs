//! Checkout: totals, price snapshots, cart clearing and order history access.

mod common;

use axum::http::StatusCode;
use common::{decimal, location, response_json, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait};
use serde_json::Value;
use terko_shop::entities::order;
use terko_shop::services::commerce::product_catalog_service::ProductUpdate;

const SHIPPING: &[(&str, &str)] = &[
    ("shipping_address", "12 Quay Street"),
    ("shipping_city", "Tallinn"),
    ("shipping_zip_code", "10111"),
    ("shipping_phone", "+372 5555 0101"),
];

fn line_for<'a>(order: &'a Value, product_slug: &str) -> &'a Value {
    order["items"]
        .as_array()
        .expect("order items")
        .iter()
        .find(|line| line["product_slug"] == product_slug)
        .expect("order line for product")
}

#[tokio::test]
async fn checkout_totals_lines_and_empties_the_cart() {
    let app = TestApp::new().await;
    let teas = app.seed_category("Teas", "teas").await;
    let sencha = app.seed_product(teas.id, "Sencha", "sencha", dec!(10), 20).await;
    let oolong = app.seed_product(teas.id, "Oolong", "oolong", dec!(15), 20).await;
    let token = app.shopper_token();

    for product_id in [sencha.id, sencha.id, oolong.id] {
        app.post_form_ajax(&format!("/cart/add/{}", product_id), &[], Some(token))
            .await;
    }

    let response = app.post_form_ajax("/checkout", SHIPPING, Some(token)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let placed = response_json(response).await;
    assert_eq!(decimal(&placed["total_amount"]), dec!(35));
    let order_number = placed["order_number"].as_str().expect("order number");
    assert_eq!(order_number.len(), 8);
    let order_id = placed["order_id"].as_str().expect("order id").to_string();

    let order = response_json(app.get(&format!("/orders/{}", order_id), Some(token)).await).await;
    assert_eq!(order["order"]["status"], "pending");
    assert_eq!(order["order"]["shipping_city"], "Tallinn");
    assert_eq!(decimal(&line_for(&order, "sencha")["total_price"]), dec!(20));
    assert_eq!(decimal(&line_for(&order, "oolong")["total_price"]), dec!(15));

    let cart = response_json(app.get("/cart", Some(token)).await).await;
    assert!(cart["items"].as_array().expect("items").is_empty());

    let history = response_json(app.get("/orders", Some(token)).await).await;
    assert_eq!(history["orders"].as_array().expect("orders").len(), 1);
}

#[tokio::test]
async fn browser_checkout_redirects_to_the_new_order() {
    let app = TestApp::new().await;
    let teas = app.seed_category("Teas", "teas").await;
    let sencha = app.seed_product(teas.id, "Sencha", "sencha", dec!(10), 20).await;
    let token = app.shopper_token();

    app.post_form_ajax(&format!("/cart/add/{}", sencha.id), &[], Some(token))
        .await;
    let response = app.post_form("/checkout", SHIPPING, Some(token)).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/orders/"));
}

#[tokio::test]
async fn order_lines_keep_the_price_paid() {
    let app = TestApp::new().await;
    let teas = app.seed_category("Teas", "teas").await;
    let sencha = app.seed_product(teas.id, "Sencha", "sencha", dec!(10), 20).await;
    let token = app.shopper_token();

    app.post_form_ajax(&format!("/cart/add/{}", sencha.id), &[], Some(token))
        .await;
    let placed = response_json(app.post_form_ajax("/checkout", SHIPPING, Some(token)).await).await;
    let order_id = placed["order_id"].as_str().expect("order id").to_string();

    app.state
        .services
        .product_catalog
        .update_product(
            sencha.id,
            ProductUpdate {
                price: Some(dec!(99)),
                ..Default::default()
            },
        )
        .await
        .expect("reprice product");

    let order = response_json(app.get(&format!("/orders/{}", order_id), Some(token)).await).await;
    let line = line_for(&order, "sencha");
    assert_eq!(decimal(&line["price"]), dec!(10));
    assert_eq!(decimal(&line["total_price"]), dec!(10));
    assert_eq!(decimal(&order["order"]["total_amount"]), dec!(10));
}

#[tokio::test]
async fn discounted_products_are_charged_the_final_price() {
    let app = TestApp::new().await;
    let teas = app.seed_category("Teas", "teas").await;
    let sencha = app.seed_product(teas.id, "Sencha", "sencha", dec!(10), 20).await;
    app.state
        .services
        .product_catalog
        .update_product(
            sencha.id,
            ProductUpdate {
                discount_price: Some(dec!(8)),
                ..Default::default()
            },
        )
        .await
        .expect("discount product");
    let token = app.shopper_token();

    app.post_form_ajax(&format!("/cart/add/{}", sencha.id), &[], Some(token))
        .await;
    let placed = response_json(app.post_form_ajax("/checkout", SHIPPING, Some(token)).await).await;

    assert_eq!(decimal(&placed["total_amount"]), dec!(8));
}

#[tokio::test]
async fn empty_cart_is_sent_back_to_the_cart_page() {
    let app = TestApp::new().await;
    let token = app.shopper_token();

    let page = app.get("/checkout", Some(token)).await;
    assert_eq!(page.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&page), "/cart");

    let post = app.post_form("/checkout", SHIPPING, Some(token)).await;
    assert_eq!(post.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&post), "/cart");

    let history = response_json(app.get("/orders", Some(token)).await).await;
    assert!(history["orders"].as_array().expect("orders").is_empty());
}

#[tokio::test]
async fn missing_shipping_fields_are_reported_per_field() {
    let app = TestApp::new().await;
    let teas = app.seed_category("Teas", "teas").await;
    let sencha = app.seed_product(teas.id, "Sencha", "sencha", dec!(10), 20).await;
    let token = app.shopper_token();

    app.post_form_ajax(&format!("/cart/add/{}", sencha.id), &[], Some(token))
        .await;
    let response = app
        .post_form(
            "/checkout",
            &[
                ("shipping_address", ""),
                ("shipping_city", "Tallinn"),
                ("shipping_zip_code", "10111"),
                ("shipping_phone", "+372 5555 0101"),
            ],
            Some(token),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(body["details"]["shipping_address"].is_array());

    let cart = response_json(app.get("/cart", Some(token)).await).await;
    assert_eq!(cart["items"].as_array().expect("items").len(), 1);
}

#[tokio::test]
async fn whitespace_only_shipping_fields_are_rejected() {
    let app = TestApp::new().await;
    let teas = app.seed_category("Teas", "teas").await;
    let sencha = app.seed_product(teas.id, "Sencha", "sencha", dec!(10), 20).await;
    let token = app.shopper_token();

    app.post_form_ajax(&format!("/cart/add/{}", sencha.id), &[], Some(token))
        .await;
    let blank = app
        .post_form_ajax(
            "/checkout",
            &[
                ("shipping_address", " "),
                ("shipping_city", " "),
                ("shipping_zip_code", " "),
                ("shipping_phone", " "),
            ],
            Some(token),
        )
        .await;
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
    let details = &response_json(blank).await["details"];
    for field in ["shipping_address", "shipping_city", "shipping_zip_code", "shipping_phone"] {
        assert!(details[field].is_array(), "{} should be reported", field);
    }

    let history = response_json(app.get("/orders", Some(token)).await).await;
    assert!(history["orders"].as_array().expect("orders").is_empty());

    let padded = app
        .post_form_ajax(
            "/checkout",
            &[
                ("shipping_address", "  12 Quay Street "),
                ("shipping_city", " Tallinn"),
                ("shipping_zip_code", "10111 "),
                ("shipping_phone", " +372 5555 0101 "),
            ],
            Some(token),
        )
        .await;
    assert_eq!(padded.status(), StatusCode::CREATED);
    let order_id = response_json(padded).await["order_id"]
        .as_str()
        .expect("order id")
        .to_string();

    let order = response_json(app.get(&format!("/orders/{}", order_id), Some(token)).await).await;
    assert_eq!(order["order"]["shipping_address"], "12 Quay Street");
    assert_eq!(order["order"]["shipping_city"], "Tallinn");
    assert_eq!(order["order"]["shipping_phone"], "+372 5555 0101");
}

#[tokio::test]
async fn failed_checkout_keeps_the_cart_and_writes_no_order() {
    let app = TestApp::new().await;
    let teas = app.seed_category("Teas", "teas").await;
    let sencha = app.seed_product(teas.id, "Sencha", "sencha", dec!(10), 20).await;
    let oolong = app.seed_product(teas.id, "Oolong", "oolong", dec!(15), 20).await;
    let token = app.shopper_token();

    for product_id in [sencha.id, sencha.id, oolong.id] {
        app.post_form_ajax(&format!("/cart/add/{}", product_id), &[], Some(token))
            .await;
    }

    // the order row goes in, then its first line fails
    app.state
        .db
        .execute_unprepared(
            "CREATE TRIGGER order_items_unavailable BEFORE INSERT ON order_items \
             BEGIN SELECT RAISE(ABORT, 'order items unavailable'); END;",
        )
        .await
        .expect("create trigger");

    let failed = app.post_form_ajax("/checkout", SHIPPING, Some(token)).await;
    assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let orders = order::Entity::find()
        .count(&*app.state.db)
        .await
        .expect("count orders");
    assert_eq!(orders, 0);

    let history = response_json(app.get("/orders", Some(token)).await).await;
    assert!(history["orders"].as_array().expect("orders").is_empty());

    let cart = response_json(app.get("/cart", Some(token)).await).await;
    let items = cart["items"].as_array().expect("items");
    assert_eq!(items.len(), 2);
    assert_eq!(cart["total_items"], 3);

    app.state
        .db
        .execute_unprepared("DROP TRIGGER order_items_unavailable;")
        .await
        .expect("drop trigger");

    let retried = app.post_form_ajax("/checkout", SHIPPING, Some(token)).await;
    assert_eq!(retried.status(), StatusCode::CREATED);
    assert_eq!(decimal(&response_json(retried).await["total_amount"]), dec!(35));
}

#[tokio::test]
async fn other_shoppers_orders_are_not_found() {
    let app = TestApp::new().await;
    let teas = app.seed_category("Teas", "teas").await;
    let sencha = app.seed_product(teas.id, "Sencha", "sencha", dec!(10), 20).await;
    let (_, other_token) = app.another_shopper("neighbour").await;

    app.post_form_ajax(&format!("/cart/add/{}", sencha.id), &[], Some(app.shopper_token()))
        .await;
    let placed = response_json(
        app.post_form_ajax("/checkout", SHIPPING, Some(app.shopper_token()))
            .await,
    )
    .await;
    let order_id = placed["order_id"].as_str().expect("order id").to_string();

    let response = app
        .get(&format!("/orders/{}", order_id), Some(&other_token))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
