//! Catalog browsing: category pages, keyword search, sorting and pagination.

mod common;

use axum::http::{Method, StatusCode};
use common::{decimal, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

fn slugs(listing: &Value) -> Vec<String> {
    listing["products"]["items"]
        .as_array()
        .expect("product items")
        .iter()
        .map(|item| item["slug"].as_str().expect("slug").to_string())
        .collect()
}

#[tokio::test]
async fn category_page_lists_only_its_active_products() {
    let app = TestApp::new().await;
    let teas = app.seed_category("Teas", "teas").await;
    let cups = app.seed_category("Cups", "cups").await;
    app.seed_product(teas.id, "Sencha", "sencha", dec!(10), 5).await;
    app.seed_product(cups.id, "Glass Cup", "glass-cup", dec!(7), 5).await;
    let hidden = app.seed_product(teas.id, "Old Pu-erh", "old-pu-erh", dec!(30), 5).await;
    app.send_json(
        Method::PUT,
        &format!("/admin/products/{}", hidden.id),
        &json!({ "is_active": false }),
        Some(app.staff_token()),
    )
    .await;

    let listing = response_json(app.get("/catalog/teas", None).await).await;
    assert_eq!(listing["category"]["slug"], "teas");
    assert_eq!(slugs(&listing), vec!["sencha"]);

    let detail = app.get("/product/old-pu-erh", None).await;
    assert_eq!(detail.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_category_is_not_found() {
    let app = TestApp::new().await;

    let response = app.get("/catalog/nope", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sorting_by_price_and_name() {
    let app = TestApp::new().await;
    let teas = app.seed_category("Teas", "teas").await;
    app.seed_product(teas.id, "Oolong", "oolong", dec!(15), 5).await;
    app.seed_product(teas.id, "Assam", "assam", dec!(12), 5).await;
    app.seed_product(teas.id, "Matcha", "matcha", dec!(25), 5).await;

    let asc = response_json(app.get("/catalog?sort=price_asc", None).await).await;
    assert_eq!(slugs(&asc), vec!["assam", "oolong", "matcha"]);
    assert_eq!(asc["sort"], "price_asc");

    let desc = response_json(app.get("/catalog?sort=price_desc", None).await).await;
    assert_eq!(slugs(&desc), vec!["matcha", "oolong", "assam"]);

    let by_name = response_json(app.get("/catalog?sort=name", None).await).await;
    assert_eq!(slugs(&by_name), vec!["assam", "matcha", "oolong"]);

    let unknown = response_json(app.get("/catalog?sort=rating", None).await).await;
    assert_eq!(unknown["sort"], "newest");
}

#[tokio::test]
async fn keyword_search_matches_names_descriptions_and_categories() {
    let app = TestApp::new().await;
    let teas = app.seed_category("Teas", "teas").await;
    let cups = app.seed_category("Porcelain", "porcelain").await;
    app.seed_product(teas.id, "Sencha", "sencha", dec!(10), 5).await;
    app.seed_product(cups.id, "Gaiwan", "gaiwan", dec!(18), 5).await;

    let by_name = response_json(app.get("/catalog?search=SENCHA", None).await).await;
    assert_eq!(slugs(&by_name), vec!["sencha"]);

    let by_description = response_json(app.get("/catalog?search=gaiwan%20for", None).await).await;
    assert_eq!(slugs(&by_description), vec!["gaiwan"]);

    let by_category = response_json(app.get("/search?q=porcelain", None).await).await;
    assert_eq!(by_category["query"], "porcelain");
    assert_eq!(slugs(&by_category), vec!["gaiwan"]);

    let nothing = response_json(app.get("/search?q=coffee", None).await).await;
    assert!(slugs(&nothing).is_empty());
    assert_eq!(nothing["products"]["total"], 0);
}

#[tokio::test]
async fn pages_hold_twelve_and_out_of_range_pages_clamp() {
    let app = TestApp::new().await;
    let teas = app.seed_category("Teas", "teas").await;
    for n in 0..13 {
        app.seed_product(teas.id, &format!("Blend {:02}", n), &format!("blend-{:02}", n), dec!(9), 5)
            .await;
    }

    let first = response_json(app.get("/catalog?sort=name", None).await).await;
    assert_eq!(slugs(&first).len(), 12);
    assert_eq!(first["products"]["total_pages"], 2);
    assert_eq!(first["products"]["has_next"], true);

    let second = response_json(app.get("/catalog?sort=name&page=2", None).await).await;
    assert_eq!(slugs(&second), vec!["blend-12"]);

    let beyond = response_json(app.get("/catalog?sort=name&page=99", None).await).await;
    assert_eq!(beyond["products"]["page"], 2);

    let garbage = response_json(app.get("/catalog?sort=name&page=abc", None).await).await;
    assert_eq!(garbage["products"]["page"], 1);
}

#[tokio::test]
async fn product_page_shows_pricing_gallery_and_related_products() {
    let app = TestApp::new().await;
    let teas = app.seed_category("Teas", "teas").await;
    let sencha = app.seed_product(teas.id, "Sencha", "sencha", dec!(20), 5).await;
    app.seed_product(teas.id, "Gyokuro", "gyokuro", dec!(40), 5).await;

    let staff = app.staff_token();
    let updated = app
        .send_json(
            Method::PUT,
            &format!("/admin/products/{}", sencha.id),
            &json!({ "discount_price": "15", "is_featured": true }),
            Some(staff),
        )
        .await;
    assert_eq!(updated.status(), StatusCode::OK);
    let image = app
        .send_json(
            Method::POST,
            &format!("/admin/products/{}/images", sencha.id),
            &json!({ "image": "products/sencha-leaf.jpg", "alt_text": "Leaves", "is_main": true }),
            Some(staff),
        )
        .await;
    assert_eq!(image.status(), StatusCode::CREATED);

    let detail = response_json(app.get("/product/sencha", None).await).await;
    assert_eq!(decimal(&detail["product"]["final_price"]), dec!(15));
    assert_eq!(detail["product"]["discount_percentage"], 25);
    assert_eq!(detail["category"]["slug"], "teas");
    assert_eq!(detail["images"][0]["image"], "products/sencha-leaf.jpg");
    assert_eq!(detail["related_products"][0]["slug"], "gyokuro");

    let home = response_json(app.get("/", None).await).await;
    let featured = home["featured_products"].as_array().expect("featured");
    assert_eq!(featured.len(), 1);
    assert_eq!(featured[0]["slug"], "sencha");
    assert_eq!(home["categories"][0]["slug"], "teas");
}

#[tokio::test]
async fn navigation_lists_categories_by_name() {
    let app = TestApp::new().await;
    app.seed_category("Teas", "teas").await;
    app.seed_category("Accessories", "accessories").await;

    let response = app.get("/categories", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let categories = response_json(response).await;
    assert_eq!(categories[0]["slug"], "accessories");
    assert_eq!(categories[1]["slug"], "teas");
}
