use crate::handlers::common::{created_response, form_body, map_service_error};
use crate::handlers::flash::{self, FlashLevel};
use crate::{
    auth::AuthUser,
    entities::commerce::CategoryModel,
    errors::ApiError,
    services::commerce::{product_catalog_service::NAV_CATEGORY_LIMIT, ProductQuery, ReviewInput},
    AppState,
};
use axum::{
    extract::{rejection::FormRejection, Path, Query, State},
    http::HeaderMap,
    response::Response,
    routing::get,
    Form, Json, Router,
};
use serde::Deserialize;

/// Creates the router for catalog pages and review submission
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/catalog", get(product_list))
        .route("/catalog/:category_slug", get(category_product_list))
        .route("/product/:slug", get(product_detail).post(submit_review))
        .route("/search", get(search))
        .route("/categories", get(navigation_categories))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub page: Option<String>,
}

/// Landing page: featured products and navigation categories
async fn home(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let home = state
        .services
        .product_catalog
        .home()
        .await
        .map_err(map_service_error)?;

    Ok(flash::page(&headers, home))
}

/// All active products
async fn product_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(mut query): Query<ProductQuery>,
) -> Result<Response, ApiError> {
    query.category_slug = None;
    listing(&state, &headers, query).await
}

/// Active products of one category
async fn category_product_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(category_slug): Path<String>,
    Query(mut query): Query<ProductQuery>,
) -> Result<Response, ApiError> {
    query.category_slug = Some(category_slug);
    listing(&state, &headers, query).await
}

async fn listing(
    state: &AppState,
    headers: &HeaderMap,
    query: ProductQuery,
) -> Result<Response, ApiError> {
    let listing = state
        .services
        .product_catalog
        .list_products(query)
        .await
        .map_err(map_service_error)?;

    Ok(flash::page(headers, listing))
}

/// Product page with related products and approved reviews
async fn product_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Result<Response, ApiError> {
    let detail = state
        .services
        .product_catalog
        .product_detail(&slug)
        .await
        .map_err(map_service_error)?;

    Ok(flash::page(&headers, detail))
}

/// Review form post from the product page
async fn submit_review(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Path(slug): Path<String>,
    body: Result<Form<ReviewInput>, FormRejection>,
) -> Result<Response, ApiError> {
    let input = form_body(body)?;

    let review = state
        .services
        .reviews
        .submit(user.user_id, &slug, input)
        .await
        .map_err(map_service_error)?;

    let message = "Your review has been added and will appear once approved";
    if flash::is_ajax(&headers) {
        return Ok(created_response(serde_json::json!({
            "success": true,
            "message": message,
            "review_id": review.id,
        })));
    }

    Ok(flash::redirect_with_flash(
        &format!("/product/{}", slug),
        FlashLevel::Success,
        message,
    ))
}

/// Global search over product names, descriptions and category names
async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiError> {
    let results = state
        .services
        .product_catalog
        .search(params.q.as_deref(), params.page.as_deref())
        .await
        .map_err(map_service_error)?;

    Ok(flash::page(&headers, results))
}

/// Navigation categories, as every page header shows them
async fn navigation_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryModel>>, ApiError> {
    let categories = state
        .services
        .product_catalog
        .list_categories(Some(NAV_CATEGORY_LIMIT))
        .await
        .map_err(map_service_error)?;

    Ok(Json(categories))
}
