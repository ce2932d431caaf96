use crate::{
    entities::commerce::{category, product_image, Category, Product, ProductImage},
    entities::product,
    errors::{is_unique_violation, FieldErrors, ServiceError},
    services::{
        commerce::review_service::{approved_reviews, ReviewView},
        not_blank, paginate, Page, PAGE_SIZE,
    },
};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func, LikeExpr},
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, JoinType,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Select, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Featured products shown on the home page
pub const HOME_FEATURED_LIMIT: u64 = 8;
/// Categories shown in navigation and on the home page
pub const NAV_CATEGORY_LIMIT: u64 = 6;
/// Related products shown on a product page
pub const RELATED_LIMIT: u64 = 4;

static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("slug pattern compiles"));

/// Listing order for catalog pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

impl ProductSort {
    /// Unknown values fall back to newest first.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("price_asc") => Self::PriceAsc,
            Some("price_desc") => Self::PriceDesc,
            Some("name") => Self::Name,
            _ => Self::Newest,
        }
    }

    fn apply(self, select: Select<Product>) -> Select<Product> {
        let ordered = match self {
            Self::Newest => select.order_by_desc(product::Column::CreatedAt),
            Self::PriceAsc => select.order_by_asc(product::Column::Price),
            Self::PriceDesc => select.order_by_desc(product::Column::Price),
            Self::Name => select.order_by_asc(product::Column::Name),
        };
        // stable pagination across equal sort keys
        ordered.order_by_asc(product::Column::Id)
    }
}

/// Product card used by every listing
#[derive(Debug, Clone, Serialize)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub category_id: Uuid,
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
    pub final_price: Decimal,
    pub discount_percentage: u32,
    pub image: String,
    pub stock: i32,
    pub in_stock: bool,
    pub is_featured: bool,
}

impl From<&product::Model> for ProductSummary {
    fn from(model: &product::Model) -> Self {
        Self {
            id: model.id,
            name: model.name.clone(),
            slug: model.slug.clone(),
            category_id: model.category_id,
            price: model.price,
            discount_price: model.discount_price,
            final_price: model.final_price(),
            discount_percentage: model.discount_percentage(),
            image: model.image.clone(),
            stock: model.stock,
            in_stock: model.in_stock(),
            is_featured: model.is_featured,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HomePage {
    pub featured_products: Vec<ProductSummary>,
    pub categories: Vec<category::Model>,
}

/// Filters accepted by the catalog page
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductQuery {
    #[serde(default)]
    pub category_slug: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductListing {
    pub category: Option<category::Model>,
    pub categories: Vec<category::Model>,
    pub products: Page<ProductSummary>,
    pub search: Option<String>,
    pub sort: ProductSort,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub products: Page<ProductSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    pub product: ProductSummary,
    pub description: String,
    pub category: Option<category::Model>,
    pub images: Vec<product_image::Model>,
    pub related_products: Vec<ProductSummary>,
    pub reviews: Vec<ReviewView>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CategoryInput {
    #[validate(
        length(min = 1, max = 100, message = "Name must be 1 to 100 characters"),
        custom = "not_blank"
    )]
    pub name: String,
    #[validate(
        length(min = 1, max = 100),
        regex(path = "SLUG_RE", message = "Use letters, numbers, hyphens or underscores")
    )]
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProductInput {
    #[validate(
        length(min = 1, max = 200, message = "Name must be 1 to 200 characters"),
        custom = "not_blank"
    )]
    pub name: String,
    #[validate(
        length(min = 1, max = 200),
        regex(path = "SLUG_RE", message = "Use letters, numbers, hyphens or underscores")
    )]
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category_id: Uuid,
    #[validate(custom = "validate_money")]
    pub price: Decimal,
    #[serde(default)]
    #[validate(custom = "validate_money")]
    pub discount_price: Option<Decimal>,
    #[serde(default)]
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_featured: Option<bool>,
}

/// Partial product edit; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProductUpdate {
    #[validate(
        length(min = 1, max = 200, message = "Name must be 1 to 200 characters"),
        custom = "not_blank"
    )]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_money")]
    pub price: Option<Decimal>,
    #[validate(custom = "validate_money")]
    pub discount_price: Option<Decimal>,
    /// Removes the discount; wins over `discount_price`
    #[serde(default)]
    pub clear_discount: bool,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: Option<i32>,
    pub image: Option<String>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProductImageInput {
    #[validate(custom = "not_blank")]
    pub image: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub is_main: bool,
}

fn validate_money(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        let mut err = ValidationError::new("money");
        err.message = Some("Amount cannot be negative".into());
        return Err(err);
    }
    if value.scale() > 2 {
        let mut err = ValidationError::new("money");
        err.message = Some("Use at most two decimal places".into());
        return Err(err);
    }
    Ok(())
}

/// Lower-cased `%term%` with LIKE wildcards escaped.
fn contains_pattern(term: &str) -> String {
    let escaped = term
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Case-insensitive substring match on a qualified column.
fn icontains<T, C>(table: T, column: C, pattern: &str) -> sea_orm::sea_query::SimpleExpr
where
    T: sea_orm::sea_query::IntoIden + 'static,
    C: sea_orm::sea_query::IntoIden + 'static,
{
    Expr::expr(Func::lower(Expr::col((table, column))))
        .like(LikeExpr::new(pattern).escape('\\'))
}

fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Read-side catalog queries plus staff catalog maintenance
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
}

impl ProductCatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn active_products() -> Select<Product> {
        Product::find().filter(product::Column::IsActive.eq(true))
    }

    /// Categories ordered by name, optionally capped.
    #[instrument(skip(self))]
    pub async fn list_categories(
        &self,
        limit: Option<u64>,
    ) -> Result<Vec<category::Model>, ServiceError> {
        let mut query = Category::find().order_by_asc(category::Column::Name);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        Ok(query.all(&*self.db).await?)
    }

    /// Featured products and navigation categories for the landing page.
    #[instrument(skip(self))]
    pub async fn home(&self) -> Result<HomePage, ServiceError> {
        let featured = Self::active_products()
            .filter(product::Column::IsFeatured.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .limit(HOME_FEATURED_LIMIT)
            .all(&*self.db)
            .await?;

        Ok(HomePage {
            featured_products: featured.iter().map(ProductSummary::from).collect(),
            categories: self.list_categories(Some(NAV_CATEGORY_LIMIT)).await?,
        })
    }

    /// Catalog page: optional category, keyword over name and description,
    /// sort order and page number.
    #[instrument(skip(self))]
    pub async fn list_products(&self, query: ProductQuery) -> Result<ProductListing, ServiceError> {
        let mut select = Self::active_products();

        let category = match non_blank(query.category_slug.as_deref()) {
            Some(slug) => {
                let category = Category::find()
                    .filter(category::Column::Slug.eq(slug.as_str()))
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", slug)))?;
                select = select.filter(product::Column::CategoryId.eq(category.id));
                Some(category)
            }
            None => None,
        };

        let search = non_blank(query.search.as_deref());
        if let Some(term) = &search {
            let pattern = contains_pattern(term);
            select = select.filter(
                Condition::any()
                    .add(icontains(product::Entity, product::Column::Name, &pattern))
                    .add(icontains(
                        product::Entity,
                        product::Column::Description,
                        &pattern,
                    )),
            );
        }

        let sort = ProductSort::parse(query.sort.as_deref());
        let page = paginate(&*self.db, sort.apply(select), query.page.as_deref(), PAGE_SIZE)
            .await?
            .map(|model| ProductSummary::from(&model));

        Ok(ProductListing {
            category,
            categories: self.list_categories(None).await?,
            products: page,
            search,
            sort,
        })
    }

    /// Global search over product name, description and category name.
    /// A blank query lists every active product.
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        q: Option<&str>,
        page: Option<&str>,
    ) -> Result<SearchResults, ServiceError> {
        let query = non_blank(q).unwrap_or_default();

        let mut select = Self::active_products();
        if !query.is_empty() {
            let pattern = contains_pattern(&query);
            select = select
                .join(JoinType::InnerJoin, product::Relation::Category.def())
                .filter(
                    Condition::any()
                        .add(icontains(product::Entity, product::Column::Name, &pattern))
                        .add(icontains(
                            product::Entity,
                            product::Column::Description,
                            &pattern,
                        ))
                        .add(icontains(
                            category::Entity,
                            category::Column::Name,
                            &pattern,
                        )),
                );
        }

        let products = paginate(
            &*self.db,
            ProductSort::Newest.apply(select),
            page,
            PAGE_SIZE,
        )
        .await?
        .map(|model| ProductSummary::from(&model));

        Ok(SearchResults { query, products })
    }

    /// Product page: the active product, its category, gallery, related
    /// products from the same category and approved reviews.
    #[instrument(skip(self))]
    pub async fn product_detail(&self, slug: &str) -> Result<ProductDetail, ServiceError> {
        let product = self.active_product_by_slug(slug).await?;

        let category = Category::find_by_id(product.category_id)
            .one(&*self.db)
            .await?;

        let images = ProductImage::find()
            .filter(product_image::Column::ProductId.eq(product.id))
            .order_by_desc(product_image::Column::IsMain)
            .order_by_asc(product_image::Column::Id)
            .all(&*self.db)
            .await?;

        let related = Self::active_products()
            .filter(product::Column::CategoryId.eq(product.category_id))
            .filter(product::Column::Id.ne(product.id))
            .order_by_desc(product::Column::CreatedAt)
            .limit(RELATED_LIMIT)
            .all(&*self.db)
            .await?;

        let reviews = approved_reviews(&*self.db, product.id).await?;

        Ok(ProductDetail {
            product: ProductSummary::from(&product),
            description: product.description,
            category,
            images,
            related_products: related.iter().map(ProductSummary::from).collect(),
            reviews,
        })
    }

    pub async fn active_product_by_slug(&self, slug: &str) -> Result<product::Model, ServiceError> {
        Self::active_products()
            .filter(product::Column::Slug.eq(slug))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", slug)))
    }

    #[instrument(skip(self, input), fields(slug = %input.slug))]
    pub async fn create_category(
        &self,
        input: CategoryInput,
    ) -> Result<category::Model, ServiceError> {
        input.validate()?;

        let taken = Category::find()
            .filter(category::Column::Slug.eq(input.slug.as_str()))
            .one(&*self.db)
            .await?
            .is_some();
        if taken {
            return Err(slug_taken("category"));
        }

        let now = Utc::now();
        let model = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            slug: Set(input.slug),
            description: Set(input.description.unwrap_or_default()),
            image: Set(input.image.filter(|path| !path.trim().is_empty())),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let category = model.insert(&*self.db).await.map_err(|err| {
            if is_unique_violation(&err) {
                slug_taken("category")
            } else {
                err.into()
            }
        })?;

        info!(category_id = %category.id, "Category created");
        Ok(category)
    }

    #[instrument(skip(self, input), fields(slug = %input.slug))]
    pub async fn create_product(&self, input: ProductInput) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let mut fields = FieldErrors::new();
        if Category::find_by_id(input.category_id)
            .one(&*self.db)
            .await?
            .is_none()
        {
            fields.add("category_id", "Select a valid category");
        }
        let slug_in_use = Product::find()
            .filter(product::Column::Slug.eq(input.slug.as_str()))
            .one(&*self.db)
            .await?
            .is_some();
        if slug_in_use {
            fields.add("slug", "A product with this slug already exists");
        }
        fields.into_result()?;

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            slug: Set(input.slug),
            description: Set(input.description.unwrap_or_default()),
            category_id: Set(input.category_id),
            price: Set(input.price),
            discount_price: Set(input.discount_price),
            stock: Set(input.stock),
            image: Set(input.image.unwrap_or_default()),
            is_active: Set(input.is_active.unwrap_or(true)),
            is_featured: Set(input.is_featured.unwrap_or(false)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let product = model.insert(&*self.db).await.map_err(|err| {
            if is_unique_violation(&err) {
                slug_taken("product")
            } else {
                err.into()
            }
        })?;

        info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    #[instrument(skip(self, update))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        update: ProductUpdate,
    ) -> Result<product::Model, ServiceError> {
        update.validate()?;

        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let mut active: product::ActiveModel = product.into();
        if let Some(name) = update.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = update.description {
            active.description = Set(description);
        }
        if let Some(price) = update.price {
            active.price = Set(price);
        }
        if update.clear_discount {
            active.discount_price = Set(None);
        } else if let Some(discount) = update.discount_price {
            active.discount_price = Set(Some(discount));
        }
        if let Some(stock) = update.stock {
            active.stock = Set(stock);
        }
        if let Some(image) = update.image {
            active.image = Set(image);
        }
        if let Some(is_active) = update.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(is_featured) = update.is_featured {
            active.is_featured = Set(is_featured);
        }
        active.updated_at = Set(Utc::now());

        let product = active.update(&*self.db).await?;
        info!(%product_id, "Product updated");
        Ok(product)
    }

    #[instrument(skip(self, input))]
    pub async fn add_image(
        &self,
        product_id: Uuid,
        input: ProductImageInput,
    ) -> Result<product_image::Model, ServiceError> {
        input.validate()?;

        if Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .is_none()
        {
            return Err(ServiceError::NotFound(format!(
                "Product {} not found",
                product_id
            )));
        }

        let image = product_image::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            image: Set(input.image.trim().to_string()),
            alt_text: Set(input.alt_text.unwrap_or_default()),
            is_main: Set(input.is_main),
        }
        .insert(&*self.db)
        .await?;

        info!(%product_id, image_id = %image.id, "Product image added");
        Ok(image)
    }
}

fn slug_taken(kind: &str) -> ServiceError {
    let mut fields = FieldErrors::new();
    fields.add("slug", format!("A {} with this slug already exists", kind));
    ServiceError::InvalidForm(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn sort_parsing_defaults_to_newest() {
        assert_eq!(ProductSort::parse(Some("price_asc")), ProductSort::PriceAsc);
        assert_eq!(ProductSort::parse(Some("price_desc")), ProductSort::PriceDesc);
        assert_eq!(ProductSort::parse(Some("name")), ProductSort::Name);
        assert_eq!(ProductSort::parse(Some("rating")), ProductSort::Newest);
        assert_eq!(ProductSort::parse(None), ProductSort::Newest);
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(contains_pattern("Tea"), "%tea%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn money_must_be_non_negative_cents() {
        assert!(validate_money(&dec!(10.50)).is_ok());
        assert!(validate_money(&dec!(-1)).is_err());
        assert!(validate_money(&dec!(1.005)).is_err());
    }

    #[test]
    fn category_slug_format_is_checked() {
        let input = CategoryInput {
            name: "Kitchen".into(),
            slug: "kitchen ware".into(),
            description: None,
            image: None,
        };
        let errors = input.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("slug"));
    }
}
