use crate::{
    auth::user,
    entities::commerce::{review, Product, Review},
    entities::product,
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

pub const DUPLICATE_REVIEW_MESSAGE: &str = "You have already reviewed this product";

/// Review form as submitted from the product page
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ReviewInput {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,
    #[validate(length(min = 1, max = 200, message = "Title must be 1 to 200 characters"))]
    pub title: String,
    #[validate(length(min = 1, message = "This field is required"))]
    pub comment: String,
}

impl ReviewInput {
    /// Drops surrounding whitespace so blank text fails the length rules.
    pub fn trimmed(self) -> Self {
        Self {
            rating: self.rating,
            title: self.title.trim().to_string(),
            comment: self.comment.trim().to_string(),
        }
    }
}

/// Approved review as shown to shoppers
#[derive(Debug, Clone, Serialize)]
pub struct ReviewView {
    pub id: Uuid,
    pub rating: i32,
    pub title: String,
    pub comment: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// Row of the staff moderation queue
#[derive(Debug, Clone, Serialize)]
pub struct ModerationEntry {
    #[serde(flatten)]
    pub review: review::Model,
    pub product_name: Option<String>,
    pub product_slug: Option<String>,
}

/// Approved reviews of a product, newest first.
pub async fn approved_reviews<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<Vec<ReviewView>, ServiceError> {
    let rows = Review::find()
        .filter(review::Column::ProductId.eq(product_id))
        .filter(review::Column::IsApproved.eq(true))
        .order_by_desc(review::Column::CreatedAt)
        .find_also_related(user::Entity)
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(review, author)| ReviewView {
            id: review.id,
            rating: review.rating,
            title: review.title,
            comment: review.comment,
            author: author.map(|u| u.username).unwrap_or_default(),
            created_at: review.created_at,
        })
        .collect())
}

/// Review submission and moderation
#[derive(Clone)]
pub struct ReviewService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ReviewService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Stores a new, unapproved review of the active product at `product_slug`.
    ///
    /// A second review by the same user is rejected with a validation error,
    /// whether caught by the lookup or by the unique index under a race.
    #[instrument(skip(self, input))]
    pub async fn submit(
        &self,
        user_id: Uuid,
        product_slug: &str,
        input: ReviewInput,
    ) -> Result<review::Model, ServiceError> {
        let product = Product::find()
            .filter(product::Column::Slug.eq(product_slug))
            .filter(product::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_slug)))?;

        let input = input.trimmed();
        input.validate()?;

        let existing = Review::find()
            .filter(review::Column::ProductId.eq(product.id))
            .filter(review::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::ValidationError(
                DUPLICATE_REVIEW_MESSAGE.to_string(),
            ));
        }

        let review = review::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            user_id: Set(user_id),
            rating: Set(input.rating),
            title: Set(input.title),
            comment: Set(input.comment),
            is_approved: Set(false),
            created_at: Set(Utc::now()),
        };

        let review = match review.insert(&*self.db).await {
            Ok(review) => review,
            Err(err) if crate::errors::is_unique_violation(&err) => {
                warn!(%user_id, product_id = %product.id, "Concurrent duplicate review rejected");
                return Err(ServiceError::ValidationError(
                    DUPLICATE_REVIEW_MESSAGE.to_string(),
                ));
            }
            Err(err) => return Err(err.into()),
        };

        metrics::counter!("terko_reviews.submitted", 1);
        self.event_sender
            .send_or_log(Event::ReviewSubmitted {
                review_id: review.id,
                product_id: product.id,
                user_id,
                rating: review.rating,
            })
            .await;

        info!(review_id = %review.id, product = %product.slug, "Review submitted for moderation");
        Ok(review)
    }

    pub async fn approved_for_product(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<ReviewView>, ServiceError> {
        approved_reviews(&*self.db, product_id).await
    }

    /// Moderation queue, newest first; `approved` narrows by flag.
    #[instrument(skip(self))]
    pub async fn list_for_moderation(
        &self,
        approved: Option<bool>,
    ) -> Result<Vec<ModerationEntry>, ServiceError> {
        let mut query = Review::find();
        if let Some(flag) = approved {
            query = query.filter(review::Column::IsApproved.eq(flag));
        }

        let rows = query
            .order_by_desc(review::Column::CreatedAt)
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(review, product)| ModerationEntry {
                review,
                product_name: product.as_ref().map(|p| p.name.clone()),
                product_slug: product.map(|p| p.slug),
            })
            .collect())
    }

    /// Sets the approval flag of a review.
    #[instrument(skip(self))]
    pub async fn set_approval(
        &self,
        review_id: Uuid,
        approved: bool,
    ) -> Result<review::Model, ServiceError> {
        let review = Review::find_by_id(review_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Review {} not found", review_id)))?;

        let mut active: review::ActiveModel = review.into();
        active.is_approved = Set(approved);
        let review = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ReviewModerated {
                review_id,
                approved,
            })
            .await;

        info!(%review_id, approved, "Review moderated");
        Ok(review)
    }
}
