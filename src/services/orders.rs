use crate::{
    entities::order::{self, Entity as OrderEntity, Model as OrderModel},
    entities::order_item::{self, Entity as OrderItemEntity},
    entities::{product, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{paginate, Page, PAGE_SIZE},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Order line with the product it refers to, if that still exists.
#[derive(Debug, Clone, Serialize)]
pub struct OrderLine {
    #[serde(flatten)]
    pub item: order_item::Model,
    pub product_name: Option<String>,
    pub product_slug: Option<String>,
}

/// Order detail page model
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: OrderModel,
    pub status_label: &'static str,
    pub items: Vec<OrderLine>,
}

/// Order history and administration.
///
/// Shoppers only ever see their own orders; a foreign order id is reported
/// as missing rather than forbidden.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    /// Creates a new order service instance
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// The user's orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrderModel>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// One of the user's orders with its lines.
    #[instrument(skip(self))]
    pub async fn get_for_user(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        self.detail(order).await
    }

    /// Any order with its lines, for staff.
    pub async fn get(&self, order_id: Uuid) -> Result<OrderDetail, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        self.detail(order).await
    }

    /// All orders, newest first, optionally narrowed to one status.
    #[instrument(skip(self))]
    pub async fn list_all(
        &self,
        status: Option<OrderStatus>,
        page: Option<&str>,
    ) -> Result<Page<OrderModel>, ServiceError> {
        let mut query = OrderEntity::find();
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }
        let query = query
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id);

        Ok(paginate(&*self.db, query, page, PAGE_SIZE).await?)
    }

    /// Sets an order's status. Any status may follow any other.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = order.status;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(chrono::Utc::now());
        let updated = active.update(&*self.db).await?;

        metrics::counter!("terko_orders.status_changed", 1, "status" => new_status.to_string());
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;

        info!(%order_id, %old_status, %new_status, "Order status updated");
        Ok(updated)
    }

    async fn detail(&self, order: OrderModel) -> Result<OrderDetail, ServiceError> {
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .find_also_related(product::Entity)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|(item, product)| OrderLine {
                item,
                product_name: product.as_ref().map(|p| p.name.clone()),
                product_slug: product.map(|p| p.slug),
            })
            .collect();

        Ok(OrderDetail {
            status_label: order.status.label(),
            order,
            items,
        })
    }
}
