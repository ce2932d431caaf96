/*!
 * Transaction helper
 *
 * Runs a closure inside a database transaction: commit on `Ok`, rollback on
 * `Err`. The closure's own error type comes back untouched.
 */

use metrics::counter;
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionError, TransactionTrait};
use std::future::Future;
use std::pin::Pin;
use tracing::warn;

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute a function within a database transaction
///
/// ```rust,ignore
/// let order = with_transaction(&db, |txn| {
///     Box::pin(async move {
///         let order = draft.into_active_model().insert(txn).await?;
///         cart_item::Entity::delete_many().exec(txn).await?;
///         Ok(order)
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<F, T, E>(db: &DatabaseConnection, f: F) -> Result<T, E>
where
    F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<T, E>> + Send,
    T: Send,
    E: From<DbErr> + std::error::Error + Send,
{
    match db.transaction(f).await {
        Ok(value) => {
            counter!("terko_db.transaction.committed", 1);
            Ok(value)
        }
        Err(TransactionError::Connection(db_err)) => {
            counter!("terko_db.transaction.failed", 1);
            warn!("Transaction could not be started or committed: {}", db_err);
            Err(E::from(db_err))
        }
        Err(TransactionError::Transaction(err)) => {
            counter!("terko_db.transaction.rolled_back", 1);
            warn!("Transaction rolled back: {}", err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, DbConfig};
    use crate::errors::ServiceError;
    use sea_orm::{ConnectionTrait, Statement};

    async fn scratch_db() -> DatabaseConnection {
        let db = establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .unwrap();
        db.execute_unprepared("CREATE TABLE scratch (id INTEGER PRIMARY KEY, label TEXT)")
            .await
            .unwrap();
        db
    }

    async fn count_rows(db: &DatabaseConnection) -> i64 {
        let row = db
            .query_one(Statement::from_string(
                db.get_database_backend(),
                "SELECT COUNT(*) AS n FROM scratch",
            ))
            .await
            .unwrap()
            .unwrap();
        row.try_get("", "n").unwrap()
    }

    #[tokio::test]
    async fn commits_on_ok() {
        let db = scratch_db().await;

        let value = with_transaction::<_, _, ServiceError>(&db, |txn| {
            Box::pin(async move {
                txn.execute_unprepared("INSERT INTO scratch (label) VALUES ('kept')")
                    .await?;
                Ok(7)
            })
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(count_rows(&db).await, 1);
    }

    #[tokio::test]
    async fn rolls_back_and_preserves_error() {
        let db = scratch_db().await;

        let result = with_transaction::<_, (), ServiceError>(&db, |txn| {
            Box::pin(async move {
                txn.execute_unprepared("INSERT INTO scratch (label) VALUES ('dropped')")
                    .await?;
                Err(ServiceError::InvalidOperation("abort".into()))
            })
        })
        .await;

        assert!(matches!(result, Err(ServiceError::InvalidOperation(_))));
        assert_eq!(count_rows(&db).await, 0);
    }
}
