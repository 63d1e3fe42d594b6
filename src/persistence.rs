use crate::errors::{AppError, AppResult};
use crate::models::{BoardDocument, StorageLocation, StorageScope, WriteResponse};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = AppResult<T>> + Send + 'a>>;

/// Document store partitioned by storage scope. Writes are idempotent upserts
/// of the whole document.
pub trait BoardGateway: Send + Sync {
    fn write_user_document<'a>(
        &'a self,
        collection: &'a str,
        document_id: &'a str,
        document: &'a Value,
    ) -> GatewayFuture<'a, WriteResponse>;

    fn write_account_document<'a>(
        &'a self,
        account_id: i64,
        collection: &'a str,
        document_id: &'a str,
        document: &'a Value,
    ) -> GatewayFuture<'a, WriteResponse>;

    fn read_user_document<'a>(&'a self, collection: &'a str, document_id: &'a str) -> GatewayFuture<'a, Option<Value>>;

    fn read_account_document<'a>(
        &'a self,
        account_id: i64,
        collection: &'a str,
        document_id: &'a str,
    ) -> GatewayFuture<'a, Option<Value>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Updated,
    NotUpdated,
}

impl CommitOutcome {
    pub fn is_updated(self) -> bool {
        matches!(self, Self::Updated)
    }
}

/// Writes the full board document to the partition named by `location`.
///
/// A rejected call or a response without `data` is reported as
/// [`CommitOutcome::NotUpdated`]; nothing is retried.
pub async fn commit_board(
    gateway: &dyn BoardGateway,
    location: &StorageLocation,
    collection: &str,
    board_id: &str,
    document: &BoardDocument,
) -> AppResult<CommitOutcome> {
    let body = serde_json::to_value(document)?;
    let result = match location.scope {
        StorageScope::User => gateway.write_user_document(collection, board_id, &body).await,
        StorageScope::Account => {
            let account_id = require_account_id(location)?;
            gateway
                .write_account_document(account_id, collection, board_id, &body)
                .await
        }
    };

    match result {
        Ok(response) if response.is_success() => Ok(CommitOutcome::Updated),
        Ok(_) => {
            tracing::debug!(board_id = %board_id, scope = location.scope.as_str(), "board write returned no data");
            Ok(CommitOutcome::NotUpdated)
        }
        Err(error) => {
            tracing::debug!(
                board_id = %board_id,
                scope = location.scope.as_str(),
                error = %error,
                "board write rejected"
            );
            Ok(CommitOutcome::NotUpdated)
        }
    }
}

pub async fn load_board(
    gateway: &dyn BoardGateway,
    location: &StorageLocation,
    collection: &str,
    board_id: &str,
) -> AppResult<Option<BoardDocument>> {
    let raw = match location.scope {
        StorageScope::User => gateway.read_user_document(collection, board_id).await?,
        StorageScope::Account => {
            let account_id = require_account_id(location)?;
            gateway.read_account_document(account_id, collection, board_id).await?
        }
    };
    raw.map(serde_json::from_value::<BoardDocument>)
        .transpose()
        .map_err(AppError::from)
}

fn require_account_id(location: &StorageLocation) -> AppResult<i64> {
    location
        .value
        .ok_or_else(|| AppError::Invalid("account-scoped board has no account id".to_string()))
}


#[cfg(test)]
mod tests {
    use super::testing::{RecordingGateway, WriteBehavior};
    use super::{commit_board, load_board, CommitOutcome};
    use crate::models::{BoardDocument, StorageLocation, StorageScope};

    #[tokio::test]
    async fn user_scope_writes_user_partition() {
        let gateway = RecordingGateway::new(WriteBehavior::Accept);
        let outcome = commit_board(&gateway, &StorageLocation::user(), "OpenBoards", "ops", &BoardDocument::default())
            .await
            .expect("commit");
        assert_eq!(outcome, CommitOutcome::Updated);
        assert_eq!(gateway.writes.lock().expect("writes")[0].0, "user/OpenBoards/ops");

        let loaded = load_board(&gateway, &StorageLocation::user(), "OpenBoards", "ops")
            .await
            .expect("load");
        assert_eq!(loaded, Some(BoardDocument::default()));
    }

    #[tokio::test]
    async fn account_scope_writes_account_partition() {
        let gateway = RecordingGateway::new(WriteBehavior::Accept);
        commit_board(&gateway, &StorageLocation::account(77), "OpenBoards", "ops", &BoardDocument::default())
            .await
            .expect("commit");
        assert_eq!(gateway.writes.lock().expect("writes")[0].0, "account/77/OpenBoards/ops");
    }

    #[tokio::test]
    async fn missing_data_and_rejections_are_not_updates() {
        for behavior in [WriteBehavior::NoData, WriteBehavior::Reject] {
            let gateway = RecordingGateway::new(behavior);
            let document = BoardDocument::default();
            let outcome = commit_board(&gateway, &StorageLocation::user(), "OpenBoards", "ops", &document)
                .await
                .expect("commit resolves");
            assert_eq!(outcome, CommitOutcome::NotUpdated);
            assert_eq!(gateway.write_count(), 1, "no retry");
        }
    }

    #[tokio::test]
    async fn account_scope_requires_account_id() {
        let gateway = RecordingGateway::new(WriteBehavior::Accept);
        let location = StorageLocation {
            scope: StorageScope::Account,
            value: None,
        };
        let result = commit_board(&gateway, &location, "OpenBoards", "ops", &BoardDocument::default()).await;
        assert!(result.is_err());
        assert_eq!(gateway.write_count(), 0);
    }
}
