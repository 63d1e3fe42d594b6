use crate::errors::{AppError, AppResult};
use crate::models::{StorageScope, WriteResponse};
use crate::persistence::{BoardGateway, GatewayFuture};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocumentSummary {
    pub scope: StorageScope,
    pub account_id: Option<i64>,
    pub collection: String,
    pub document_id: String,
    pub updated_at: DateTime<Utc>,
}

/// SQLite-backed document store with a user partition and per-account partitions.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn upsert_user_document(
        &self,
        collection: &str,
        document_id: &str,
        document: &Value,
    ) -> AppResult<WriteResponse> {
        let now = Utc::now();
        let body = serde_json::to_string(document)?;

        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO user_documents (collection, document_id, document_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(collection, document_id)
             DO UPDATE SET document_json = excluded.document_json, updated_at = excluded.updated_at",
            params![collection, document_id, body, now.to_rfc3339()],
        )?;

        Ok(written(document_id, now))
    }

    pub fn upsert_account_document(
        &self,
        account_id: i64,
        collection: &str,
        document_id: &str,
        document: &Value,
    ) -> AppResult<WriteResponse> {
        let now = Utc::now();
        let body = serde_json::to_string(document)?;

        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO account_documents (account_id, collection, document_id, document_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(account_id, collection, document_id)
             DO UPDATE SET document_json = excluded.document_json, updated_at = excluded.updated_at",
            params![account_id, collection, document_id, body, now.to_rfc3339()],
        )?;

        Ok(written(document_id, now))
    }

    pub fn get_user_document(&self, collection: &str, document_id: &str) -> AppResult<Option<Value>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT document_json FROM user_documents WHERE collection = ?1 AND document_id = ?2",
                params![collection, document_id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|body| serde_json::from_str::<Value>(&body))
            .transpose()
            .map_err(AppError::from)
    }

    pub fn get_account_document(
        &self,
        account_id: i64,
        collection: &str,
        document_id: &str,
    ) -> AppResult<Option<Value>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT document_json FROM account_documents
                 WHERE account_id = ?1 AND collection = ?2 AND document_id = ?3",
                params![account_id, collection, document_id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|body| serde_json::from_str::<Value>(&body))
            .transpose()
            .map_err(AppError::from)
    }

    pub fn list_user_documents(&self, collection: &str) -> AppResult<Vec<StoredDocumentSummary>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT collection, document_id, updated_at FROM user_documents
             WHERE collection = ?1 ORDER BY updated_at DESC, document_id ASC",
        )?;
        let rows = stmt.query_map([collection], |row| {
            Ok(StoredDocumentSummary {
                scope: StorageScope::User,
                account_id: None,
                collection: row.get(0)?,
                document_id: row.get(1)?,
                updated_at: parse_time(&row.get::<_, String>(2)?)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn list_account_documents(&self, account_id: i64, collection: &str) -> AppResult<Vec<StoredDocumentSummary>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT account_id, collection, document_id, updated_at FROM account_documents
             WHERE account_id = ?1 AND collection = ?2 ORDER BY updated_at DESC, document_id ASC",
        )?;
        let rows = stmt.query_map(params![account_id, collection], |row| {
            Ok(StoredDocumentSummary {
                scope: StorageScope::Account,
                account_id: Some(row.get(0)?),
                collection: row.get(1)?,
                document_id: row.get(2)?,
                updated_at: parse_time(&row.get::<_, String>(3)?)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }
}

impl BoardGateway for Database {
    fn write_user_document<'a>(
        &'a self,
        collection: &'a str,
        document_id: &'a str,
        document: &'a Value,
    ) -> GatewayFuture<'a, WriteResponse> {
        Box::pin(async move { self.upsert_user_document(collection, document_id, document) })
    }

    fn write_account_document<'a>(
        &'a self,
        account_id: i64,
        collection: &'a str,
        document_id: &'a str,
        document: &'a Value,
    ) -> GatewayFuture<'a, WriteResponse> {
        Box::pin(async move { self.upsert_account_document(account_id, collection, document_id, document) })
    }

    fn read_user_document<'a>(&'a self, collection: &'a str, document_id: &'a str) -> GatewayFuture<'a, Option<Value>> {
        Box::pin(async move { self.get_user_document(collection, document_id) })
    }

    fn read_account_document<'a>(
        &'a self,
        account_id: i64,
        collection: &'a str,
        document_id: &'a str,
    ) -> GatewayFuture<'a, Option<Value>> {
        Box::pin(async move { self.get_account_document(account_id, collection, document_id) })
    }
}

fn written(document_id: &str, at: DateTime<Utc>) -> WriteResponse {
    WriteResponse {
        data: Some(json!({
            "documentId": document_id,
            "updatedAt": at.to_rfc3339(),
        })),
    }
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}
