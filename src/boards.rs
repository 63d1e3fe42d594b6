use crate::db::{Database, StoredDocumentSummary};
use crate::errors::{AppError, AppResult};
use crate::filters::compile;
use crate::layout::{grid_layout, style_rules};
use crate::models::{
    ActiveFilters, BoardsSettings, CommitResponse, GridItem, RawResultEntry, SaveWidgetPayload, SelectBoardPayload,
    SelectedBoard, StorageScope, UpdateLayoutPayload,
};
use crate::normalizer::NormalizedTable;
use crate::session::BoardSession;
use crate::table_view::{HeaderCell, LogsLink, ResultTable};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    pub board: SelectedBoard,
    pub grid: Vec<GridItem>,
    pub styles: Vec<String>,
    pub filter_clause: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetTableView {
    pub widget_id: String,
    pub renormalized: bool,
    pub table: Arc<NormalizedTable>,
    pub header: Vec<HeaderCell>,
    pub logs_link: Option<LogsLink>,
}

/// Wires settings, storage and the board session for a host application.
#[derive(Clone)]
pub struct BoardsCore {
    db: Arc<Database>,
    session: BoardSession,
    settings: BoardsSettings,
    tables: Arc<Mutex<HashMap<String, ResultTable>>>,
    data_dir: PathBuf,
}

impl BoardsCore {
    pub fn new(settings: BoardsSettings) -> AppResult<Arc<Self>> {
        let data_dir = settings.data_dir.clone();
        let db = Arc::new(Database::new(&data_dir.join("boards.sqlite"))?);
        let session = BoardSession::new(db.clone(), &settings);
        tracing::info!(path = %db.db_path().to_string_lossy(), collection = %settings.collection, "board store ready");

        Ok(Arc::new(Self {
            db,
            session,
            settings,
            tables: Arc::new(Mutex::new(HashMap::new())),
            data_dir,
        }))
    }

    pub fn settings(&self) -> &BoardsSettings {
        &self.settings
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn session(&self) -> &BoardSession {
        &self.session
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn list_boards(&self, scope: StorageScope, account_id: Option<i64>) -> AppResult<Vec<StoredDocumentSummary>> {
        match scope {
            StorageScope::User => self.db.list_user_documents(&self.settings.collection),
            StorageScope::Account => {
                let account_id = account_id
                    .ok_or_else(|| AppError::Invalid("listing account boards needs an account id".to_string()))?;
                self.db.list_account_documents(account_id, &self.settings.collection)
            }
        }
    }

    pub async fn select_board(&self, payload: SelectBoardPayload) -> AppResult<SelectedBoard> {
        let board = self
            .session
            .select_board(&payload.board_id, payload.storage_location)
            .await?;
        self.tables.lock().await.clear();
        Ok(board)
    }

    pub async fn board_view(&self, active: &ActiveFilters) -> AppResult<BoardView> {
        let board = self
            .session
            .selected_board()
            .await
            .ok_or_else(|| AppError::NotFound("no board is selected".to_string()))?;
        Ok(BoardView {
            grid: grid_layout(&board.document, &self.settings.grid),
            styles: style_rules(&board.document),
            filter_clause: compile(&board.document.filters, active),
            board,
        })
    }

    pub async fn update_layout(&self, payload: UpdateLayoutPayload) -> AppResult<CommitResponse> {
        let outcome = self.session.apply_layout(&payload.layout).await?;
        Ok(CommitResponse {
            updated: outcome.is_updated(),
            board: self.session.selected_board().await,
        })
    }

    pub async fn save_widget(&self, payload: SaveWidgetPayload) -> AppResult<CommitResponse> {
        let outcome = self
            .session
            .save_widget(payload.widget, payload.widget_no)
            .await?;
        Ok(CommitResponse {
            updated: outcome.is_updated(),
            board: self.session.selected_board().await,
        })
    }

    /// Feeds a fresh result batch to a widget's table state.
    pub async fn widget_results(
        &self,
        widget_id: &str,
        entries: &[RawResultEntry],
        active: &ActiveFilters,
    ) -> AppResult<WidgetTableView> {
        let filters = self
            .session
            .selected_board()
            .await
            .map(|board| board.document.filters)
            .unwrap_or_default();

        let mut tables = self.tables.lock().await;
        let table = tables.entry(widget_id.to_string()).or_default();
        let renormalized = table.refresh(entries);
        Ok(WidgetTableView {
            widget_id: widget_id.to_string(),
            renormalized,
            table: table.table(),
            header: table.header(&filters),
            logs_link: table.logs_link(&filters, active),
        })
    }
}
