pub mod boards;
pub mod config;
pub mod db;
pub mod editor;
pub mod errors;
pub mod filters;
pub mod layout;
pub mod models;
pub mod normalizer;
pub mod persistence;
pub mod session;
pub mod table_view;

pub use crate::boards::{BoardView, BoardsCore, WidgetTableView};
pub use crate::errors::{AppError, AppResult};
pub use crate::normalizer::{normalize, FacetKey, NormalizedTable};
pub use crate::persistence::{BoardGateway, CommitOutcome};

use crate::db::StoredDocumentSummary;
use crate::models::{
    ActiveFilters, BoardsSettings, CommitResponse, RawResultEntry, SaveWidgetPayload, SelectBoardPayload, SelectedBoard,
    StorageScope, UpdateLayoutPayload,
};
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Handle a host keeps for the lifetime of the board surface.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<BoardsCore>,
}

impl AppState {
    pub fn new(settings: BoardsSettings) -> Result<Self, String> {
        let core = BoardsCore::new(settings).map_err(to_client_error)?;
        Ok(Self { core })
    }
}

pub async fn select_board(state: &AppState, payload: SelectBoardPayload) -> Result<SelectedBoard, String> {
    state.core.select_board(payload).await.map_err(to_client_error)
}

pub async fn get_selected_board(state: &AppState) -> Result<Option<SelectedBoard>, String> {
    Ok(state.core.session().selected_board().await)
}

pub async fn get_board_view(state: &AppState, active_filters: ActiveFilters) -> Result<BoardView, String> {
    state.core.board_view(&active_filters).await.map_err(to_client_error)
}

pub async fn update_board_layout(state: &AppState, payload: UpdateLayoutPayload) -> Result<CommitResponse, String> {
    state.core.update_layout(payload).await.map_err(to_client_error)
}

pub async fn save_board_widget(state: &AppState, payload: SaveWidgetPayload) -> Result<CommitResponse, String> {
    state.core.save_widget(payload).await.map_err(to_client_error)
}

pub fn list_boards(
    state: &AppState,
    scope: StorageScope,
    account_id: Option<i64>,
) -> Result<Vec<StoredDocumentSummary>, String> {
    state.core.list_boards(scope, account_id).map_err(to_client_error)
}

pub async fn refresh_widget_results(
    state: &AppState,
    widget_id: String,
    entries: Vec<RawResultEntry>,
    active_filters: ActiveFilters,
) -> Result<WidgetTableView, String> {
    state
        .core
        .widget_results(&widget_id, &entries, &active_filters)
        .await
        .map_err(to_client_error)
}

/// Installs a daily-rolling JSON log under `data_dir/logs`. `RUST_LOG`
/// overrides `default_filter`.
pub fn init_tracing(data_dir: &Path, default_filter: &str) -> Result<(), String> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(to_client_error)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "boards.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(to_client_error)
}

fn to_client_error(error: impl std::fmt::Display) -> String {
    error.to_string()
}
