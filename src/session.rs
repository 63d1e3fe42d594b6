use crate::editor::upsert_widget;
use crate::errors::{AppError, AppResult};
use crate::layout::reconcile_with;
use crate::models::{BoardDocument, BoardsSettings, GridSettings, LayoutItem, SelectedBoard, StorageLocation, Widget};
use crate::persistence::{commit_board, load_board, BoardGateway, CommitOutcome};
use std::sync::Arc;
use std::sync::RwLock;
use tokio::sync::Mutex;

pub type UpdateListener = Arc<dyn Fn(&SelectedBoard) + Send + Sync>;

#[derive(Debug, Clone)]
struct ActiveBoard {
    board: SelectedBoard,
    location: StorageLocation,
}

/// Owns the selected board and adopts mutated documents only after the
/// gateway confirms the write.
#[derive(Clone)]
pub struct BoardSession {
    gateway: Arc<dyn BoardGateway>,
    collection: String,
    grid: GridSettings,
    active: Arc<Mutex<Option<ActiveBoard>>>,
    listener: Arc<RwLock<Option<UpdateListener>>>,
}

impl BoardSession {
    pub fn new(gateway: Arc<dyn BoardGateway>, settings: &BoardsSettings) -> Self {
        Self {
            gateway,
            collection: settings.collection.clone(),
            grid: settings.grid.clone(),
            active: Arc::new(Mutex::new(None)),
            listener: Arc::new(RwLock::new(None)),
        }
    }

    pub fn set_update_listener(&self, listener: UpdateListener) {
        match self.listener.write() {
            Ok(mut writer) => *writer = Some(listener),
            Err(_) => tracing::error!("board update listener lock poisoned"),
        }
    }

    pub async fn select_board(&self, board_id: &str, location: StorageLocation) -> AppResult<SelectedBoard> {
        let document = load_board(self.gateway.as_ref(), &location, &self.collection, board_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("board {} in {} storage", board_id, location.scope.as_str())))?;
        let board = SelectedBoard {
            id: board_id.to_string(),
            document,
        };
        self.open_board(board.clone(), location).await;
        Ok(board)
    }

    /// Makes an already loaded board the selected one.
    pub async fn open_board(&self, board: SelectedBoard, location: StorageLocation) {
        let mut active = self.active.lock().await;
        *active = Some(ActiveBoard { board, location });
    }

    pub async fn selected_board(&self) -> Option<SelectedBoard> {
        self.active.lock().await.as_ref().map(|active| active.board.clone())
    }

    pub async fn storage_location(&self) -> Option<StorageLocation> {
        self.active.lock().await.as_ref().map(|active| active.location.clone())
    }

    pub async fn clear(&self) {
        self.active.lock().await.take();
    }

    pub async fn apply_layout(&self, layout: &[LayoutItem]) -> AppResult<CommitOutcome> {
        let grid = self.grid.clone();
        self.commit_with(|document| Ok(reconcile_with(layout, document, &grid)))
            .await
    }

    pub async fn save_widget(&self, widget: Widget, widget_no: Option<usize>) -> AppResult<CommitOutcome> {
        self.commit_with(|document| upsert_widget(document, widget, widget_no))
            .await
    }

    async fn commit_with<F>(&self, mutate: F) -> AppResult<CommitOutcome>
    where
        F: FnOnce(&BoardDocument) -> AppResult<BoardDocument>,
    {
        let (board_id, location, current) = {
            let active = self.active.lock().await;
            let Some(active) = active.as_ref() else {
                return Err(AppError::NotFound("no board is selected".to_string()));
            };
            (
                active.board.id.clone(),
                active.location.clone(),
                active.board.document.clone(),
            )
        };

        let next = mutate(&current)?;
        let outcome = commit_board(self.gateway.as_ref(), &location, &self.collection, &board_id, &next).await?;
        if !outcome.is_updated() {
            return Ok(outcome);
        }

        let adopted = {
            let mut active = self.active.lock().await;
            match active.as_mut().filter(|active| active.board.id == board_id) {
                Some(active) => {
                    active.board.document = next;
                    Some(active.board.clone())
                }
                None => None,
            }
        };

        match adopted {
            Some(board) => {
                tracing::info!(board_id = %board_id, widgets = board.document.widgets.len(), "board committed");
                self.notify(&board);
            }
            None => tracing::debug!(board_id = %board_id, "board changed during commit; keeping current selection"),
        }
        Ok(outcome)
    }

    fn notify(&self, board: &SelectedBoard) {
        let listener = match self.listener.read() {
            Ok(reader) => reader.clone(),
            Err(_) => None,
        };
        if let Some(listener) = listener {
            listener(board);
        }
    }
}
