use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot};

use crate::canvas::Raster;
use crate::db::Database;
use crate::recognition::RecognitionError;

/// Embedding application's side of a canvas session.
pub trait CanvasHost: Send + Sync {
    /// Latest composite canvas as a PNG data URL. An empty string means the
    /// canvas was reset.
    fn on_update_canvas(&self, raster: &str);

    fn on_recognition_error(&self, error: &RecognitionError);

    /// Clean canvas changed. Always followed by [`CanvasHost::on_update_canvas`].
    fn on_clean_canvas(&self, _clean: &Raster) {}
}

enum PersistCommand {
    Save { composite: Raster, clean: Raster },
    Flush(oneshot::Sender<()>),
}

/// Host that writes every canvas update to the `canvas_states` table,
/// optionally forwarding to another host (usually the UI).
///
/// Writes are applied in order by a background task; [`flush`](Self::flush)
/// waits for the queue to drain.
pub struct DatabaseCanvasHost {
    document_id: String,
    clean: Mutex<Raster>,
    commands: mpsc::UnboundedSender<PersistCommand>,
    forward: Option<Arc<dyn CanvasHost>>,
}

impl DatabaseCanvasHost {
    /// Must be called from within a tokio runtime.
    pub fn new(db: Database, document_id: impl Into<String>) -> Self {
        let document_id = document_id.into();
        let (commands, receiver) = mpsc::unbounded_channel();
        tokio::spawn(persist_loop(db, document_id.clone(), receiver));

        Self {
            document_id,
            clean: Mutex::new(Raster::empty()),
            commands,
            forward: None,
        }
    }

    pub fn forwarding_to(mut self, host: Arc<dyn CanvasHost>) -> Self {
        self.forward = Some(host);
        self
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.commands
            .send(PersistCommand::Flush(done_tx))
            .map_err(|_| anyhow!("canvas persistence task has stopped"))?;
        done_rx
            .await
            .map_err(|_| anyhow!("canvas persistence task dropped the flush request"))
    }

    fn current_clean(&self) -> Raster {
        match self.clean.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl CanvasHost for DatabaseCanvasHost {
    fn on_update_canvas(&self, raster: &str) {
        let composite = Raster::from_encoded(raster);
        // A reset clears both rasters.
        let clean = if composite.is_empty() {
            Raster::empty()
        } else {
            self.current_clean()
        };

        if self
            .commands
            .send(PersistCommand::Save { composite, clean })
            .is_err()
        {
            log::error!(
                "canvas persistence task stopped; update for {} not saved",
                self.document_id
            );
        }

        if let Some(host) = &self.forward {
            host.on_update_canvas(raster);
        }
    }

    fn on_recognition_error(&self, error: &RecognitionError) {
        match &self.forward {
            Some(host) => host.on_recognition_error(error),
            None => log::warn!("recognition failed for {}: {error}", self.document_id),
        }
    }

    fn on_clean_canvas(&self, clean: &Raster) {
        match self.clean.lock() {
            Ok(mut guard) => *guard = clean.clone(),
            Err(poisoned) => *poisoned.into_inner() = clean.clone(),
        }
        if let Some(host) = &self.forward {
            host.on_clean_canvas(clean);
        }
    }
}

async fn persist_loop(
    db: Database,
    document_id: String,
    mut receiver: mpsc::UnboundedReceiver<PersistCommand>,
) {
    while let Some(command) = receiver.recv().await {
        match command {
            PersistCommand::Save { composite, clean } => {
                if let Err(err) = db.upsert_canvas_state(&document_id, &composite, &clean).await {
                    log::error!("failed to persist canvas for {document_id}: {err:#}");
                }
            }
            PersistCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    log::debug!("canvas persistence for {document_id} stopped");
}
