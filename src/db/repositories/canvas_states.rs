use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::canvas::Raster;
use crate::db::{
    connection::Database,
    helpers::{invalid_column, parse_datetime},
    models::CanvasState,
};

fn row_to_canvas_state(row: &Row) -> Result<CanvasState, rusqlite::Error> {
    let updated_at: String = row.get("updated_at")?;

    Ok(CanvasState {
        document_id: row.get("document_id")?,
        composite: Raster::from_encoded(row.get::<_, String>("composite")?),
        clean: Raster::from_encoded(row.get::<_, String>("clean")?),
        updated_at: parse_datetime(&updated_at, "updated_at").map_err(invalid_column)?,
    })
}

impl Database {
    pub async fn get_canvas_state(&self, document_id: &str) -> Result<Option<CanvasState>> {
        let document_id = document_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT document_id, composite, clean, updated_at
                 FROM canvas_states
                 WHERE document_id = ?1",
            )?;

            let state = stmt
                .query_row(params![document_id], row_to_canvas_state)
                .optional()
                .context("failed to load canvas state")?;

            Ok(state)
        })
        .await
    }

    pub async fn upsert_canvas_state(
        &self,
        document_id: &str,
        composite: &Raster,
        clean: &Raster,
    ) -> Result<()> {
        let document_id = document_id.to_string();
        let composite = composite.as_str().to_string();
        let clean = clean.as_str().to_string();
        let updated_at = Utc::now().to_rfc3339();

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO canvas_states (document_id, composite, clean, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(document_id) DO UPDATE SET
                     composite = excluded.composite,
                     clean = excluded.clean,
                     updated_at = excluded.updated_at",
                params![document_id, composite, clean, updated_at],
            )
            .context("failed to upsert canvas state")?;
            Ok(())
        })
        .await
    }

    pub async fn delete_canvas_state(&self, document_id: &str) -> Result<bool> {
        let document_id = document_id.to_string();
        self.execute(move |conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM canvas_states WHERE document_id = ?1",
                    params![document_id],
                )
                .context("failed to delete canvas state")?;
            Ok(deleted > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn canvas_state_upsert_and_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(dir.path().join("canvas.db")).expect("open");

        assert!(db.get_canvas_state("doc").await.expect("get").is_none());

        let composite = Raster::from_encoded("data:image/png;base64,Q09NUA==");
        let clean = Raster::from_encoded("data:image/png;base64,Q0xFQU4=");
        db.upsert_canvas_state("doc", &composite, &clean)
            .await
            .expect("upsert");

        let state = db.get_canvas_state("doc").await.expect("get").expect("present");
        assert_eq!(state.composite, composite);
        assert_eq!(state.clean, clean);

        db.upsert_canvas_state("doc", &Raster::empty(), &Raster::empty())
            .await
            .expect("reset");
        let state = db.get_canvas_state("doc").await.expect("get").expect("present");
        assert!(state.composite.is_empty());
        assert!(state.clean.is_empty());

        assert!(db.delete_canvas_state("doc").await.expect("delete"));
        assert!(!db.delete_canvas_state("doc").await.expect("delete again"));
    }
}
