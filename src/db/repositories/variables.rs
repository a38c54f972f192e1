use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{invalid_column, parse_datetime},
    models::DocumentVariables,
};
use crate::variables::{StoreFuture, VariableStore, Variables};

fn row_to_document_variables(row: &Row) -> Result<DocumentVariables, rusqlite::Error> {
    let variables_json: String = row.get("variables")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(DocumentVariables {
        document_id: row.get("document_id")?,
        variables: serde_json::from_str(&variables_json).map_err(invalid_column)?,
        updated_at: parse_datetime(&updated_at, "updated_at").map_err(invalid_column)?,
    })
}

impl Database {
    pub async fn get_document_variables(
        &self,
        document_id: &str,
    ) -> Result<Option<DocumentVariables>> {
        let document_id = document_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT document_id, variables, updated_at
                 FROM document_variables
                 WHERE document_id = ?1",
            )?;

            let record = stmt
                .query_row(params![document_id], row_to_document_variables)
                .optional()
                .context("failed to load document variables")?;

            Ok(record)
        })
        .await
    }

    /// Replaces the stored dictionary for `document_id`.
    pub async fn upsert_document_variables(
        &self,
        document_id: &str,
        variables: &Variables,
    ) -> Result<()> {
        let document_id = document_id.to_string();
        let variables_json =
            serde_json::to_string(variables).context("failed to serialize variables")?;
        let updated_at = Utc::now().to_rfc3339();

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO document_variables (document_id, variables, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(document_id) DO UPDATE SET
                     variables = excluded.variables,
                     updated_at = excluded.updated_at",
                params![document_id, variables_json, updated_at],
            )
            .context("failed to upsert document variables")?;
            Ok(())
        })
        .await
    }

    pub async fn delete_document_variables(&self, document_id: &str) -> Result<bool> {
        let document_id = document_id.to_string();
        self.execute(move |conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM document_variables WHERE document_id = ?1",
                    params![document_id],
                )
                .context("failed to delete document variables")?;
            Ok(deleted > 0)
        })
        .await
    }
}

impl VariableStore for Database {
    fn load<'a>(&'a self, document_id: &'a str) -> StoreFuture<'a, Option<Variables>> {
        Box::pin(async move {
            Ok(self
                .get_document_variables(document_id)
                .await?
                .map(|record| record.variables))
        })
    }

    fn save<'a>(&'a self, document_id: &'a str, variables: &'a Variables) -> StoreFuture<'a, ()> {
        Box::pin(self.upsert_document_variables(document_id, variables))
    }
}
