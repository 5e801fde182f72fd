use crate::util::sanitize_name;

use super::schema::Database;
use super::types::{DatabaseError, Folder};

// ============================================================================
// Folder Operations
// ============================================================================

impl Database {
    /// All folders, ordered by name.
    pub async fn folders(&self) -> Result<Vec<Folder>, DatabaseError> {
        let folders = sqlx::query_as::<_, Folder>(
            "SELECT id, name, external_id FROM folders ORDER BY name COLLATE NOCASE, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(folders)
    }

    pub async fn folder_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Folder>, DatabaseError> {
        let folder = sqlx::query_as::<_, Folder>(
            "SELECT id, name, external_id FROM folders WHERE external_id = ?",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(folder)
    }

    /// Find or create a folder, linking it to `external_id` when given.
    ///
    /// Lookup order: by external id, then by name among unlinked folders.
    /// A linked folder whose name differs is renamed. Nothing is written when
    /// the folder already matches.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidName` if the name is empty after
    /// stripping control characters and whitespace.
    pub async fn ensure_folder(
        &self,
        name: &str,
        external_id: Option<&str>,
    ) -> Result<Folder, DatabaseError> {
        let name = sanitize_name(name);
        if name.is_empty() {
            return Err(DatabaseError::InvalidName(name));
        }

        let mut tx = self.pool.begin().await?;

        if let Some(external_id) = external_id {
            let linked = sqlx::query_as::<_, Folder>(
                "SELECT id, name, external_id FROM folders WHERE external_id = ?",
            )
            .bind(external_id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(mut folder) = linked {
                if folder.name != name {
                    sqlx::query("UPDATE folders SET name = ? WHERE id = ?")
                        .bind(&name)
                        .bind(folder.id)
                        .execute(&mut *tx)
                        .await?;
                    folder.name = name;
                }
                tx.commit().await?;
                return Ok(folder);
            }
        }

        let unlinked = sqlx::query_as::<_, Folder>(
            "SELECT id, name, external_id FROM folders WHERE name = ? AND external_id IS NULL ORDER BY id LIMIT 1",
        )
        .bind(&name)
        .fetch_optional(&mut *tx)
        .await?;

        let folder = match (unlinked, external_id) {
            (Some(mut folder), Some(external_id)) => {
                sqlx::query("UPDATE folders SET external_id = ? WHERE id = ?")
                    .bind(external_id)
                    .bind(folder.id)
                    .execute(&mut *tx)
                    .await?;
                folder.external_id = Some(external_id.to_string());
                folder
            }
            (Some(folder), None) => folder,
            (None, external_id) => {
                let (id,): (i64,) = sqlx::query_as(
                    "INSERT INTO folders (name, external_id) VALUES (?, ?) RETURNING id",
                )
                .bind(&name)
                .bind(external_id)
                .fetch_one(&mut *tx)
                .await?;
                Folder {
                    id,
                    name,
                    external_id: external_id.map(str::to_string),
                }
            }
        };

        tx.commit().await?;
        Ok(folder)
    }

    /// Returns `true` if the folder existed.
    pub async fn rename_folder(&self, folder_id: i64, name: &str) -> Result<bool, DatabaseError> {
        let name = sanitize_name(name);
        if name.is_empty() {
            return Err(DatabaseError::InvalidName(name));
        }
        let result = sqlx::query("UPDATE folders SET name = ? WHERE id = ? AND name != ?")
            .bind(&name)
            .bind(folder_id)
            .bind(&name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM folders WHERE id = ?")
            .bind(folder_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(exists.is_some())
    }

    /// Delete a folder. Its feeds stay subscribed; feeds in no other folder
    /// move to the account root. Returns the ids of the feeds it contained.
    pub async fn remove_folder(&self, folder_id: i64) -> Result<Vec<String>, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let hoisted: Vec<(String,)> =
            sqlx::query_as("SELECT feed_id FROM folder_feeds WHERE folder_id = ? ORDER BY feed_id")
                .bind(folder_id)
                .fetch_all(&mut *tx)
                .await?;

        // folder_feeds rows cascade
        sqlx::query("DELETE FROM folders WHERE id = ?")
            .bind(folder_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(hoisted.into_iter().map(|(id,)| id).collect())
    }
}
