pub mod schema;

use std::ffi::c_int;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{ffi, params, Connection};
use serde::Serialize;

use crate::error::{Error, Result};

/// Description applied to tags created without one.
pub const DEFAULT_TAG_DESCRIPTION: &str = "nothing yet";

/// One archived image. The perceptual fingerprint is the primary identity:
/// two files with the same fingerprint are the same image as far as the
/// archive is concerned, regardless of their bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    pub fingerprint: u64,
    pub path: PathBuf,
    pub size: u64,
    /// Unix timestamp of insertion (or of the last replace).
    pub created_at: i64,
}

/// Relational state behind the archive: images keyed by fingerprint, tags,
/// and the image→tag / image→url link tables.
///
/// Uniqueness and referential integrity are enforced by the storage engine,
/// not by callers: a racing pair of `add` calls for the same fingerprint
/// resolves to exactly one success and one `DuplicateFingerprint`, and
/// deleting an image or tag cascades its links away in the same statement.
pub trait ImageStore: Send + Sync {
    /// Insert a new image row with `created_at` set to now.
    fn add(&self, fingerprint: u64, path: &Path, size: u64) -> Result<()>;

    /// Rewrite path, size, and creation time of an existing row, keeping its
    /// tag and url links. Used when a higher-quality duplicate supersedes the
    /// stored file.
    fn replace(&self, fingerprint: u64, path: &Path, size: u64) -> Result<()>;

    /// Delete an image and, by cascade, all links referencing it.
    /// Deleting an absent fingerprint is a no-op.
    fn remove(&self, fingerprint: u64) -> Result<()>;

    fn find(&self, fingerprint: u64) -> Result<ImageRecord>;

    /// Link a source url to an image. A url can point to at most one image.
    fn add_url(&self, fingerprint: u64, url: &str) -> Result<()>;

    /// Link an existing tag to an existing image.
    fn add_tag(&self, fingerprint: u64, label: &str) -> Result<()>;

    /// Create a tag row. Labels are case-sensitive and unnormalized.
    fn create_tag(&self, label: &str, description: Option<&str>) -> Result<()>;

    /// Delete a tag and, by cascade, all its image links.
    /// Deleting an absent label is a no-op.
    fn remove_tag(&self, label: &str) -> Result<()>;

    /// Page through images carrying a tag, ordered by insertion
    /// (`created_at`, then fingerprint as the tie-break).
    fn find_by_tag(&self, label: &str, offset: u64, limit: u64) -> Result<Vec<ImageRecord>>;

    /// Fingerprint of the image a url was archived from.
    fn find_url(&self, url: &str) -> Result<u64>;

    /// Wipe all four relations. Irreversible.
    fn delete_all(&self) -> Result<()>;
}

/// SQLite-backed [`ImageStore`].
///
/// The connection sits behind a mutex: SQLite's write path is single-writer
/// anyway, and the serialized access is what makes the uniqueness constraint
/// on `dhash` a safe synchronization point for concurrent ingestions.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path with WAL mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Extended SQLite result code of a constraint violation, if that is what
/// the error is. Callers of the store never see these codes; each operation
/// maps them to the typed duplicate/dangling variants below.
fn extended_code(err: &rusqlite::Error) -> Option<c_int> {
    match err {
        rusqlite::Error::SqliteFailure(cause, _) => Some(cause.extended_code),
        _ => None,
    }
}

impl ImageStore for SqliteStore {
    fn add(&self, fingerprint: u64, path: &Path, size: u64) -> Result<()> {
        let path_str = path.to_string_lossy();
        let now = chrono::Utc::now().timestamp();
        self.conn()
            .execute(
                "INSERT INTO images (dhash, path, size, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![fingerprint as i64, path_str.as_ref(), size as i64, now],
            )
            .map_err(|err| match extended_code(&err) {
                Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => Error::DuplicateFingerprint(fingerprint),
                Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => Error::DuplicatePath(path_str.to_string()),
                _ => Error::Database(err),
            })?;
        Ok(())
    }

    fn replace(&self, fingerprint: u64, path: &Path, size: u64) -> Result<()> {
        let path_str = path.to_string_lossy();
        let now = chrono::Utc::now().timestamp();
        let changed = self
            .conn()
            .execute(
                "UPDATE images SET path = ?2, size = ?3, created_at = ?4 WHERE dhash = ?1",
                params![fingerprint as i64, path_str.as_ref(), size as i64, now],
            )
            .map_err(|err| match extended_code(&err) {
                Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => Error::DuplicatePath(path_str.to_string()),
                _ => Error::Database(err),
            })?;
        if changed == 0 {
            return Err(Error::ImageNotFound(fingerprint));
        }
        Ok(())
    }

    fn remove(&self, fingerprint: u64) -> Result<()> {
        self.conn().execute(
            "DELETE FROM images WHERE dhash = ?1",
            params![fingerprint as i64],
        )?;
        Ok(())
    }

    fn find(&self, fingerprint: u64) -> Result<ImageRecord> {
        self.conn()
            .query_row(
                "SELECT dhash, path, size, created_at FROM images WHERE dhash = ?1",
                params![fingerprint as i64],
                |row| {
                    Ok(ImageRecord {
                        fingerprint: row.get::<_, i64>(0)? as u64,
                        path: PathBuf::from(row.get::<_, String>(1)?),
                        size: row.get::<_, i64>(2)? as u64,
                        created_at: row.get(3)?,
                    })
                },
            )
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Error::ImageNotFound(fingerprint),
                other => Error::Database(other),
            })
    }

    fn add_url(&self, fingerprint: u64, url: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO image_urls (url, dhash) VALUES (?1, ?2)",
                params![url, fingerprint as i64],
            )
            .map_err(|err| match extended_code(&err) {
                Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => Error::DuplicateUrl(url.to_string()),
                Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
                    Error::DanglingReference(format!("image {fingerprint:#018x}"))
                }
                _ => Error::Database(err),
            })?;
        Ok(())
    }

    fn add_tag(&self, fingerprint: u64, label: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO image_tags (label, dhash) VALUES (?1, ?2)",
                params![label, fingerprint as i64],
            )
            .map_err(|err| match extended_code(&err) {
                Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => Error::DuplicateLink {
                    label: label.to_string(),
                    fingerprint,
                },
                Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => Error::DanglingReference(format!(
                    "tag {label:?} or image {fingerprint:#018x}"
                )),
                _ => Error::Database(err),
            })?;
        Ok(())
    }

    fn create_tag(&self, label: &str, description: Option<&str>) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO tags (label, description) VALUES (?1, ?2)",
                params![label, description.unwrap_or(DEFAULT_TAG_DESCRIPTION)],
            )
            .map_err(|err| match extended_code(&err) {
                Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => Error::DuplicateTag(label.to_string()),
                _ => Error::Database(err),
            })?;
        Ok(())
    }

    fn remove_tag(&self, label: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM tags WHERE label = ?1", params![label])?;
        Ok(())
    }

    fn find_by_tag(&self, label: &str, offset: u64, limit: u64) -> Result<Vec<ImageRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT images.dhash, images.path, images.size, images.created_at
             FROM image_tags INNER JOIN images ON image_tags.dhash = images.dhash
             WHERE image_tags.label = ?1
             ORDER BY images.created_at, images.dhash
             LIMIT ?2 OFFSET ?3",
        )?;
        let images = stmt
            .query_map(params![label, limit as i64, offset as i64], |row| {
                Ok(ImageRecord {
                    fingerprint: row.get::<_, i64>(0)? as u64,
                    path: PathBuf::from(row.get::<_, String>(1)?),
                    size: row.get::<_, i64>(2)? as u64,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(images)
    }

    fn find_url(&self, url: &str) -> Result<u64> {
        self.conn()
            .query_row(
                "SELECT dhash FROM image_urls WHERE url = ?1",
                params![url],
                |row| row.get::<_, i64>(0),
            )
            .map(|dhash| dhash as u64)
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Error::UrlNotFound(url.to_string()),
                other => Error::Database(other),
            })
    }

    fn delete_all(&self) -> Result<()> {
        // Image and tag deletes cascade through both link tables.
        self.conn().execute_batch(
            "BEGIN;
             DELETE FROM images;
             DELETE FROM tags;
             COMMIT;",
        )?;
        Ok(())
    }
}
