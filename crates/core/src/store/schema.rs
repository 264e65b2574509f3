use rusqlite::Connection;

use crate::error::Result;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS images (
            dhash       INTEGER NOT NULL PRIMARY KEY,
            path        TEXT NOT NULL UNIQUE,
            size        INTEGER NOT NULL DEFAULT 0,
            created_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tags (
            label       TEXT NOT NULL PRIMARY KEY,
            description TEXT NOT NULL DEFAULT 'nothing yet'
        );

        CREATE TABLE IF NOT EXISTS image_urls (
            url         TEXT NOT NULL PRIMARY KEY,
            dhash       INTEGER NOT NULL REFERENCES images(dhash) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_image_urls_dhash ON image_urls(dhash);

        CREATE TABLE IF NOT EXISTS image_tags (
            label       TEXT NOT NULL REFERENCES tags(label) ON DELETE CASCADE,
            dhash       INTEGER NOT NULL REFERENCES images(dhash) ON DELETE CASCADE,
            PRIMARY KEY (label, dhash)
        );

        CREATE INDEX IF NOT EXISTS idx_image_tags_dhash ON image_tags(dhash);
        CREATE INDEX IF NOT EXISTS idx_image_tags_label ON image_tags(label);
        ",
    )?;
    Ok(())
}
