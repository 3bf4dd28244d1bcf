//! SQLite storage backend.

use crate::{Backend, DocumentId, Error, Filter, Result, RoleRecord, StoredDocument};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "opened sqlite store");
        Self::with_connection(conn)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS models (
                name TEXT PRIMARY KEY,
                schema TEXT NOT NULL,
                registered_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                model TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_model
                ON documents(model, created_at);
            CREATE TABLE IF NOT EXISTS roles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                permissions TEXT NOT NULL DEFAULT '[]'
            );
            "#,
        )?;
        Ok(())
    }
}

impl Backend for SqliteStore {
    fn register_model(&self, name: &str, schema: &Value) -> Result<()> {
        self.conn().execute(
            "INSERT INTO models (name, schema, registered_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET schema = excluded.schema",
            params![name, serde_json::to_string(schema)?, timestamp(&Utc::now())],
        )?;
        Ok(())
    }

    fn model_schema(&self, name: &str) -> Result<Option<Value>> {
        let schema: Option<String> = self
            .conn()
            .query_row("SELECT schema FROM models WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(schema.map(|s| serde_json::from_str(&s)).transpose()?)
    }

    fn find(&self, model: &str, filter: &Filter) -> Result<Vec<StoredDocument>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, model, data, created_at, updated_at FROM documents
             WHERE model = ?1 ORDER BY created_at, id",
        )?;

        let rows = stmt
            .query_map([model], read_document_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut documents = Vec::new();
        for row in rows {
            let document = row.into_document()?;
            if document.matches(filter) {
                documents.push(document);
            }
        }
        Ok(documents)
    }

    fn get(&self, model: &str, id: DocumentId) -> Result<Option<StoredDocument>> {
        self.conn()
            .query_row(
                "SELECT id, model, data, created_at, updated_at FROM documents
                 WHERE model = ?1 AND id = ?2",
                params![model, id.to_string()],
                read_document_row,
            )
            .optional()?
            .map(DocumentRow::into_document)
            .transpose()
    }

    fn save(&self, document: &StoredDocument) -> Result<()> {
        self.conn().execute(
            "INSERT INTO documents (id, model, data, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![
                document.id.to_string(),
                document.model,
                serde_json::to_string(&document.data)?,
                timestamp(&document.created_at),
                timestamp(&document.updated_at),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, model: &str, id: DocumentId) -> Result<()> {
        let changed = self.conn().execute(
            "DELETE FROM documents WHERE model = ?1 AND id = ?2",
            params![model, id.to_string()],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("{model}/{id}")));
        }
        Ok(())
    }

    fn create_role(&self, name: &str) -> Result<RoleRecord> {
        let conn = self.conn();
        if role_id_by_name(&conn, name)?.is_some() {
            return Err(Error::Conflict(format!("role '{name}' already exists")));
        }
        conn.execute("INSERT INTO roles (name) VALUES (?1)", [name])?;
        Ok(RoleRecord {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            permissions: Default::default(),
        })
    }

    fn role_by_id(&self, id: i64) -> Result<Option<RoleRecord>> {
        self.conn()
            .query_row(
                "SELECT id, name, permissions FROM roles WHERE id = ?1",
                [id],
                read_role_row,
            )
            .optional()?
            .map(RoleRow::into_record)
            .transpose()
    }

    fn role_by_name(&self, name: &str) -> Result<Option<RoleRecord>> {
        self.conn()
            .query_row(
                "SELECT id, name, permissions FROM roles WHERE name = ?1",
                [name],
                read_role_row,
            )
            .optional()?
            .map(RoleRow::into_record)
            .transpose()
    }

    fn list_roles(&self) -> Result<Vec<RoleRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, name, permissions FROM roles ORDER BY id")?;
        let rows = stmt
            .query_map([], read_role_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(RoleRow::into_record).collect()
    }

    fn rename_role(&self, id: i64, name: &str) -> Result<()> {
        let conn = self.conn();
        match role_id_by_name(&conn, name)? {
            Some(existing) if existing == id => return Ok(()),
            Some(_) => return Err(Error::Conflict(format!("role '{name}' already exists"))),
            None => {}
        }
        let changed = conn.execute("UPDATE roles SET name = ?1 WHERE id = ?2", params![name, id])?;
        if changed == 0 {
            return Err(Error::NotFound(format!("role {id}")));
        }
        Ok(())
    }

    fn delete_role(&self, id: i64) -> Result<()> {
        let changed = self.conn().execute("DELETE FROM roles WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(Error::NotFound(format!("role {id}")));
        }
        Ok(())
    }
}

fn role_id_by_name(conn: &Connection, name: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row("SELECT id FROM roles WHERE name = ?1", [name], |row| {
            row.get(0)
        })
        .optional()?)
}

/// Raw column values of a `documents` row.
struct DocumentRow {
    id: String,
    model: String,
    data: String,
    created_at: String,
    updated_at: String,
}

fn read_document_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get(0)?,
        model: row.get(1)?,
        data: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

impl DocumentRow {
    fn into_document(self) -> Result<StoredDocument> {
        Ok(StoredDocument {
            id: self
                .id
                .parse()
                .map_err(|e| Error::Corrupt(format!("document id {:?}: {e}", self.id)))?,
            model: self.model,
            data: serde_json::from_str(&self.data)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// Fixed-width RFC 3339, so that text order is time order.
fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    value
        .parse()
        .map_err(|e| Error::Corrupt(format!("timestamp {value:?}: {e}")))
}

/// Raw column values of a `roles` row.
struct RoleRow {
    id: i64,
    name: String,
    permissions: String,
}

fn read_role_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoleRow> {
    Ok(RoleRow {
        id: row.get(0)?,
        name: row.get(1)?,
        permissions: row.get(2)?,
    })
}

impl RoleRow {
    fn into_record(self) -> Result<RoleRecord> {
        Ok(RoleRecord {
            id: self.id,
            name: self.name,
            permissions: serde_json::from_str(&self.permissions)?,
        })
    }
}
