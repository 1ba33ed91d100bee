use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;

/// Display identity of a message author.
#[derive(Debug, Clone, PartialEq)]
pub struct UserIdentity {
    pub id: i64,
    pub name: String,
    pub avatar: Option<String>,
}

/// A persisted chat message with its author's display fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: i64,
    pub text: String,
    /// Unix seconds, assigned at append time.
    pub sent_at: i64,
    pub author: UserIdentity,
}

/// Append-only message log plus user records, backed by SQLite.
///
/// Messages are only ever inserted; ids are assigned by the store and
/// strictly increase in append order.
pub struct MessageStore {
    conn: Connection,
}

impl MessageStore {
    pub fn open<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let store = Self {
            conn: Connection::open(path)?,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> SqlResult<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> SqlResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                avatar_path TEXT
            )",
            [],
        )?;

        // AUTOINCREMENT: ids keep increasing and are never reused.
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                text TEXT NOT NULL,
                sent_at INTEGER NOT NULL,
                author_id INTEGER NOT NULL REFERENCES users(id)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_author ON messages(author_id)",
            [],
        )?;

        Ok(())
    }

    /// Append a message; the store assigns the next id.
    pub fn append_message(
        &self,
        author: &UserIdentity,
        text: &str,
        sent_at: i64,
    ) -> SqlResult<Message> {
        self.conn.execute(
            "INSERT INTO messages (text, sent_at, author_id) VALUES (?1, ?2, ?3)",
            params![text, sent_at, author.id],
        )?;

        Ok(Message {
            id: self.conn.last_insert_rowid(),
            text: text.to_string(),
            sent_at,
            author: author.clone(),
        })
    }

    /// The `n` highest-id messages, newest first.
    pub fn query_top_n(&self, n: usize) -> SqlResult<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT m.id, m.text, m.sent_at, u.id, u.name, u.avatar_path
             FROM messages m
             JOIN users u ON u.id = m.author_id
             ORDER BY m.id DESC
             LIMIT ?1",
        )?;

        let messages = stmt
            .query_map(params![n as i64], row_to_message)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(messages)
    }

    /// All messages with an id greater than `after_id`, ascending.
    pub fn query_after(&self, after_id: i64) -> SqlResult<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT m.id, m.text, m.sent_at, u.id, u.name, u.avatar_path
             FROM messages m
             JOIN users u ON u.id = m.author_id
             WHERE m.id > ?1
             ORDER BY m.id ASC",
        )?;

        let messages = stmt
            .query_map(params![after_id], row_to_message)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(messages)
    }

    /// Find or create the user record for `name`.
    pub fn ensure_user(&self, name: &str) -> SqlResult<UserIdentity> {
        self.conn.execute(
            "INSERT OR IGNORE INTO users (name) VALUES (?1)",
            params![name],
        )?;

        self.conn.query_row(
            "SELECT id, name, avatar_path FROM users WHERE name = ?1",
            params![name],
            row_to_user,
        )
    }

    pub fn find_user(&self, id: i64) -> SqlResult<Option<UserIdentity>> {
        self.conn
            .query_row(
                "SELECT id, name, avatar_path FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .optional()
    }
}

fn row_to_message(row: &Row<'_>) -> SqlResult<Message> {
    Ok(Message {
        id: row.get(0)?,
        text: row.get(1)?,
        sent_at: row.get(2)?,
        author: UserIdentity {
            id: row.get(3)?,
            name: row.get(4)?,
            avatar: row.get(5)?,
        },
    })
}

fn row_to_user(row: &Row<'_>) -> SqlResult<UserIdentity> {
    Ok(UserIdentity {
        id: row.get(0)?,
        name: row.get(1)?,
        avatar: row.get(2)?,
    })
}
