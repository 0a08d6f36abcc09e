use parking_lot::Mutex;
use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;

pub struct Database {
    pub(super) conn: Mutex<Connection>,
}

impl Database {
    pub fn new(database_url: &str) -> SqliteResult<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let conn = Connection::open(database_url)?;
        let db = Self { conn: Mutex::new(conn) };
        db.init()?;
        log::info!("[db] Opened {}", database_url);
        Ok(db)
    }

    pub fn open_in_memory() -> SqliteResult<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> SqliteResult<()> {
        let conn = self.conn.lock();

        // Write-call outcomes, one row per submitted transaction
        conn.execute(
            "CREATE TABLE IF NOT EXISTS transactions (
                hash TEXT PRIMARY KEY,
                status TEXT NOT NULL DEFAULT 'pending',
                owner TEXT NOT NULL,
                contract_address TEXT NOT NULL,
                function_name TEXT NOT NULL,
                arguments TEXT NOT NULL DEFAULT '[]',
                native_value_sent TEXT NOT NULL DEFAULT '0',
                chain_id INTEGER NOT NULL,
                block_number INTEGER,
                gas_used TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_transactions_owner ON transactions(owner, created_at)",
            [],
        )?;

        Ok(())
    }
}
