//! Transactions table - write-call records
//!
//! Amounts are stored as decimal strings. The final transition only matches
//! rows that are still pending, so a record cannot be moved twice.

use chrono::{DateTime, Utc};
use ethers::types::U256;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Result as SqliteResult, Row, params};
use std::str::FromStr;

use crate::contract::{TransactionRecord, TransactionStore, TransactionUpdate, TxStatus};
use crate::db::Database;

const COLUMNS: &str = "hash, status, owner, contract_address, function_name, arguments, native_value_sent,
                       chain_id, block_number, gas_used, error, created_at, updated_at";

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_amount(idx: usize, value: &str) -> SqliteResult<U256> {
    U256::from_dec_str(value).map_err(|e| conversion_error(idx, format!("Invalid amount '{}': {:?}", value, e)))
}

fn parse_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn row_to_record(row: &Row<'_>) -> SqliteResult<TransactionRecord> {
    let status: String = row.get(1)?;
    let arguments: String = row.get(5)?;
    let native_value: String = row.get(6)?;
    let chain_id: i64 = row.get(7)?;
    let block_number: Option<i64> = row.get(8)?;
    let gas_used: Option<String> = row.get(9)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;

    Ok(TransactionRecord {
        hash: row.get(0)?,
        status: TxStatus::from_str(&status).map_err(|e| conversion_error(1, format!("{}: {}", status, e)))?,
        owner: row.get(2)?,
        contract_address: row.get(3)?,
        function_name: row.get(4)?,
        arguments: serde_json::from_str(&arguments).unwrap_or_default(),
        native_value_sent: parse_amount(6, &native_value)?,
        chain_id: chain_id as u64,
        block_number: block_number.map(|n| n as u64),
        gas_used: gas_used.as_deref().map(|g| parse_amount(9, g)).transpose()?,
        error: row.get(10)?,
        created_at: parse_time(&created_at),
        updated_at: parse_time(&updated_at),
        persisted: true,
    })
}

impl Database {
    pub fn insert_transaction(&self, record: &TransactionRecord) -> SqliteResult<()> {
        let conn = self.conn.lock();
        let arguments = serde_json::to_string(&record.arguments).unwrap_or_else(|_| "[]".to_string());

        conn.execute(
            "INSERT INTO transactions (hash, status, owner, contract_address, function_name, arguments,
                                       native_value_sent, chain_id, block_number, gas_used, error,
                                       created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                record.hash,
                record.status.as_ref(),
                record.owner,
                record.contract_address,
                record.function_name,
                arguments,
                record.native_value_sent.to_string(),
                record.chain_id as i64,
                record.block_number.map(|n| n as i64),
                record.gas_used.map(|g| g.to_string()),
                record.error,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Apply the final status. Returns false when no pending row matched.
    pub fn finalize_transaction(&self, hash: &str, update: &TransactionUpdate) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE transactions
             SET status = ?1, block_number = ?2, gas_used = ?3, error = ?4, updated_at = ?5
             WHERE hash = ?6 AND status = 'pending'",
            params![
                update.status.as_ref(),
                update.block_number.map(|n| n as i64),
                update.gas_used.map(|g| g.to_string()),
                update.error,
                update.updated_at.to_rfc3339(),
                hash,
            ],
        )?;
        Ok(rows > 0)
    }

    pub fn get_transaction(&self, hash: &str) -> SqliteResult<Option<TransactionRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM transactions WHERE hash = ?1", COLUMNS),
            params![hash],
            row_to_record,
        )
        .optional()
    }

    /// Newest first, optionally for one owner
    pub fn list_transactions(&self, owner: Option<&str>, limit: usize) -> SqliteResult<Vec<TransactionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions
             WHERE (?1 IS NULL OR owner = ?1)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
            COLUMNS
        ))?;

        let records = stmt
            .query_map(params![owner, limit as i64], row_to_record)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(records)
    }
}

impl TransactionStore for Database {
    fn insert(&self, record: &TransactionRecord) -> Result<(), String> {
        self.insert_transaction(record)
            .map_err(|e| format!("Failed to insert transaction {}: {}", record.hash, e))
    }

    fn update(&self, hash: &str, update: &TransactionUpdate) -> Result<(), String> {
        match self.finalize_transaction(hash, update) {
            Ok(true) => Ok(()),
            Ok(false) => Err(format!("No pending transaction {}", hash)),
            Err(e) => Err(format!("Failed to update transaction {}: {}", hash, e)),
        }
    }
}
