//! Action Journal
//!
//! Append-only record of every automation step: decisions, dispatches,
//! and the structured outcomes that came back. Rows are never updated
//! after insert; the monitor reads recent history straight from here.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::ActionEvent;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: String,
    pub ts: i64,
    pub kind: String,
    pub action: Option<String>,
    pub label: Option<String>,
    pub from_index: Option<i64>,
    pub to_index: Option<i64>,
    /// u128 amounts stored as decimal text.
    pub amount: Option<String>,
    pub rate_gap_bps: Option<i64>,
    pub success: Option<bool>,
    pub data_hex: Option<String>,
    pub reason: Option<String>,
}

impl ActionRecord {
    pub fn from_event(ev: &ActionEvent) -> Self {
        let base = Self {
            id: Uuid::new_v4().to_string(),
            ts: Utc::now().timestamp(),
            kind: String::new(),
            action: None,
            label: None,
            from_index: None,
            to_index: None,
            amount: None,
            rate_gap_bps: None,
            success: None,
            data_hex: None,
            reason: None,
        };
        match ev {
            ActionEvent::Triggered {
                action,
                from_index,
                to_index,
                amount,
                rate_gap_bps,
            } => Self {
                kind: "triggered".to_string(),
                action: Some(action.clone()),
                from_index: Some(*from_index as i64),
                to_index: Some(*to_index as i64),
                amount: Some(amount.to_string()),
                rate_gap_bps: Some(*rate_gap_bps as i64),
                ..base
            },
            ActionEvent::Executed {
                label,
                success,
                data,
                reason,
            } => Self {
                kind: "executed".to_string(),
                label: Some(label.clone()),
                success: Some(*success),
                data_hex: Some(data.clone()),
                reason: reason.clone(),
                ..base
            },
        }
    }
}

#[derive(Clone)]
pub struct ActionJournal {
    conn: Arc<Mutex<Connection>>,
}

impl ActionJournal {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open action journal")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS action_events (
                id TEXT PRIMARY KEY,
                ts INTEGER NOT NULL,
                kind TEXT NOT NULL,
                action TEXT,
                label TEXT,
                from_index INTEGER,
                to_index INTEGER,
                amount TEXT,
                rate_gap_bps INTEGER,
                success INTEGER,
                data_hex TEXT,
                reason TEXT
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_action_events_ts ON action_events(ts DESC)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn insert(&self, rec: &ActionRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO action_events \
             (id, ts, kind, action, label, from_index, to_index, amount, rate_gap_bps, success, data_hex, reason) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                &rec.id,
                rec.ts,
                &rec.kind,
                rec.action.as_deref(),
                rec.label.as_deref(),
                rec.from_index,
                rec.to_index,
                rec.amount.as_deref(),
                rec.rate_gap_bps,
                rec.success,
                rec.data_hex.as_deref(),
                rec.reason.as_deref(),
            ],
        )?;
        Ok(())
    }

    pub async fn list_recent(&self, limit: usize) -> Result<Vec<ActionRecord>> {
        let limit = limit.clamp(1, 1000) as i64;
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, ts, kind, action, label, from_index, to_index, amount, rate_gap_bps, success, data_hex, reason \
             FROM action_events ORDER BY ts DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(ActionRecord {
                id: row.get(0)?,
                ts: row.get(1)?,
                kind: row.get(2)?,
                action: row.get(3)?,
                label: row.get(4)?,
                from_index: row.get(5)?,
                to_index: row.get(6)?,
                amount: row.get(7)?,
                rate_gap_bps: row.get(8)?,
                success: row.get(9)?,
                data_hex: row.get(10)?,
                reason: row.get(11)?,
            })
        })?;

        let mut out = Vec::new();
        for r in rows {
            if let Ok(v) = r {
                out.push(v);
            }
        }
        Ok(out)
    }
}
