//! SQLite-based storage for references, actions, recurrence rules, ledger
//! entries and suspensions.
//!
//! Every statement commits on its own except the multi-row deletes
//! (rule deletion and retirement), which run in one transaction.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{data_dir, migrations};
use crate::action::{Action, ActionResolver, ActionType, Category, Reference};
use crate::error::{CoreError, DatabaseError};
use crate::ledger::{CategoryTotal, EmissionsSummary, EntryFilter, LedgerEntry, NewLedgerEntry};
use crate::recurrence::{Interval, IntervalUnit, NewRule, RecurrenceRule, RulePayload};
use crate::suspension::SuspensionInterval;

const DATE_FORMAT: &str = "%Y-%m-%d";

// === Helper Functions ===

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn date_column(row: &Row, idx: usize) -> Result<NaiveDate, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn optional_date_column(row: &Row, idx: usize) -> Result<Option<NaiveDate>, rusqlite::Error> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn timestamp_column(row: &Row, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn payload_column(row: &Row, idx: usize) -> Result<RulePayload, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn parsed_column<T>(row: &Row, idx: usize) -> Result<T, rusqlite::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

fn encode_payload(payload: &RulePayload) -> Result<String, rusqlite::Error> {
    serde_json::to_string(payload).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn row_to_reference(row: &Row) -> Result<Reference, rusqlite::Error> {
    Ok(Reference {
        id: row.get(0)?,
        category: parsed_column(row, 1)?,
        code: row.get(2)?,
        label: row.get(3)?,
    })
}

fn row_to_action(row: &Row) -> Result<Action, rusqlite::Error> {
    Ok(Action {
        id: row.get(0)?,
        action_type: parsed_column(row, 1)?,
        category: parsed_column(row, 2)?,
        reference_id: row.get(3)?,
        label: row.get(4)?,
    })
}

fn row_to_rule(row: &Row) -> Result<RecurrenceRule, rusqlite::Error> {
    let count: u32 = row.get(4)?;
    let unit: IntervalUnit = parsed_column(row, 5)?;
    let interval = Interval::new(count, unit).map_err(|e| conversion_error(4, e))?;
    Ok(RecurrenceRule {
        id: row.get(0)?,
        action_id: row.get(1)?,
        payload: payload_column(row, 2)?,
        active: row.get(3)?,
        interval,
        start_date: date_column(row, 6)?,
        end_date: optional_date_column(row, 7)?,
    })
}

fn row_to_entry(row: &Row) -> Result<LedgerEntry, rusqlite::Error> {
    Ok(LedgerEntry {
        id: row.get(0)?,
        action_id: row.get(1)?,
        rule_id: row.get(2)?,
        params: payload_column(row, 3)?,
        emissions_kg: row.get(4)?,
        date: date_column(row, 5)?,
        created_at: timestamp_column(row, 6)?,
    })
}

fn row_to_suspension(row: &Row) -> Result<SuspensionInterval, rusqlite::Error> {
    Ok(SuspensionInterval {
        id: row.get(0)?,
        rule_id: row.get(1)?,
        start_date: date_column(row, 2)?,
        end_date: date_column(row, 3)?,
    })
}

const RULE_COLUMNS: &str =
    "id, action_id, params, active, interval_count, interval_unit, start_date, end_date";
const ENTRY_COLUMNS: &str = "id, action_id, rule_id, params, emissions_kg, entry_date, created_at";

/// SQLite database for the footprint ledger.
///
/// The handle is opened by the caller and borrowed by the reconciler; there
/// is no process-wide connection.
pub struct FootprintDb {
    conn: Connection,
}

impl FootprintDb {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data dir>/footprint.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("footprint.db");
        Self::open_at(&path)
    }

    /// Open (or create) the database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, CoreError> {
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    // === References and actions ===

    pub fn create_reference(
        &self,
        category: Category,
        code: Option<&str>,
        label: &str,
    ) -> Result<Reference, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO refs (category, code, label, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![category.as_str(), code, label, Utc::now().to_rfc3339()],
        )?;
        Ok(Reference {
            id: self.conn.last_insert_rowid(),
            category,
            code: code.map(str::to_string),
            label: label.to_string(),
        })
    }

    pub fn get_reference(&self, id: i64) -> Result<Option<Reference>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, category, code, label FROM refs WHERE id = ?1",
                params![id],
                row_to_reference,
            )
            .optional()
    }

    pub fn list_references(&self) -> Result<Vec<Reference>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, category, code, label FROM refs ORDER BY id ASC")?;
        let rows = stmt.query_map([], row_to_reference)?;
        rows.collect()
    }

    pub fn find_action(
        &self,
        action_type: ActionType,
        category: Category,
        reference_id: i64,
    ) -> Result<Option<Action>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, action_type, category, reference_id, label FROM actions
                 WHERE action_type = ?1 AND category = ?2 AND reference_id = ?3",
                params![action_type.as_str(), category.as_str(), reference_id],
                row_to_action,
            )
            .optional()
    }

    pub fn create_action(
        &self,
        action_type: ActionType,
        category: Category,
        reference_id: i64,
        label: &str,
    ) -> Result<Action, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO actions (action_type, category, reference_id, label) VALUES (?1, ?2, ?3, ?4)",
            params![action_type.as_str(), category.as_str(), reference_id, label],
        )?;
        Ok(Action {
            id: self.conn.last_insert_rowid(),
            action_type,
            category,
            reference_id,
            label: label.to_string(),
        })
    }

    pub fn get_action(&self, id: i64) -> Result<Option<Action>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, action_type, category, reference_id, label FROM actions WHERE id = ?1",
                params![id],
                row_to_action,
            )
            .optional()
    }

    pub fn list_actions(&self) -> Result<Vec<Action>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, action_type, category, reference_id, label FROM actions ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], row_to_action)?;
        rows.collect()
    }

    // === Recurrence rules ===

    pub fn create_rule(&self, rule: &NewRule) -> Result<RecurrenceRule, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO recurrence_rules (action_id, params, active, interval_count, interval_unit, start_date, end_date)
             VALUES (?1, ?2, 1, ?3, ?4, ?5, ?6)",
            params![
                rule.action_id,
                encode_payload(&rule.payload)?,
                rule.interval.count,
                rule.interval.unit.as_str(),
                format_date(rule.start_date),
                rule.end_date.map(format_date),
            ],
        )?;
        Ok(RecurrenceRule {
            id: self.conn.last_insert_rowid(),
            action_id: rule.action_id,
            payload: rule.payload.clone(),
            active: true,
            interval: rule.interval,
            start_date: rule.start_date,
            end_date: rule.end_date,
        })
    }

    pub fn get_rule(&self, id: i64) -> Result<Option<RecurrenceRule>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!("SELECT {RULE_COLUMNS} FROM recurrence_rules WHERE id = ?1"),
                params![id],
                row_to_rule,
            )
            .optional()
    }

    pub fn list_rules(&self) -> Result<Vec<RecurrenceRule>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {RULE_COLUMNS} FROM recurrence_rules ORDER BY id ASC"))?;
        let rows = stmt.query_map([], row_to_rule)?;
        rows.collect()
    }

    pub fn list_active_rules(&self) -> Result<Vec<RecurrenceRule>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM recurrence_rules WHERE active = 1 ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map([], row_to_rule)?;
        rows.collect()
    }

    /// Overwrite every field of a rule.
    pub fn update_rule(&self, rule: &RecurrenceRule) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE recurrence_rules
             SET action_id = ?2, params = ?3, active = ?4, interval_count = ?5,
                 interval_unit = ?6, start_date = ?7, end_date = ?8
             WHERE id = ?1",
            params![
                rule.id,
                rule.action_id,
                encode_payload(&rule.payload)?,
                rule.active,
                rule.interval.count,
                rule.interval.unit.as_str(),
                format_date(rule.start_date),
                rule.end_date.map(format_date),
            ],
        )?;
        Ok(())
    }

    pub fn set_rule_active(&self, id: i64, active: bool) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE recurrence_rules SET active = ?2 WHERE id = ?1",
            params![id, active],
        )?;
        Ok(())
    }

    pub fn set_rule_start(&self, id: i64, start_date: NaiveDate) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE recurrence_rules SET start_date = ?2 WHERE id = ?1",
            params![id, format_date(start_date)],
        )?;
        Ok(())
    }

    /// Delete a rule with its ledger entries and suspension in a single transaction.
    ///
    /// Returns the number of ledger entries removed.
    pub fn delete_rule_cascade(&self, id: i64) -> Result<usize, rusqlite::Error> {
        self.in_transaction(|conn| {
            let removed = conn.execute("DELETE FROM ledger_entries WHERE rule_id = ?1", params![id])?;
            conn.execute("DELETE FROM suspensions WHERE rule_id = ?1", params![id])?;
            conn.execute("DELETE FROM recurrence_rules WHERE id = ?1", params![id])?;
            Ok(removed)
        })
    }

    /// Remove a rule whose end date has passed.
    ///
    /// Its entries stay in the ledger as history, detached from the rule.
    /// Returns the number of entries detached.
    pub fn retire_rule(&self, id: i64) -> Result<usize, rusqlite::Error> {
        self.in_transaction(|conn| {
            let detached = conn.execute(
                "UPDATE ledger_entries SET rule_id = NULL WHERE rule_id = ?1",
                params![id],
            )?;
            conn.execute("DELETE FROM suspensions WHERE rule_id = ?1", params![id])?;
            conn.execute("DELETE FROM recurrence_rules WHERE id = ?1", params![id])?;
            Ok(detached)
        })
    }

    // === Ledger entries ===

    /// Insert an entry.
    ///
    /// Returns `None` when a rule-originated entry already exists for the
    /// same action and date.
    pub fn insert_entry(&self, entry: &NewLedgerEntry) -> Result<Option<i64>, rusqlite::Error> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO ledger_entries (action_id, rule_id, params, emissions_kg, entry_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.action_id,
                entry.rule_id,
                encode_payload(&entry.params)?,
                entry.emissions_kg,
                format_date(entry.date),
                Utc::now().to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Ok(Some(self.conn.last_insert_rowid()))
    }

    /// Whether any entry (one-off or rule-originated) exists for the action on `date`.
    pub fn entry_exists(&self, action_id: i64, date: NaiveDate) -> Result<bool, rusqlite::Error> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM ledger_entries WHERE action_id = ?1 AND entry_date = ?2",
            params![action_id, format_date(date)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Whether a rule-originated entry exists for the action on `date`.
    pub fn rule_entry_exists(&self, action_id: i64, date: NaiveDate) -> Result<bool, rusqlite::Error> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM ledger_entries
             WHERE action_id = ?1 AND entry_date = ?2 AND rule_id IS NOT NULL",
            params![action_id, format_date(date)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_entry(&self, id: i64) -> Result<Option<LedgerEntry>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = ?1"),
                params![id],
                row_to_entry,
            )
            .optional()
    }

    /// List entries matching `filter`, oldest first.
    pub fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<LedgerEntry>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries
             WHERE (?1 IS NULL OR rule_id = ?1)
               AND (?2 IS NULL OR action_id = ?2)
               AND (?3 IS NULL OR entry_date >= ?3)
               AND (?4 IS NULL OR entry_date <= ?4)
             ORDER BY entry_date ASC, id ASC"
        ))?;
        let rows = stmt.query_map(
            params![
                filter.rule_id,
                filter.action_id,
                filter.from.map(format_date),
                filter.to.map(format_date),
            ],
            row_to_entry,
        )?;
        rows.collect()
    }

    pub fn count_rule_entries(&self, rule_id: i64) -> Result<u64, rusqlite::Error> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM ledger_entries WHERE rule_id = ?1",
            params![rule_id],
            |row| row.get(0),
        )
    }

    /// Latest entry date of a rule that is not after `not_after`.
    pub fn latest_rule_entry_date(
        &self,
        rule_id: i64,
        not_after: NaiveDate,
    ) -> Result<Option<NaiveDate>, rusqlite::Error> {
        let raw: Option<String> = self.conn.query_row(
            "SELECT MAX(entry_date) FROM ledger_entries WHERE rule_id = ?1 AND entry_date <= ?2",
            params![rule_id, format_date(not_after)],
            |row| row.get(0),
        )?;
        raw.map(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_error(0, e)))
            .transpose()
    }

    /// Delete one entry. Returns whether a row was removed.
    pub fn delete_entry(&self, id: i64) -> Result<bool, rusqlite::Error> {
        let removed = self
            .conn
            .execute("DELETE FROM ledger_entries WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Retract a rule's entries dated within `[start, end]`.
    pub fn delete_rule_entries_between(
        &self,
        rule_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<usize, rusqlite::Error> {
        self.conn.execute(
            "DELETE FROM ledger_entries WHERE rule_id = ?1 AND entry_date >= ?2 AND entry_date <= ?3",
            params![rule_id, format_date(start), format_date(end)],
        )
    }

    /// Drop a rule's entries dated before `start` or after `end`.
    pub fn delete_rule_entries_outside(
        &self,
        rule_id: i64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<usize, rusqlite::Error> {
        self.conn.execute(
            "DELETE FROM ledger_entries
             WHERE rule_id = ?1
               AND ((?2 IS NOT NULL AND entry_date < ?2) OR (?3 IS NOT NULL AND entry_date > ?3))",
            params![rule_id, start.map(format_date), end.map(format_date)],
        )
    }

    /// Emissions per category for entries dated within the optional bounds.
    pub fn emissions_summary(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<EmissionsSummary, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT a.category, COUNT(*), COALESCE(SUM(e.emissions_kg), 0.0)
             FROM ledger_entries e
             JOIN actions a ON a.id = e.action_id
             WHERE (?1 IS NULL OR e.entry_date >= ?1)
               AND (?2 IS NULL OR e.entry_date <= ?2)
             GROUP BY a.category
             ORDER BY a.category ASC",
        )?;
        let rows = stmt.query_map(
            params![from.map(format_date), to.map(format_date)],
            |row| {
                Ok(CategoryTotal {
                    category: parsed_column(row, 0)?,
                    entries: row.get(1)?,
                    total_kg: row.get(2)?,
                })
            },
        )?;

        let mut summary = EmissionsSummary {
            from,
            to,
            ..EmissionsSummary::default()
        };
        for row in rows {
            let total = row?;
            summary.entries += total.entries;
            summary.total_kg += total.total_kg;
            summary.by_category.push(total);
        }
        Ok(summary)
    }

    // === Suspensions ===

    pub fn create_suspension(
        &self,
        rule_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<SuspensionInterval, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO suspensions (rule_id, start_date, end_date) VALUES (?1, ?2, ?3)",
            params![rule_id, format_date(start_date), format_date(end_date)],
        )?;
        Ok(SuspensionInterval {
            id: self.conn.last_insert_rowid(),
            rule_id,
            start_date,
            end_date,
        })
    }

    pub fn get_suspension(&self, id: i64) -> Result<Option<SuspensionInterval>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, rule_id, start_date, end_date FROM suspensions WHERE id = ?1",
                params![id],
                row_to_suspension,
            )
            .optional()
    }

    pub fn suspension_for_rule(
        &self,
        rule_id: i64,
    ) -> Result<Option<SuspensionInterval>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, rule_id, start_date, end_date FROM suspensions WHERE rule_id = ?1",
                params![rule_id],
                row_to_suspension,
            )
            .optional()
    }

    pub fn list_suspensions(&self) -> Result<Vec<SuspensionInterval>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, rule_id, start_date, end_date FROM suspensions ORDER BY id ASC")?;
        let rows = stmt.query_map([], row_to_suspension)?;
        rows.collect()
    }

    pub fn update_suspension_range(
        &self,
        id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE suspensions SET start_date = ?2, end_date = ?3 WHERE id = ?1",
            params![id, format_date(start_date), format_date(end_date)],
        )?;
        Ok(())
    }

    /// Delete a suspension row. Ledger entries are not touched.
    pub fn delete_suspension(&self, id: i64) -> Result<bool, rusqlite::Error> {
        let removed = self
            .conn
            .execute("DELETE FROM suspensions WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn in_transaction<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, rusqlite::Error> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        match f(&self.conn) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err)
            }
        }
    }
}

impl ActionResolver for FootprintDb {
    fn find_or_create_action(
        &self,
        action_type: ActionType,
        category: Category,
        reference_id: i64,
    ) -> crate::Result<Action> {
        if let Some(action) = self.find_action(action_type, category, reference_id)? {
            return Ok(action);
        }
        let reference = self
            .get_reference(reference_id)?
            .ok_or_else(|| CoreError::not_found("reference", reference_id))?;
        let label = format!("{} {}", action_type, reference.label);
        Ok(self.create_action(action_type, category, reference_id, &label)?)
    }

    fn reference_for_action(&self, action_id: i64) -> crate::Result<Reference> {
        let action = self
            .get_action(action_id)?
            .ok_or_else(|| CoreError::not_found("action", action_id))?;
        self.get_reference(action.reference_id)?
            .ok_or_else(|| CoreError::not_found("reference", action.reference_id))
    }
}
