//! Relational motor store
//!
//! Motor mnemonic/position arrays are persisted in a normalized
//! three-table schema: an identifier row per scan, a mnemonic row per
//! motor, and a position row per mnemonic, related by generated row ids.
//! This allows a variable-length named array of positions per scan
//! without a wide or sparse table.
//!
//! The pool is capped at a single connection, so concurrent writers
//! serialize here; inserts are transactional within this store only.

pub mod compile;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter};
use std::path::Path;
use tracing::debug;

use super::error::Result;
use super::record::MotorRecord;
use compile::MotorFilter;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS scan_ids (
    scan_id INTEGER PRIMARY KEY AUTOINCREMENT,
    sid FLOAT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS motor_mnes (
    motor_id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_id INTEGER NOT NULL REFERENCES scan_ids(scan_id),
    motor_mne VARCHAR(255) NOT NULL
);
CREATE TABLE IF NOT EXISTS motor_positions (
    motor_id INTEGER NOT NULL REFERENCES motor_mnes(motor_id),
    motor_position FLOAT
);
";

const SELECT_GROUPED: &str = "
SELECT s.sid, m.motor_mne, p.motor_position
FROM scan_ids s
JOIN motor_mnes m ON m.scan_id = s.scan_id
JOIN motor_positions p ON p.motor_id = m.motor_id
";

#[derive(Clone)]
pub struct MotorsDb {
    pool: Pool<SqliteConnectionManager>,
}

impl MotorsDb {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        Self::build(SqliteConnectionManager::file(db_path))
    }

    pub fn in_memory() -> Result<Self> {
        Self::build(SqliteConnectionManager::memory())
    }

    fn build(manager: SqliteConnectionManager) -> Result<Self> {
        // One connection: writers serialize here
        let pool = Pool::builder().max_size(1).build(manager)?;
        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute_batch("PRAGMA foreign_keys=ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Insert one motor record as a single transaction: the identifier
    /// row, then a mnemonic and position row per motor. Any failure
    /// (including a duplicate sid) rolls the whole record back. Returns
    /// the generated identifier row id.
    pub fn insert(&self, record: &MotorRecord) -> Result<i64> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        tx.execute("INSERT INTO scan_ids (sid) VALUES (?1)", params![record.sid])?;
        let scan_id = tx.last_insert_rowid();
        for (mne, pos) in &record.motors {
            tx.execute(
                "INSERT INTO motor_mnes (scan_id, motor_mne) VALUES (?1, ?2)",
                params![scan_id, mne],
            )?;
            let motor_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO motor_positions (motor_id, motor_position) VALUES (?1, ?2)",
                params![motor_id, pos],
            )?;
        }
        tx.commit()?;
        debug!(sid = record.sid, motors = record.motors.len(), "inserted motor record");
        Ok(scan_id)
    }

    /// Fetch the motor records for the given sids, mnemonic/position
    /// arrays reconstructed per identifier.
    pub fn query_by_sids(&self, sids: &[f64]) -> Result<Vec<MotorRecord>> {
        if sids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = placeholders(sids.len());
        let statement =
            format!("{SELECT_GROUPED} WHERE s.sid IN ({placeholders}) ORDER BY s.scan_id");
        let params: Vec<SqlValue> = sids.iter().map(|sid| SqlValue::Real(*sid)).collect();
        self.select_grouped(&statement, params)
    }

    /// Fetch the motor records satisfying every normalized filter entry.
    ///
    /// An identifier matches when, for each entry, it has a row for the
    /// entry's mnemonic whose position passes the entry's exact-set and
    /// bound clauses (both required when both present); matching is
    /// conjunctive across mnemonics.
    pub fn query_by_filter(&self, filters: &[MotorFilter]) -> Result<Vec<MotorRecord>> {
        if filters.is_empty() {
            return Ok(Vec::new());
        }
        let mut params: Vec<SqlValue> = Vec::new();
        let predicates: Vec<String> =
            filters.iter().map(|f| predicate(f, &mut params)).collect();
        let statement = format!(
            "{SELECT_GROUPED} WHERE s.scan_id IN (
                SELECT m.scan_id FROM motor_mnes m
                JOIN motor_positions p ON p.motor_id = m.motor_id
                WHERE {}
                GROUP BY m.scan_id
                HAVING COUNT(DISTINCT m.motor_mne) = ?
            ) ORDER BY s.scan_id",
            predicates.join(" OR ")
        );
        params.push(SqlValue::Integer(filters.len() as i64));
        debug!(filters = filters.len(), "querying motors db");
        self.select_grouped(&statement, params)
    }

    fn select_grouped(&self, statement: &str, params: Vec<SqlValue>) -> Result<Vec<MotorRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(statement)?;
        let rows = stmt.query_map(params_from_iter(params), |row| {
            Ok((row.get::<_, f64>(0)?, row.get::<_, String>(1)?, row.get::<_, f64>(2)?))
        })?;

        // Rows arrive ordered by identifier; group consecutive rows into records
        let mut records: Vec<MotorRecord> = Vec::new();
        for row in rows {
            let (sid, mne, pos) = row?;
            match records.last_mut() {
                Some(last) if last.sid == sid => {
                    last.motors.insert(mne, pos);
                }
                _ => {
                    let mut record = MotorRecord { sid, ..Default::default() };
                    record.motors.insert(mne, pos);
                    records.push(record);
                }
            }
        }
        Ok(records)
    }
}

/// Per-mnemonic WHERE clause; user values only ever travel as parameters
fn predicate(filter: &MotorFilter, params: &mut Vec<SqlValue>) -> String {
    let mut clause = String::from("(m.motor_mne = ?");
    params.push(SqlValue::Text(filter.mne.clone()));
    if !filter.exact.is_empty() {
        clause.push_str(&format!(
            " AND p.motor_position IN ({})",
            placeholders(filter.exact.len())
        ));
        params.extend(filter.exact.iter().map(|pos| SqlValue::Real(*pos)));
    }
    if let Some(min) = filter.min {
        clause.push_str(" AND p.motor_position >= ?");
        params.push(SqlValue::Real(min));
    }
    if let Some(max) = filter.max {
        clause.push_str(" AND p.motor_position <= ?");
        params.push(SqlValue::Real(max));
    }
    clause.push(')');
    clause
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motor_record(sid: f64, motors: &[(&str, f64)]) -> MotorRecord {
        MotorRecord {
            sid,
            motors: motors.iter().map(|(m, p)| (m.to_string(), *p)).collect(),
        }
    }

    fn seeded() -> MotorsDb {
        let db = MotorsDb::in_memory().unwrap();
        db.insert(&motor_record(1.0, &[("samx", 1.0), ("samz", -0.5)])).unwrap();
        db.insert(&motor_record(2.0, &[("samx", 2.0), ("samz", 0.5)])).unwrap();
        db.insert(&motor_record(3.0, &[("samx", 3.0), ("phi", 90.0)])).unwrap();
        db
    }

    fn row_counts(db: &MotorsDb, sid: f64) -> (i64, i64, i64) {
        let conn = db.pool.get().unwrap();
        let ids: i64 = conn
            .query_row("SELECT COUNT(*) FROM scan_ids WHERE sid = ?1", params![sid], |r| r.get(0))
            .unwrap();
        let mnes: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM motor_mnes m
                 JOIN scan_ids s ON s.scan_id = m.scan_id WHERE s.sid = ?1",
                params![sid],
                |r| r.get(0),
            )
            .unwrap();
        let positions: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM motor_positions p
                 JOIN motor_mnes m ON m.motor_id = p.motor_id
                 JOIN scan_ids s ON s.scan_id = m.scan_id WHERE s.sid = ?1",
                params![sid],
                |r| r.get(0),
            )
            .unwrap();
        (ids, mnes, positions)
    }

    #[test]
    fn test_insert_row_counts() {
        let db = MotorsDb::in_memory().unwrap();
        let record = motor_record(5.0, &[("x", 1.0), ("y", 2.0)]);
        db.insert(&record).unwrap();
        assert_eq!(row_counts(&db, 5.0), (1, 2, 2));
    }

    #[test]
    fn test_duplicate_sid_rolls_back() {
        let db = MotorsDb::in_memory().unwrap();
        db.insert(&motor_record(5.0, &[("x", 1.0), ("y", 2.0)])).unwrap();

        let err = db.insert(&motor_record(5.0, &[("z", 3.0)]));
        assert!(err.is_err());

        // Exactly the original rows remain: no duplicate, no partial leftover
        assert_eq!(row_counts(&db, 5.0), (1, 2, 2));
        let records = db.query_by_sids(&[5.0]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].motors, motor_record(5.0, &[("x", 1.0), ("y", 2.0)]).motors);
    }

    #[test]
    fn test_query_by_sids_groups_per_identifier() {
        let db = seeded();
        let records = db.query_by_sids(&[1.0, 3.0]).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sid, 1.0);
        assert_eq!(records[0].motors.get("samz"), Some(&-0.5));
        assert_eq!(records[1].sid, 3.0);
        assert_eq!(records[1].motors.get("phi"), Some(&90.0));
        assert!(db.query_by_sids(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_query_by_filter_exact() {
        let db = seeded();
        let records = db
            .query_by_filter(&[MotorFilter {
                mne: "samx".into(),
                exact: vec![2.0],
                ..Default::default()
            }])
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sid, 2.0);
        // The full record comes back, not just the filtered mnemonic
        assert_eq!(records[0].motors.len(), 2);
    }

    #[test]
    fn test_query_by_filter_inclusive_bounds() {
        let db = seeded();
        let records = db
            .query_by_filter(&[MotorFilter {
                mne: "samx".into(),
                min: Some(2.0),
                max: Some(3.0),
                ..Default::default()
            }])
            .unwrap();
        let sids: Vec<f64> = records.iter().map(|r| r.sid).collect();
        assert_eq!(sids, vec![2.0, 3.0]);
    }

    #[test]
    fn test_query_by_filter_conjunctive_across_mnemonics() {
        let db = seeded();
        let records = db
            .query_by_filter(&[
                MotorFilter { mne: "samx".into(), min: Some(0.0), ..Default::default() },
                MotorFilter { mne: "phi".into(), exact: vec![90.0], ..Default::default() },
            ])
            .unwrap();
        // Only sid 3 has both a matching samx and phi
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sid, 3.0);
    }

    #[test]
    fn test_query_set_and_bounds_both_required() {
        let db = seeded();
        // samx positions are 1.0, 2.0, 3.0; the set admits {1.0, 3.0},
        // the bound admits >= 2.0: only 3.0 satisfies both.
        let filter = MotorFilter {
            mne: "samx".into(),
            exact: vec![1.0, 3.0],
            min: Some(2.0),
            ..Default::default()
        };
        let records = db.query_by_filter(&[filter.clone()]).unwrap();
        let sids: Vec<f64> = records.iter().map(|r| r.sid).collect();
        assert_eq!(sids, vec![3.0]);

        // Same composition the other way round: bound admits {2.0, 3.0},
        // the set admits {2.0}: only 2.0 satisfies both.
        let filter = MotorFilter {
            mne: "samx".into(),
            exact: vec![2.0],
            min: Some(2.0),
            max: Some(3.0),
            ..Default::default()
        };
        let records = db.query_by_filter(&[filter]).unwrap();
        let sids: Vec<f64> = records.iter().map(|r| r.sid).collect();
        assert_eq!(sids, vec![2.0]);
    }

    #[test]
    fn test_query_existence_only() {
        let db = seeded();
        let records = db.query_by_filter(&[MotorFilter::existence("phi")]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sid, 3.0);
    }
}
