//! SQLite storage for the match ledger

use crate::data::ledger::{Ledger, MatchRecord};
use crate::{Result, Surface, TennisError};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS matches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tourney_date TEXT NOT NULL,
                winner_name TEXT NOT NULL,
                loser_name TEXT NOT NULL,
                surface TEXT NOT NULL DEFAULT '',
                draw_size REAL NOT NULL DEFAULT 0,
                round TEXT NOT NULL DEFAULT '',
                score TEXT,
                winner_stats TEXT NOT NULL DEFAULT '[]',
                loser_stats TEXT NOT NULL DEFAULT '[]',
                UNIQUE(tourney_date, winner_name, loser_name, round)
            );

            CREATE TABLE IF NOT EXISTS ledger_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_matches_date ON matches(tourney_date);
            CREATE INDEX IF NOT EXISTS idx_matches_winner ON matches(winner_name);
            CREATE INDEX IF NOT EXISTS idx_matches_loser ON matches(loser_name);
            "#,
        )?;
        Ok(())
    }

    // ==================== Schema ====================

    /// Ordered stat names the stored matches were imported with
    pub fn stored_stats(&self) -> Result<Option<Vec<String>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM ledger_meta WHERE key = 'stats'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    // ==================== Match Operations ====================

    /// Import every match of a ledger in one transaction.
    ///
    /// The first import fixes the stat layout; later imports must match it.
    pub fn import_ledger(&mut self, ledger: &Ledger) -> Result<usize> {
        let stored = self.stored_stats()?;
        if let Some(stored) = &stored {
            if stored != ledger.stats() {
                return Err(TennisError::Schema(format!(
                    "ledger stats {:?} differ from stored stats {:?}",
                    ledger.stats(),
                    stored
                )));
            }
        }

        let tx = self.conn.transaction()?;
        if stored.is_none() {
            set_stats_on(&tx, ledger.stats())?;
        }
        for record in ledger.matches() {
            upsert_match_on(&tx, record)?;
        }
        tx.commit()?;
        log::info!("Imported {} matches", ledger.len());
        Ok(ledger.len())
    }

    /// Reassemble the stored matches into a ledger
    pub fn load_ledger(&self) -> Result<Ledger> {
        let stats = self.stored_stats()?.unwrap_or_default();
        let mut stmt = self.conn.prepare(
            "SELECT tourney_date, winner_name, loser_name, surface, draw_size,
                    round, score, winner_stats, loser_stats
             FROM matches
             ORDER BY tourney_date, id",
        )?;
        let matches = stmt
            .query_map([], Self::row_to_match)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ledger::new(stats, matches)
    }

    fn row_to_match(row: &rusqlite::Row) -> rusqlite::Result<MatchRecord> {
        let date_str: String = row.get(0)?;
        let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
        let surface: String = row.get(3)?;
        let draw_size: f64 = row.get(4)?;
        let round: String = row.get(5)?;

        Ok(MatchRecord {
            date,
            winner: row.get(1)?,
            loser: row.get(2)?,
            surface: Surface::parse(&surface),
            draw_size: draw_size as f32,
            round: Some(round).filter(|r| !r.is_empty()),
            score: row.get(6)?,
            winner_stats: Self::json_column(row, 7)?,
            loser_stats: Self::json_column(row, 8)?,
        })
    }

    fn json_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Vec<f32>> {
        let raw: String = row.get(idx)?;
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    // ==================== Statistics ====================

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let match_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM matches", [], |row| row.get(0))?;

        let player_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM (SELECT winner_name FROM matches UNION SELECT loser_name FROM matches)",
            [],
            |row| row.get(0),
        )?;

        let min_date: Option<String> = self
            .conn
            .query_row("SELECT MIN(tourney_date) FROM matches", [], |row| row.get(0))
            .optional()?
            .flatten();

        let max_date: Option<String> = self
            .conn
            .query_row("SELECT MAX(tourney_date) FROM matches", [], |row| row.get(0))
            .optional()?
            .flatten();

        Ok(DatabaseStats {
            player_count: player_count as usize,
            match_count: match_count as usize,
            earliest_match: min_date.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
            latest_match: max_date.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        })
    }
}

fn set_stats_on(conn: &Connection, stats: &[String]) -> Result<()> {
    conn.execute(
        "INSERT INTO ledger_meta (key, value) VALUES ('stats', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![serde_json::to_string(stats)?],
    )?;
    Ok(())
}

fn upsert_match_on(conn: &Connection, record: &MatchRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO matches (tourney_date, winner_name, loser_name, surface, draw_size,
                             round, score, winner_stats, loser_stats)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(tourney_date, winner_name, loser_name, round) DO UPDATE SET
            surface = excluded.surface,
            draw_size = excluded.draw_size,
            score = COALESCE(excluded.score, score),
            winner_stats = excluded.winner_stats,
            loser_stats = excluded.loser_stats
        "#,
        params![
            record.date.format("%Y-%m-%d").to_string(),
            record.winner,
            record.loser,
            record.surface.to_string(),
            record.draw_size as f64,
            record.round.clone().unwrap_or_default(),
            record.score,
            serde_json::to_string(&record.winner_stats)?,
            serde_json::to_string(&record.loser_stats)?,
        ],
    )?;
    Ok(())
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub player_count: usize,
    pub match_count: usize,
    pub earliest_match: Option<NaiveDate>,
    pub latest_match: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEDGER: &str = "\
tourney_date,surface,draw_size,winner_name,loser_name,round,w_ace,l_ace
20190101,Hard,32,Alice,Bea,R32,5,3
20190108,Clay,32,Bea,Cleo,R16,2,0
20190115,,16,Cleo,Alice,F,1,7
";

    #[test]
    fn test_create_database() {
        let db = Database::in_memory().unwrap();
        let stats = db.get_stats().unwrap();
        assert_eq!(stats.player_count, 0);
        assert_eq!(stats.match_count, 0);
        assert!(db.stored_stats().unwrap().is_none());
    }

    #[test]
    fn test_import_and_reload() {
        let mut db = Database::in_memory().unwrap();
        let ledger = Ledger::from_reader(LEDGER.as_bytes()).unwrap();
        assert_eq!(db.import_ledger(&ledger).unwrap(), 3);

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.match_count, 3);
        assert_eq!(stats.player_count, 3);
        assert_eq!(stats.earliest_match, NaiveDate::from_ymd_opt(2019, 1, 1));
        assert_eq!(stats.latest_match, NaiveDate::from_ymd_opt(2019, 1, 15));

        let reloaded = db.load_ledger().unwrap();
        assert_eq!(reloaded.stats(), ledger.stats());
        assert_eq!(reloaded.matches(), ledger.matches());
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let mut db = Database::in_memory().unwrap();
        let ledger = Ledger::from_reader(LEDGER.as_bytes()).unwrap();
        db.import_ledger(&ledger).unwrap();
        db.import_ledger(&ledger).unwrap();
        assert_eq!(db.get_stats().unwrap().match_count, 3);
    }

    #[test]
    fn test_import_rejects_different_stats() {
        let mut db = Database::in_memory().unwrap();
        let ledger = Ledger::from_reader(LEDGER.as_bytes()).unwrap();
        db.import_ledger(&ledger).unwrap();

        let other = "tourney_date,surface,draw_size,winner_name,loser_name,w_df,l_df\n20190101,Hard,32,A,B,1,2\n";
        let other = Ledger::from_reader(other.as_bytes()).unwrap();
        assert!(matches!(db.import_ledger(&other), Err(TennisError::Schema(_))));
    }

    #[test]
    fn test_failed_import_leaves_no_stat_layout() {
        let mut db = Database::in_memory().unwrap();
        db.conn
            .execute_batch(
                "CREATE TRIGGER reject_matches BEFORE INSERT ON matches
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let ledger = Ledger::from_reader(LEDGER.as_bytes()).unwrap();
        assert!(db.import_ledger(&ledger).is_err());
        assert!(db.stored_stats().unwrap().is_none());
        assert_eq!(db.get_stats().unwrap().match_count, 0);

        // A later import with another layout is not blocked by the failed one
        db.conn.execute_batch("DROP TRIGGER reject_matches").unwrap();
        let other = "tourney_date,surface,draw_size,winner_name,loser_name,w_df,l_df\n20190101,Hard,32,A,B,1,2\n";
        let other = Ledger::from_reader(other.as_bytes()).unwrap();
        assert_eq!(db.import_ledger(&other).unwrap(), 1);
        assert_eq!(db.stored_stats().unwrap(), Some(vec!["df".to_string()]));
    }
}
