//! Historical match ledger loaded from CSV
//!
//! Paired `w_<stat>` / `l_<stat>` columns are discovered from the header and
//! validated up front so every record carries the same stat layout.

use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Result, Surface, TennisError};

/// Date layouts accepted for `tourney_date`, tried in order
pub const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y%m%d"];

const REQUIRED_COLUMNS: [&str; 5] = [
    "tourney_date",
    "winner_name",
    "loser_name",
    "draw_size",
    "surface",
];

/// Parse a ledger date in one of the accepted layouts
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// A single completed match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub date: NaiveDate,
    pub winner: String,
    pub loser: String,
    pub surface: Surface,
    pub draw_size: f32,
    pub round: Option<String>,
    pub score: Option<String>,
    /// Winner's value for each ledger stat, in `Ledger::stats` order
    pub winner_stats: Vec<f32>,
    pub loser_stats: Vec<f32>,
}

/// The flat table of historical results, ordered by date
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    /// Stat names without their `w_`/`l_` prefix
    stats: Vec<String>,
    matches: Vec<MatchRecord>,
}

impl Ledger {
    /// Build a ledger, sorting matches by date (ties keep their input order)
    pub fn new(stats: Vec<String>, mut matches: Vec<MatchRecord>) -> Result<Self> {
        if let Some(bad) = matches
            .iter()
            .find(|m| m.winner_stats.len() != stats.len() || m.loser_stats.len() != stats.len())
        {
            return Err(TennisError::ShapeMismatch(format!(
                "match {} vs {} on {} carries {}/{} stats, ledger declares {}",
                bad.winner,
                bad.loser,
                bad.date,
                bad.winner_stats.len(),
                bad.loser_stats.len(),
                stats.len()
            )));
        }
        matches.sort_by_key(|m| m.date);
        Ok(Ledger { stats, matches })
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            TennisError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to open ledger {}: {}", path.display(), e),
            ))
        })?;
        let ledger = Self::from_reader(file)?;
        log::info!(
            "Loaded {} matches with {} stats from {}",
            ledger.len(),
            ledger.stats.len(),
            path.display()
        );
        Ok(ledger)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = rdr.headers()?.clone();
        let schema = LedgerSchema::from_headers(&headers)?;
        if schema.stats.is_empty() {
            log::warn!("Ledger has no paired w_/l_ stat columns; features use results only");
        } else {
            log::debug!("Ledger stats: {:?}", schema.stats);
        }

        let mut matches = Vec::new();
        for (i, row) in rdr.records().enumerate() {
            let row = row?;
            // Header is line 1
            matches.push(schema.parse_row(&row, i + 2)?);
        }

        Self::new(schema.stats, matches)
    }

    /// Merge two ledgers with identical stat layouts
    pub fn merge(self, other: Ledger) -> Result<Self> {
        if self.stats != other.stats {
            return Err(TennisError::Schema(format!(
                "cannot merge ledgers with different stats: {:?} vs {:?}",
                self.stats, other.stats
            )));
        }
        let mut matches = self.matches;
        matches.extend(other.matches);
        Self::new(self.stats, matches)
    }

    pub fn stats(&self) -> &[String] {
        &self.stats
    }

    pub fn matches(&self) -> &[MatchRecord] {
        &self.matches
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Column positions resolved from a CSV header
struct LedgerSchema {
    date: usize,
    winner: usize,
    loser: usize,
    draw_size: usize,
    surface: usize,
    round: Option<usize>,
    score: Option<usize>,
    stats: Vec<String>,
    /// (w_ column, l_ column) per stat
    stat_columns: Vec<(usize, usize)>,
}

impl LedgerSchema {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| TennisError::Schema(format!("missing required column `{}`", name)))
        };

        for name in REQUIRED_COLUMNS {
            require(name)?;
        }

        let mut stats = Vec::new();
        let mut stat_columns = Vec::new();
        for (col, header) in headers.iter().enumerate() {
            if let Some(stat) = header.strip_prefix("w_") {
                let loser_col = find(&format!("l_{}", stat)).ok_or_else(|| {
                    TennisError::Schema(format!("column `{}` has no `l_{}` partner", header, stat))
                })?;
                stats.push(stat.to_string());
                stat_columns.push((col, loser_col));
            }
        }
        for header in headers.iter() {
            if let Some(stat) = header.strip_prefix("l_") {
                if !stats.iter().any(|s| s == stat) {
                    return Err(TennisError::Schema(format!(
                        "column `{}` has no `w_{}` partner",
                        header, stat
                    )));
                }
            }
        }

        Ok(LedgerSchema {
            date: require("tourney_date")?,
            winner: require("winner_name")?,
            loser: require("loser_name")?,
            draw_size: require("draw_size")?,
            surface: require("surface")?,
            round: find("round"),
            score: find("score"),
            stats,
            stat_columns,
        })
    }

    fn parse_row(&self, row: &csv::StringRecord, line: usize) -> Result<MatchRecord> {
        let cell = |col: usize| row.get(col).unwrap_or("");
        let optional = |col: Option<usize>| {
            col.map(cell)
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        };

        let raw_date = cell(self.date);
        let date = parse_date(raw_date).ok_or_else(|| {
            TennisError::Parse(format!("line {}: unrecognised tourney_date `{}`", line, raw_date))
        })?;

        let winner = cell(self.winner).to_string();
        let loser = cell(self.loser).to_string();
        if winner.is_empty() || loser.is_empty() {
            return Err(TennisError::Parse(format!("line {}: missing player name", line)));
        }

        let mut winner_stats = Vec::with_capacity(self.stats.len());
        let mut loser_stats = Vec::with_capacity(self.stats.len());
        for (stat, &(w_col, l_col)) in self.stats.iter().zip(&self.stat_columns) {
            winner_stats.push(parse_number(cell(w_col), line, stat)?);
            loser_stats.push(parse_number(cell(l_col), line, stat)?);
        }

        Ok(MatchRecord {
            date,
            winner,
            loser,
            surface: Surface::parse(cell(self.surface)),
            draw_size: parse_number(cell(self.draw_size), line, "draw_size")?,
            round: optional(self.round),
            score: optional(self.score),
            winner_stats,
            loser_stats,
        })
    }
}

/// Empty cells read as zero
fn parse_number(raw: &str, line: usize, column: &str) -> Result<f32> {
    if raw.is_empty() {
        return Ok(0.0);
    }
    raw.parse::<f32>().map_err(|_| {
        TennisError::Parse(format!("line {}: `{}` is not a number in {}", line, raw, column))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
tourney_date,surface,draw_size,winner_name,loser_name,score,round,w_ace,w_df,l_ace,l_df
20190107,Hard,32,Alice,Bea,6-4 6-4,R32,10,2,5,3
2019-01-01,Clay,64,Bea,Cleo,6-3 6-3,R64,4,,0,1
";

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2019, 1, 7).unwrap();
        assert_eq!(parse_date("2019-01-07"), Some(expected));
        assert_eq!(parse_date("20190107"), Some(expected));
        assert_eq!(parse_date("07/01/2019"), None);
    }

    #[test]
    fn test_load_sorts_and_pairs_stats() {
        let ledger = Ledger::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(ledger.stats(), &["ace".to_string(), "df".to_string()]);
        assert_eq!(ledger.len(), 2);

        let first = &ledger.matches()[0];
        assert_eq!(first.winner, "Bea");
        assert_eq!(first.surface, Surface::Clay);
        // Empty cell reads as zero
        assert_eq!(first.winner_stats, vec![4.0, 0.0]);
        assert_eq!(first.loser_stats, vec![0.0, 1.0]);
        assert_eq!(first.round.as_deref(), Some("R64"));
    }

    #[test]
    fn test_unpaired_column_rejected() {
        let csv = "tourney_date,surface,draw_size,winner_name,loser_name,w_ace\n20190101,Hard,32,A,B,1\n";
        let err = Ledger::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, TennisError::Schema(_)));

        let csv = "tourney_date,surface,draw_size,winner_name,loser_name,l_ace\n20190101,Hard,32,A,B,1\n";
        assert!(matches!(
            Ledger::from_reader(csv.as_bytes()),
            Err(TennisError::Schema(_))
        ));
    }

    #[test]
    fn test_missing_required_column() {
        let csv = "tourney_date,winner_name,loser_name,draw_size\n20190101,A,B,32\n";
        assert!(matches!(
            Ledger::from_reader(csv.as_bytes()),
            Err(TennisError::Schema(_))
        ));
    }

    #[test]
    fn test_bad_date_reports_line() {
        let csv = "tourney_date,surface,draw_size,winner_name,loser_name\n20190101,Hard,32,A,B\nJan 5,Hard,32,A,B\n";
        match Ledger::from_reader(csv.as_bytes()) {
            Err(TennisError::Parse(msg)) => assert!(msg.contains("line 3")),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_stable_sort_on_equal_dates() {
        let csv = "tourney_date,surface,draw_size,winner_name,loser_name\n\
20190101,Hard,32,A,B\n20190101,Hard,32,C,D\n20181231,Hard,32,E,F\n";
        let ledger = Ledger::from_reader(csv.as_bytes()).unwrap();
        let winners: Vec<&str> = ledger.matches().iter().map(|m| m.winner.as_str()).collect();
        assert_eq!(winners, vec!["E", "A", "C"]);
    }

    #[test]
    fn test_merge_interleaves_by_date() {
        let first = Ledger::from_reader(SAMPLE.as_bytes()).unwrap();
        let second = "tourney_date,surface,draw_size,winner_name,loser_name,w_ace,w_df,l_ace,l_df\n\
20190103,Grass,32,Cleo,Alice,7,1,2,2\n";
        let second = Ledger::from_reader(second.as_bytes()).unwrap();

        let merged = first.clone().merge(second).unwrap();
        let winners: Vec<&str> = merged.matches().iter().map(|m| m.winner.as_str()).collect();
        assert_eq!(winners, vec!["Bea", "Cleo", "Alice"]);

        let other = "tourney_date,surface,draw_size,winner_name,loser_name,w_ace,l_ace\n20190101,Hard,32,A,B,1,2\n";
        let other = Ledger::from_reader(other.as_bytes()).unwrap();
        assert!(matches!(first.merge(other), Err(TennisError::Schema(_))));
    }
}
