use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::{
    db::{
        helpers::{format_date, format_slot, parse_date, parse_score, parse_slot, parse_status},
        Database,
    },
    models::{Match, MatchStatus, Score},
};

const MATCH_COLUMNS: &str =
    "id, match_date, slot, field_id, category, home, away, status, home_score, away_score";

fn row_to_match(row: &Row) -> Result<Match> {
    let date: String = row.get("match_date")?;
    let slot: String = row.get("slot")?;
    let status: String = row.get("status")?;

    Ok(Match {
        id: row.get("id")?,
        date: parse_date(&date, "match_date")?,
        slot: parse_slot(&slot, "slot")?,
        field_id: row.get("field_id")?,
        category: row.get("category")?,
        home: row.get("home")?,
        away: row.get("away")?,
        status: parse_status(&status)?,
        score: parse_score(row.get("home_score")?, row.get("away_score")?)?,
    })
}

impl Database {
    /// Inserts or fully overwrites a match.
    pub async fn upsert_match(&self, record: &Match) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO matches (id, match_date, slot, field_id, category, home, away, status, home_score, away_score, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                 ON CONFLICT(id) DO UPDATE SET
                     match_date = excluded.match_date,
                     slot = excluded.slot,
                     field_id = excluded.field_id,
                     category = excluded.category,
                     home = excluded.home,
                     away = excluded.away,
                     status = excluded.status,
                     home_score = excluded.home_score,
                     away_score = excluded.away_score,
                     updated_at = excluded.updated_at",
                params![
                    record.id,
                    format_date(record.date),
                    format_slot(record.slot),
                    record.field_id,
                    record.category,
                    record.home,
                    record.away,
                    record.status.as_str(),
                    record.score.map(|s| s.home),
                    record.score.map(|s| s.away),
                    now,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Writing the same status twice is a no-op apart from `updated_at`.
    pub async fn update_match_status(
        &self,
        match_id: &str,
        status: MatchStatus,
        score: Option<Score>,
    ) -> Result<()> {
        let match_id = match_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE matches
                 SET status = ?1,
                     home_score = COALESCE(?2, home_score),
                     away_score = COALESCE(?3, away_score),
                     updated_at = ?4
                 WHERE id = ?5",
                params![
                    status.as_str(),
                    score.map(|s| s.home),
                    score.map(|s| s.away),
                    Utc::now().to_rfc3339(),
                    match_id,
                ],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("Match not found: {match_id}"));
            }
            Ok(())
        })
        .await
    }

    pub async fn get_match(&self, match_id: &str) -> Result<Option<Match>> {
        let match_id = match_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MATCH_COLUMNS} FROM matches WHERE id = ?1"
            ))?;
            let record = stmt
                .query_row(params![match_id], |row| Ok(row_to_match(row)))
                .optional()?
                .transpose()?;
            Ok(record)
        })
        .await
    }

    pub async fn list_matches_for_date(&self, date: NaiveDate) -> Result<Vec<Match>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MATCH_COLUMNS} FROM matches
                 WHERE match_date = ?1
                 ORDER BY slot, field_id, id"
            ))?;

            let mut rows = stmt.query(params![format_date(date)])?;
            let mut matches = Vec::new();
            while let Some(row) = rows.next()? {
                matches.push(row_to_match(row)?);
            }
            Ok(matches)
        })
        .await
    }

    /// Deleting a match that is already gone is not an error.
    pub async fn delete_match(&self, match_id: &str) -> Result<()> {
        let match_id = match_id.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM matches WHERE id = ?1", params![match_id])?;
            Ok(())
        })
        .await
    }
}
