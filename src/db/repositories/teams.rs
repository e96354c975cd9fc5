use anyhow::Result;
use chrono::Utc;
use rusqlite::params;

use crate::{db::Database, registry::Roster};

impl Database {
    /// Registering a team twice is a no-op.
    pub async fn register_team(&self, category: &str, name: &str) -> Result<()> {
        let category = category.to_string();
        let name = name.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO teams (category, name, created_at) VALUES (?1, ?2, ?3)",
                params![category, name, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn load_roster(&self) -> Result<Roster> {
        self.execute(|conn| {
            let mut stmt = conn.prepare("SELECT category, name FROM teams ORDER BY id")?;
            let roster = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<Roster, _>>()?;
            Ok(roster)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roster_lists_teams_per_category() {
        let db = Database::open_in_memory().unwrap();
        db.register_team("Minis", "TV Nord").await.unwrap();
        db.register_team("Minis", "SG Süd").await.unwrap();
        db.register_team("Minis", "TV Nord").await.unwrap();
        db.register_team("C-Jugend weiblich", "HSG West").await.unwrap();

        let roster = db.load_roster().await.unwrap();
        assert_eq!(roster.teams_for("Minis"), ["TV Nord", "SG Süd"]);
        assert!(roster.accepts("C-Jugend weiblich", "HSG West"));
        assert!(!roster.accepts("C-Jugend weiblich", "TV Nord"));
        assert!(roster.accepts("E-Jugend", "anyone"));
    }
}
