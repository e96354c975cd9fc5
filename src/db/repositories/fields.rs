use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Row};

use crate::{
    db::{helpers::to_u32, Database},
    models::FieldConfig,
};

fn row_to_field(row: &Row) -> Result<FieldConfig> {
    let categories: String = row.get("categories")?;
    let date_categories: String = row.get("date_categories")?;

    Ok(FieldConfig {
        id: row.get("id")?,
        name: row.get("name")?,
        match_minutes: to_u32(row.get("match_minutes")?, "match_minutes")?,
        break_minutes: to_u32(row.get("break_minutes")?, "break_minutes")?,
        halftime_minutes: to_u32(row.get("halftime_minutes")?, "halftime_minutes")?,
        two_halves: row.get("two_halves")?,
        categories: serde_json::from_str(&categories).context("failed to parse categories")?,
        date_categories: serde_json::from_str::<BTreeMap<NaiveDate, Vec<String>>>(&date_categories)
            .context("failed to parse date_categories")?,
    })
}

impl Database {
    /// Replaces the whole field set; order is preserved.
    pub async fn replace_field_configs(&self, fields: &[FieldConfig]) -> Result<()> {
        let fields = fields.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM field_configs", [])?;

            let now = Utc::now().to_rfc3339();
            for (position, field) in fields.iter().enumerate() {
                tx.execute(
                    "INSERT INTO field_configs (id, position, name, match_minutes, break_minutes, halftime_minutes, two_halves, categories, date_categories, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        field.id,
                        position as i64,
                        field.name,
                        field.match_minutes,
                        field.break_minutes,
                        field.halftime_minutes,
                        field.two_halves,
                        serde_json::to_string(&field.categories)?,
                        serde_json::to_string(&field.date_categories)?,
                        now,
                    ],
                )
                .with_context(|| format!("failed to store field {}", field.id))?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn list_field_configs(&self) -> Result<Vec<FieldConfig>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, match_minutes, break_minutes, halftime_minutes, two_halves, categories, date_categories
                 FROM field_configs
                 ORDER BY position",
            )?;

            let mut rows = stmt.query([])?;
            let mut fields = Vec::new();
            while let Some(row) = rows.next()? {
                fields.push(row_to_field(row)?);
            }
            Ok(fields)
        })
        .await
    }
}
