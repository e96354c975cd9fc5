//! Field configuration store: the ordered set of fields for the tournament.

mod defaults;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;

use crate::models::{FieldConfig, FieldTiming};

pub use defaults::default_fields;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldRegistry {
    fields: Vec<FieldConfig>,
}

impl FieldRegistry {
    pub fn new(fields: Vec<FieldConfig>) -> Self {
        Self { fields }
    }

    /// The built-in field set a fresh tournament starts with.
    pub fn defaults() -> Self {
        Self::new(default_fields())
    }

    pub fn get(&self, field_id: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|field| field.id == field_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldConfig> {
        self.fields.iter()
    }

    pub fn as_slice(&self) -> &[FieldConfig] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Replaces the field with the same id, or appends it.
    pub fn upsert(&mut self, field: FieldConfig) {
        match self.fields.iter_mut().find(|f| f.id == field.id) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    pub fn remove(&mut self, field_id: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|field| field.id != field_id);
        self.fields.len() != before
    }

    pub fn reset_to_defaults(&mut self) {
        self.fields = default_fields();
    }

    pub fn set_default_categories(&mut self, field_id: &str, categories: Vec<String>) -> Result<()> {
        let field = self.get_mut(field_id)?;
        field.categories = categories;
        Ok(())
    }

    /// Sets the allow-list for one day. An empty list clears the override.
    pub fn set_date_categories(
        &mut self,
        field_id: &str,
        date: NaiveDate,
        categories: Vec<String>,
    ) -> Result<()> {
        let field = self.get_mut(field_id)?;
        if categories.is_empty() {
            field.date_categories.remove(&date);
        } else {
            field.date_categories.insert(date, categories);
        }
        Ok(())
    }

    /// Timing for `field_id`, or a single-half fallback when the field is
    /// unknown. Callers decide whether the fallback is worth a warning.
    pub fn timing_for(&self, field_id: &str, fallback_minutes: u32) -> FieldTiming {
        self.get(field_id)
            .map(FieldConfig::timing)
            .unwrap_or_else(|| FieldTiming::fallback(fallback_minutes))
    }

    pub fn into_vec(self) -> Vec<FieldConfig> {
        self.fields
    }

    fn get_mut(&mut self, field_id: &str) -> Result<&mut FieldConfig> {
        self.fields
            .iter_mut()
            .find(|field| field.id == field_id)
            .ok_or_else(|| anyhow!("unknown field '{field_id}'"))
    }
}
