//! The narrow persistence contract the live loop depends on. Every call is
//! independent and safe to repeat.

use std::future::Future;

use anyhow::Result;
use chrono::NaiveDate;

use crate::models::{FieldConfig, Match, MatchStatus, Score};

use super::Database;

pub trait MatchStore: Clone + Send + Sync + 'static {
    fn save_match_status(
        &self,
        match_id: &str,
        status: MatchStatus,
        score: Option<Score>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn load_matches_for_date(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<Match>>> + Send;

    fn save_field_configs(
        &self,
        fields: &[FieldConfig],
    ) -> impl Future<Output = Result<()>> + Send;

    fn load_field_configs(&self) -> impl Future<Output = Result<Vec<FieldConfig>>> + Send;
}

impl MatchStore for Database {
    async fn save_match_status(
        &self,
        match_id: &str,
        status: MatchStatus,
        score: Option<Score>,
    ) -> Result<()> {
        self.update_match_status(match_id, status, score).await
    }

    async fn load_matches_for_date(&self, date: NaiveDate) -> Result<Vec<Match>> {
        self.list_matches_for_date(date).await
    }

    async fn save_field_configs(&self, fields: &[FieldConfig]) -> Result<()> {
        self.replace_field_configs(fields).await
    }

    async fn load_field_configs(&self) -> Result<Vec<FieldConfig>> {
        self.list_field_configs().await
    }
}
