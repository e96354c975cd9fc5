use chrono::NaiveDate;

use crate::{
    fields::FieldRegistry,
    models::{Category, CategoryRules},
};

use super::PlacementError;

/// Read-only view over the field configuration answering eligibility
/// questions. Never mutates anything.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityChecker<'a> {
    fields: &'a FieldRegistry,
    rules: &'a CategoryRules,
}

impl<'a> EligibilityChecker<'a> {
    pub fn new(fields: &'a FieldRegistry, rules: &'a CategoryRules) -> Self {
        Self { fields, rules }
    }

    /// Unknown fields are not allowed. An empty active list allows every
    /// category.
    pub fn is_allowed(&self, category: &str, field_id: &str, date: NaiveDate) -> bool {
        self.check_placement(category, field_id, date).is_ok()
    }

    pub fn check_placement(
        &self,
        category: &str,
        field_id: &str,
        date: NaiveDate,
    ) -> Result<(), PlacementError> {
        let field = self
            .fields
            .get(field_id)
            .ok_or_else(|| PlacementError::UnknownField {
                field_id: field_id.to_string(),
            })?;

        let active = field.active_categories(date);
        if active.is_empty() {
            return Ok(());
        }

        let category = Category::from(category);
        if self.rules.any_admits(active, &category) {
            Ok(())
        } else {
            Err(PlacementError::CategoryNotAllowed {
                category: category.to_string(),
                field: field.name.clone(),
                date,
                permitted: active.to_vec(),
            })
        }
    }

    /// Fields `category` may use on `date`, in configuration order.
    pub fn allowed_fields(&self, category: &str, date: NaiveDate) -> Vec<&'a str> {
        self.fields
            .as_slice()
            .iter()
            .filter(|field| self.is_allowed(category, &field.id, date))
            .map(|field| field.id.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldConfig;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 14).unwrap()
    }

    fn registry_with(default: &[&str], on_day: &[&str]) -> FieldRegistry {
        let mut field = FieldConfig::new("f", "Feld F", 10);
        field.categories = default.iter().map(|c| c.to_string()).collect();
        field
            .date_categories
            .insert(day(), on_day.iter().map(|c| c.to_string()).collect());
        FieldRegistry::new(vec![field])
    }

    #[test]
    fn date_list_restricts_to_exact_category() {
        let fields = registry_with(&[], &["C-Jugend weiblich"]);
        let rules = CategoryRules::default();
        let checker = EligibilityChecker::new(&fields, &rules);

        assert!(checker.is_allowed("C-Jugend weiblich", "f", day()));
        assert!(!checker.is_allowed("C-Jugend männlich", "f", day()));
    }

    #[test]
    fn empty_lists_allow_everything() {
        let fields = registry_with(&[], &[]);
        let rules = CategoryRules::default();
        let checker = EligibilityChecker::new(&fields, &rules);

        assert!(checker.is_allowed("C-Jugend männlich", "f", day()));
        assert!(checker.is_allowed("Minis", "f", day()));
    }

    #[test]
    fn empty_date_list_falls_back_to_default() {
        let fields = registry_with(&["B-Jugend männlich"], &[]);
        let rules = CategoryRules::default();
        let checker = EligibilityChecker::new(&fields, &rules);

        assert!(checker.is_allowed("B-Jugend männlich", "f", day()));
        assert!(!checker.is_allowed("C-Jugend männlich", "f", day()));
    }

    #[test]
    fn youth_group_matches_by_token() {
        let rules = CategoryRules::default();

        let fields = registry_with(&[], &["E-Jugend gemischt"]);
        let checker = EligibilityChecker::new(&fields, &rules);
        assert!(checker.is_allowed("E-Jugend", "f", day()));

        let fields = registry_with(&[], &["D-Jugend weiblich"]);
        let checker = EligibilityChecker::new(&fields, &rules);
        assert!(!checker.is_allowed("E-Jugend", "f", day()));
    }

    #[test]
    fn unknown_field_fails_closed() {
        let fields = registry_with(&[], &[]);
        let rules = CategoryRules::default();
        let checker = EligibilityChecker::new(&fields, &rules);

        assert!(!checker.is_allowed("Minis", "elsewhere", day()));
        assert_eq!(
            checker.check_placement("Minis", "elsewhere", day()),
            Err(PlacementError::UnknownField {
                field_id: "elsewhere".into()
            })
        );
    }

    #[test]
    fn rejection_lists_permitted_categories() {
        let fields = registry_with(&[], &["C-Jugend weiblich", "B-Jugend weiblich"]);
        let rules = CategoryRules::default();
        let checker = EligibilityChecker::new(&fields, &rules);

        let err = checker
            .check_placement("A-Jugend männlich", "f", day())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "category 'A-Jugend männlich' is not allowed on Feld F on 2025-06-14; \
             permitted categories: C-Jugend weiblich, B-Jugend weiblich"
        );
    }

    #[test]
    fn allowed_fields_in_config_order() {
        let fields = FieldRegistry::defaults();
        let rules = CategoryRules::default();
        let checker = EligibilityChecker::new(&fields, &rules);

        assert_eq!(checker.allowed_fields("E-Jugend", day()), ["platz-1", "kleinfeld"]);
        assert_eq!(checker.allowed_fields("D-Jugend weiblich", day()), ["platz-1", "platz-3"]);
    }
}
