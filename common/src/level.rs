use crate::channel::LevelHistory;
use serde::{Deserialize, Serialize};

/// Quality classification assigned to a channel for a given year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScientificValue {
    #[default]
    Unassigned,
    LevelZero,
    LevelOne,
    LevelTwo,
}

impl ScientificValue {
    /// Maps a registry level code. Unknown or absent codes are `Unassigned`.
    pub fn from_code(code: Option<&str>) -> Self {
        match code.map(str::trim) {
            Some("0") => ScientificValue::LevelZero,
            Some("1") => ScientificValue::LevelOne,
            Some("2") => ScientificValue::LevelTwo,
            _ => ScientificValue::Unassigned,
        }
    }
}

/// Resolves the level that applies to `year`.
///
/// Only an exact year match counts; years without a record are `Unassigned`.
/// Without a year the registry's current record is used.
pub fn resolve(history: &LevelHistory, year: Option<i32>) -> ScientificValue {
    match year {
        Some(year) => ScientificValue::from_code(history.level_for(year)),
        None => history
            .current()
            .map(|record| ScientificValue::from_code(record.level.as_deref()))
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LevelRecord;

    fn history() -> LevelHistory {
        LevelHistory::from_records(
            None,
            vec![LevelRecord::new(2020, "1"), LevelRecord::new(2022, "2")],
        )
    }

    #[test]
    fn test_exact_year_match() {
        assert_eq!(resolve(&history(), Some(2022)), ScientificValue::LevelTwo);
        assert_eq!(resolve(&history(), Some(2020)), ScientificValue::LevelOne);
    }

    #[test]
    fn test_gap_year_is_unassigned() {
        assert_eq!(resolve(&history(), Some(2021)), ScientificValue::Unassigned);
        assert_eq!(resolve(&history(), Some(2030)), ScientificValue::Unassigned);
        assert_eq!(resolve(&history(), Some(2019)), ScientificValue::Unassigned);
    }

    #[test]
    fn test_empty_history_is_unassigned() {
        let empty = LevelHistory::new();
        assert_eq!(resolve(&empty, Some(2024)), ScientificValue::Unassigned);
        assert_eq!(resolve(&empty, None), ScientificValue::Unassigned);
    }

    #[test]
    fn test_missing_year_uses_current_record() {
        assert_eq!(resolve(&history(), None), ScientificValue::Unassigned);

        let with_current =
            LevelHistory::from_records(Some(LevelRecord::new(2024, "0")), vec![]);
        assert_eq!(resolve(&with_current, None), ScientificValue::LevelZero);
    }

    #[test]
    fn test_unknown_codes_do_not_fail() {
        let history = LevelHistory::from_records(
            None,
            vec![
                LevelRecord::new(2020, "X"),
                LevelRecord {
                    year: 2021,
                    level: None,
                },
            ],
        );
        assert_eq!(resolve(&history, Some(2020)), ScientificValue::Unassigned);
        assert_eq!(resolve(&history, Some(2021)), ScientificValue::Unassigned);
        assert_eq!(ScientificValue::from_code(Some(" 2 ")), ScientificValue::LevelTwo);
    }
}
