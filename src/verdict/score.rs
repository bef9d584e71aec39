//! Row-wise agreement between produced and expected output text.

use crate::dataset::Column;
use serde::{Deserialize, Serialize};

/// Agreement on one output column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnAgreement {
    pub column: String,
    pub matched: usize,
    pub total: usize,
}

impl ColumnAgreement {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.matched as f64 / self.total as f64
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub columns: Vec<ColumnAgreement>,
    /// Minimum fraction across columns.
    pub score: f64,
}

/// Produced rows that cannot be lined up with the expected table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeMismatch {
    /// Offending row, or `None` when the row count itself differs.
    pub row: Option<usize>,
    pub expected: usize,
    pub actual: usize,
}

/// Score `produced` against `expected`, both row-major text tables.
///
/// Text equality is exact; no numeric tolerance.
pub fn score_outputs(
    columns: &[Column],
    expected: &[Vec<String>],
    produced: &[Vec<String>],
) -> Result<ScoreCard, ShapeMismatch> {
    if produced.len() != expected.len() {
        return Err(ShapeMismatch {
            row: None,
            expected: expected.len(),
            actual: produced.len(),
        });
    }
    if let Some((row, values)) = produced
        .iter()
        .enumerate()
        .find(|(_, values)| values.len() != columns.len())
    {
        return Err(ShapeMismatch {
            row: Some(row),
            expected: columns.len(),
            actual: values.len(),
        });
    }

    let agreements: Vec<ColumnAgreement> = columns
        .iter()
        .enumerate()
        .map(|(index, column)| ColumnAgreement {
            column: column.name.clone(),
            matched: expected
                .iter()
                .zip(produced)
                .filter(|(want, got)| want.get(index) == got.get(index))
                .count(),
            total: expected.len(),
        })
        .collect();

    let score = agreements
        .iter()
        .map(ColumnAgreement::fraction)
        .fold(None, |acc: Option<f64>, f| Some(acc.map_or(f, |a| a.min(f))))
        .unwrap_or(0.0);

    Ok(ScoreCard {
        columns: agreements,
        score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ColumnKind;

    fn columns(names: &[&str]) -> Vec<Column> {
        names
            .iter()
            .map(|name| Column {
                name: name.to_string(),
                kind: ColumnKind::Text,
            })
            .collect()
    }

    fn table(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect()
    }

    #[test]
    fn score_is_minimum_across_columns() {
        let cols = columns(&["a", "b"]);
        let expected: Vec<Vec<String>> = (0..10)
            .map(|i| vec![i.to_string(), (i * 2).to_string()])
            .collect();
        let mut produced = expected.clone();
        produced[7][1] = "wrong".to_string();

        let card = score_outputs(&cols, &expected, &produced).unwrap();
        assert_eq!(card.columns[0].matched, 10);
        assert_eq!(card.columns[1].matched, 9);
        assert!((card.score - 0.9).abs() < 1e-12);
    }

    #[test]
    fn half_matching_single_column() {
        let cols = columns(&["output"]);
        let expected = table(&[&["2"], &["4"]]);
        let produced = table(&[&["2"], &["3"]]);
        assert_eq!(score_outputs(&cols, &expected, &produced).unwrap().score, 0.5);
    }

    #[test]
    fn comparison_is_exact_text() {
        let cols = columns(&["output"]);
        let expected = table(&[&["1.0"]]);
        let produced = table(&[&["1"]]);
        assert_eq!(score_outputs(&cols, &expected, &produced).unwrap().score, 0.0);
    }

    #[test]
    fn wrong_arity_is_a_shape_mismatch() {
        let cols = columns(&["a", "b"]);
        let expected = table(&[&["1", "2"], &["3", "4"]]);
        let produced = table(&[&["1", "2"], &["3"]]);
        assert_eq!(
            score_outputs(&cols, &expected, &produced),
            Err(ShapeMismatch {
                row: Some(1),
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn missing_rows_are_a_shape_mismatch() {
        let cols = columns(&["a"]);
        let expected = table(&[&["1"], &["2"]]);
        let produced = table(&[&["1"]]);
        let err = score_outputs(&cols, &expected, &produced).unwrap_err();
        assert_eq!(err.row, None);
    }
}
