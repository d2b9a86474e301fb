//! Context builder
//!
//! Turns a retrieval result into the plain-text context handed to the
//! answer-extraction capability: one sentence per distinct provider name.

use homefind_core::{Catalog, Error, Result, RetrievalResult};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::error;

/// One provider as it appears in the context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subject {
    pub name: String,
    /// Description of the first catalog row carrying this name.
    pub description: String,
    /// Mean `average_score` over every catalog row carrying this name.
    pub average_score: f64,
    /// Phone number of the first catalog row carrying this name.
    pub phone_number: String,
    /// Number of catalog rows sharing the name.
    pub rows: usize,
}

impl Subject {
    /// Render the fixed-template sentence for this subject.
    pub fn render(&self) -> String {
        let name = &self.name;
        format!(
            "The Name of the company is: {name},  {name}'s Description is: {} {name}'s Average Score is: {:?} and {name}'s Phone Number is: {}",
            self.description, self.average_score, self.phone_number
        )
    }
}

/// Builds answer contexts against the full catalog.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    catalog: Arc<Catalog>,
}

impl ContextBuilder {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    #[inline]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Distinct subjects of `result`, in first-seen order.
    ///
    /// Scores, descriptions and phone numbers are re-joined against every
    /// catalog row sharing the name, not only the rows that were retrieved.
    pub fn subjects(&self, result: &RetrievalResult) -> Result<Vec<Subject>> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut subjects = Vec::new();

        for scored in result {
            let entry = self.catalog.get(scored.index).ok_or_else(|| {
                integrity_fault(format!(
                    "retrieved row {} is outside the catalog ({} rows)",
                    scored.index,
                    self.catalog.len()
                ))
            })?;

            if !seen.insert(entry.name.as_str()) {
                continue;
            }
            subjects.push(self.subject(&entry.name)?);
        }

        Ok(subjects)
    }

    /// Render the context string for `result`: one line per subject.
    pub fn build(&self, result: &RetrievalResult) -> Result<String> {
        let lines: Vec<String> = self
            .subjects(result)?
            .iter()
            .map(Subject::render)
            .collect();
        Ok(lines.join("\n"))
    }

    fn subject(&self, name: &str) -> Result<Subject> {
        let mut rows = self.catalog.rows_named(name);
        let first = rows.next().ok_or_else(|| {
            integrity_fault(format!("no catalog rows found for retrieved name '{}'", name))
        })?;

        let mut total = first.average_score;
        let mut count = 1usize;
        for row in rows {
            total += row.average_score;
            count += 1;
        }

        Ok(Subject {
            name: name.to_string(),
            description: first.description.clone(),
            average_score: total / count as f64,
            phone_number: first.phone_number.clone(),
            rows: count,
        })
    }
}

fn integrity_fault(message: String) -> Error {
    error!(%message, "Catalog integrity violated while building context");
    Error::DataIntegrity(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use homefind_core::{CatalogEntry, ErrorKind, ScoredEntry};

    fn catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::new(vec![
                CatalogEntry::new("Acme Cleaning", "we clean homes and offices", 4.5)
                    .with_phone_number("555-1111"),
                CatalogEntry::new("Acme Cleaning", "duplicate row", 3.5)
                    .with_phone_number("555-1111"),
                CatalogEntry::new("Bright Plumbing", "pipe repair and installation", 4.0)
                    .with_phone_number("555-2222"),
                CatalogEntry::new("Cozy Heating", "boiler service", 4.25)
                    .with_phone_number("555-3333"),
            ])
            .unwrap(),
        )
    }

    fn result(indices: &[usize]) -> RetrievalResult {
        let entries = indices
            .iter()
            .map(|&index| ScoredEntry { index, similarity: 0.0, score: 0.0 })
            .collect();
        RetrievalResult::new("q".to_string(), entries)
    }

    #[test]
    fn test_render_template() {
        let builder = ContextBuilder::new(catalog());
        let context = builder.build(&result(&[2])).unwrap();
        assert_eq!(
            context,
            "The Name of the company is: Bright Plumbing,  Bright Plumbing's Description is: \
             pipe repair and installation Bright Plumbing's Average Score is: 4.0 and \
             Bright Plumbing's Phone Number is: 555-2222"
        );
    }

    #[test]
    fn test_dedup_and_rejoin_average() {
        let builder = ContextBuilder::new(catalog());
        // only the duplicate row was retrieved, the average still covers both rows
        let subjects = builder.subjects(&result(&[1, 2, 0])).unwrap();

        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].name, "Acme Cleaning");
        assert_eq!(subjects[0].rows, 2);
        assert!((subjects[0].average_score - 4.0).abs() < 1e-12);
        // representative description comes from the first catalog row
        assert_eq!(subjects[0].description, "we clean homes and offices");
        assert_eq!(subjects[1].name, "Bright Plumbing");
    }

    #[test]
    fn test_one_line_per_name_in_first_seen_order() {
        let builder = ContextBuilder::new(catalog());
        let context = builder.build(&result(&[3, 0, 1, 2])).unwrap();
        let lines: Vec<&str> = context.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("The Name of the company is: Cozy Heating,"));
        assert!(lines[1].starts_with("The Name of the company is: Acme Cleaning,"));
        assert!(lines[2].starts_with("The Name of the company is: Bright Plumbing,"));
        assert!(lines[0].contains("Average Score is: 4.25 and"));
        assert_eq!(
            context.matches("The Name of the company is: Acme Cleaning,").count(),
            1
        );
    }

    #[test]
    fn test_build_is_idempotent() {
        let builder = ContextBuilder::new(catalog());
        let r = result(&[0, 2, 1]);
        assert_eq!(builder.build(&r).unwrap(), builder.build(&r).unwrap());
    }

    #[test]
    fn test_empty_result_gives_empty_context() {
        let builder = ContextBuilder::new(catalog());
        assert_eq!(builder.build(&result(&[])).unwrap(), "");
    }

    #[test]
    fn test_foreign_row_is_integrity_fault() {
        let builder = ContextBuilder::new(catalog());
        let err = builder.build(&result(&[0, 42])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    }
}
