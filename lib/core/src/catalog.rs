use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// A single provider row in the catalog.
///
/// Names are not unique: the same provider may appear on several rows
/// (one per review source, branch, etc.).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub name: String,
    /// Pre-normalized description text (see [`crate::normalize`]).
    #[serde(alias = "description_trad_clean", default, deserialize_with = "null_as_empty")]
    pub description: String,
    pub average_score: f64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub link: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub location: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub phone_number: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl CatalogEntry {
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, average_score: f64) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            average_score,
            link: String::new(),
            location: String::new(),
            email: String::new(),
            phone_number: String::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_phone_number(mut self, phone_number: impl Into<String>) -> Self {
        self.phone_number = phone_number.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = link.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }
}

/// Read-only, validated catalog snapshot.
///
/// Built once at startup and shared behind an `Arc`. Nothing in the
/// workspace mutates it after construction.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    // name -> row indices, in catalog order
    by_name: HashMap<String, Vec<usize>>,
}

impl Catalog {
    /// Validate and index the given rows.
    ///
    /// Fails when the catalog is empty, when no row carries a description,
    /// or when an average score is not a finite number.
    pub fn new(entries: Vec<CatalogEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::MalformedCatalog("catalog has no rows".to_string()));
        }

        if entries.iter().all(|e| e.description.trim().is_empty()) {
            return Err(Error::MalformedCatalog(
                "no row has a non-empty description".to_string(),
            ));
        }

        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            if !entry.average_score.is_finite() {
                return Err(Error::MalformedCatalog(format!(
                    "row {} ('{}') has a non-finite average_score",
                    idx, entry.name
                )));
            }
            by_name.entry(entry.name.clone()).or_default().push(idx);
        }

        Ok(Self { entries, by_name })
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&CatalogEntry> {
        self.entries.get(index)
    }

    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Description column in catalog order, the vectorizer's corpus.
    pub fn descriptions(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|e| e.description.as_str())
    }

    /// All rows sharing `name`, in catalog order. Empty if the name is unknown.
    pub fn rows_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a CatalogEntry> + 'a {
        self.by_name
            .get(name)
            .map(|rows| rows.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&idx| &self.entries[idx])
    }

    /// Number of distinct provider names.
    #[must_use]
    pub fn distinct_names(&self) -> usize {
        self.by_name.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<CatalogEntry> {
        vec![
            CatalogEntry::new("Acme Cleaning", "we clean homes and offices", 4.5),
            CatalogEntry::new("Acme Cleaning", "duplicate row", 3.5),
            CatalogEntry::new("Bright Plumbing", "pipe repair and installation", 4.0),
        ]
    }

    #[test]
    fn test_catalog_creation() {
        let catalog = Catalog::new(sample()).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.distinct_names(), 2);
        assert_eq!(catalog.get(2).unwrap().name, "Bright Plumbing");
    }

    #[test]
    fn test_rows_named_preserves_order() {
        let catalog = Catalog::new(sample()).unwrap();
        let rows: Vec<_> = catalog.rows_named("Acme Cleaning").collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].description, "we clean homes and offices");
        assert_eq!(rows[1].description, "duplicate row");
        assert_eq!(catalog.rows_named("Nobody").count(), 0);
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert!(matches!(
            Catalog::new(Vec::new()),
            Err(Error::MalformedCatalog(_))
        ));
    }

    #[test]
    fn test_catalog_without_descriptions_rejected() {
        let entries = vec![CatalogEntry::new("A", "  ", 1.0), CatalogEntry::new("B", "", 2.0)];
        assert!(matches!(
            Catalog::new(entries),
            Err(Error::MalformedCatalog(_))
        ));
    }

    #[test]
    fn test_non_finite_score_rejected() {
        let entries = vec![CatalogEntry::new("A", "roofing", f64::NAN)];
        let err = Catalog::new(entries).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn test_entry_deserialization_aliases_and_nulls() {
        let entry: CatalogEntry = serde_json::from_value(serde_json::json!({
            "name": "Acme Cleaning",
            "description_trad_clean": "we clean homes",
            "average_score": 4.5,
            "email": null,
            "phone_number": "555-1111",
            "unrelated": 7
        }))
        .unwrap();

        assert_eq!(entry.description, "we clean homes");
        assert_eq!(entry.email, "");
        assert_eq!(entry.link, "");
        assert_eq!(entry.phone_number, "555-1111");
    }
}
