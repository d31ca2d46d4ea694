use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CATALOG_FILE_NAME: &str = "catalog.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubjectCategory {
    /// Cleared by signature alone (Office, Library).
    Administrative,
    Academic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub name: String,
    pub category: SubjectCategory,
}

impl Subject {
    pub fn is_administrative(&self) -> bool {
        self.category == SubjectCategory::Administrative
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub year: i64,
    /// `None` marks a year-level entry used when no semester-specific list exists.
    #[serde(default)]
    pub semester: Option<i64>,
    pub subjects: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogFile {
    #[serde(default = "default_administrative")]
    administrative: Vec<String>,
    entries: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    BuiltIn,
    File(PathBuf),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse catalog file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid catalog: {0}")]
    Invalid(String),
}

/// Static lookup from academic placement to the ordered subject list printed on
/// the certificate.
#[derive(Debug, Clone)]
pub struct Catalog {
    administrative: BTreeSet<String>,
    entries: Vec<CatalogEntry>,
    source: CatalogSource,
}

fn default_administrative() -> Vec<String> {
    vec!["Office".to_string(), "Library".to_string()]
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for Catalog {
    fn default() -> Self {
        Self::built_in()
    }
}

impl Catalog {
    pub fn built_in() -> Self {
        let entries = vec![
            CatalogEntry {
                year: 2,
                semester: None,
                subjects: names(&["DM", "DPCO", "DSA", "FDS", "Oops", "Office", "Library"]),
            },
            CatalogEntry {
                year: 3,
                semester: None,
                subjects: names(&[
                    "Computer Network",
                    "Distributing Computing",
                    "Es&IoT",
                    "Full Stack WebDevelopment",
                    "Software Testing & Automation",
                    "Cloud Computing",
                    "Office",
                    "Library",
                ]),
            },
        ];
        Self {
            administrative: default_administrative().into_iter().collect(),
            entries,
            source: CatalogSource::BuiltIn,
        }
    }

    pub fn new(administrative: Vec<String>, entries: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        // Matched against trimmed client input.
        let entries: Vec<CatalogEntry> = entries
            .into_iter()
            .map(|mut e| {
                e.subjects = e.subjects.iter().map(|s| s.trim().to_string()).collect();
                e
            })
            .collect();
        validate_entries(&entries)?;
        Ok(Self {
            administrative: administrative
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            entries,
            source: CatalogSource::BuiltIn,
        })
    }

    /// Uses `catalog.json` from the workspace when present, the built-in lists otherwise.
    pub fn load_for_workspace(workspace: &Path) -> Result<Self, CatalogError> {
        let path = workspace.join(CATALOG_FILE_NAME);
        if !path.is_file() {
            return Ok(Self::built_in());
        }
        let text = std::fs::read_to_string(&path).map_err(|source| CatalogError::Io {
            path: path.clone(),
            source,
        })?;
        let file: CatalogFile =
            serde_json::from_str(&text).map_err(|source| CatalogError::Parse {
                path: path.clone(),
                source,
            })?;
        let mut catalog = Self::new(file.administrative, file.entries)?;
        catalog.source = CatalogSource::File(path);
        Ok(catalog)
    }

    pub fn source(&self) -> &CatalogSource {
        &self.source
    }

    pub fn category_of(&self, subject: &str) -> SubjectCategory {
        if self.administrative.contains(subject) {
            SubjectCategory::Administrative
        } else {
            SubjectCategory::Academic
        }
    }

    /// Exact (year, semester) entry first, then the year-level entry. An unknown
    /// placement yields an empty list.
    pub fn subjects_for(&self, year: i64, semester: Option<i64>) -> Vec<Subject> {
        let exact = semester.and_then(|sem| {
            self.entries
                .iter()
                .find(|e| e.year == year && e.semester == Some(sem))
        });
        let entry = exact.or_else(|| {
            self.entries
                .iter()
                .find(|e| e.year == year && e.semester.is_none())
        });
        let Some(entry) = entry else {
            return Vec::new();
        };
        entry
            .subjects
            .iter()
            .map(|name| Subject {
                name: name.clone(),
                category: self.category_of(name),
            })
            .collect()
    }
}

fn validate_entries(entries: &[CatalogEntry]) -> Result<(), CatalogError> {
    let mut placements = HashSet::new();
    for e in entries {
        if !placements.insert((e.year, e.semester)) {
            return Err(CatalogError::Invalid(format!(
                "duplicate entry for year {} semester {:?}",
                e.year, e.semester
            )));
        }
        let mut seen = HashSet::new();
        for s in &e.subjects {
            if s.trim().is_empty() {
                return Err(CatalogError::Invalid(format!(
                    "empty subject name in year {} semester {:?}",
                    e.year, e.semester
                )));
            }
            if !seen.insert(s.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "subject {s:?} listed twice in year {} semester {:?}",
                    e.year, e.semester
                )));
            }
        }
    }
    Ok(())
}
