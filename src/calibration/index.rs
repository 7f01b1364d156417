use super::rules::RuleSet;
use crate::ast::Value;
use crate::error::{EvaluationError, IndexError, RuleError};
use crate::header::Header;
use itertools::Itertools;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// The result of checking every rule of an index against one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub passed: bool,
    /// The first field whose rule failed.
    pub failed_field: Option<String>,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Record {
    key: String,
    values: Vec<Value>,
}

/// A table of historical calibration records filtered by a rule set.
///
/// Records keep their table order. Mutation goes through `add`, which takes
/// `&mut self`; wrap the index in a `RwLock` to share it between threads.
#[derive(Debug, Clone)]
pub struct CalibrationIndex {
    name: String,
    path: Option<PathBuf>,
    rules: RuleSet,
    records: Vec<Record>,
}

impl CalibrationIndex {
    /// An in-memory index that is never persisted.
    pub fn with_rules(name: &str, rules: RuleSet) -> Self {
        Self {
            name: name.to_string(),
            path: None,
            rules,
            records: Vec::new(),
        }
    }

    /// Opens an index table and its rules file. A missing table is an empty index.
    pub fn open(index_path: impl AsRef<Path>, rules_path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let index_path = index_path.as_ref();
        let rules = RuleSet::from_file(rules_path.as_ref())?;
        let name = index_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| index_path.display().to_string());

        let mut index = Self::with_rules(&name, rules);
        index.path = Some(index_path.to_path_buf());
        if index_path.exists() {
            let content = fs::read_to_string(index_path).map_err(|e| IndexError::Io {
                path: index_path.display().to_string(),
                message: e.to_string(),
            })?;
            index.records = index.parse_table(&content)?;
        }
        info!(index = %index.name, records = index.records.len(), "opened calibration index");
        Ok(index)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record keys in table order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.key.as_str())
    }

    fn parse_table(&self, content: &str) -> Result<Vec<Record>, IndexError> {
        let mut lines = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'));

        let Some(header_line) = lines.next() else {
            return Ok(Vec::new());
        };
        let columns: Vec<&str> = header_line.split_whitespace().skip(1).collect();
        let expected: Vec<&str> = self.rules.fields().collect();
        if columns != expected {
            return Err(IndexError::IndexCorruption(format!(
                "index '{}' has columns [{}] but its rules name [{}]",
                self.name,
                columns.join(" "),
                expected.join(" ")
            )));
        }

        Ok(lines
            .map(|line| {
                let mut words = line.split_whitespace();
                let key = words.next().unwrap_or_default().to_string();
                Record {
                    key,
                    values: words.map(Value::from_field).collect(),
                }
            })
            .collect())
    }

    /// The table in its persisted text form.
    pub fn render(&self) -> String {
        Self::render_records(&self.rules, &self.records)
    }

    fn render_records(rules: &RuleSet, records: &[Record]) -> String {
        let mut out = format!("KEY {}\n", rules.fields().join(" "));
        for record in records {
            out.push_str(&record.key);
            for value in &record.values {
                out.push(' ');
                out.push_str(&value.to_string());
            }
            out.push('\n');
        }
        out
    }

    fn write_atomically(path: &Path, data: &str) -> Result<(), IndexError> {
        let io_error = |e: std::io::Error| IndexError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(io_error)?;

        let mut temp_file = NamedTempFile::new_in(dir).map_err(io_error)?;
        temp_file.write_all(data.as_bytes()).map_err(io_error)?;
        temp_file.flush().map_err(io_error)?;
        temp_file.persist(path).map_err(|e| io_error(e.error))?;
        Ok(())
    }

    fn storable(field: &str, value: &Value) -> Result<Value, IndexError> {
        let text = value.to_string();
        if text.is_empty() || text.chars().any(char::is_whitespace) {
            return Err(IndexError::InvalidValue {
                field: field.to_string(),
                value: text,
            });
        }
        Ok(value.clone())
    }

    /// Adds or replaces the record for `key` and persists the whole table.
    ///
    /// Every rule field must be present in `header`; values are stored in rule order.
    pub fn add(&mut self, key: &str, header: &Header) -> Result<(), IndexError> {
        Self::storable("KEY", &Value::Str(key.to_string()))?;
        // Table lines starting with '#' are comments.
        if key.starts_with('#') {
            return Err(IndexError::InvalidValue {
                field: "KEY".to_string(),
                value: key.to_string(),
            });
        }
        let values = self
            .rules
            .fields()
            .map(|field| {
                let value = header.get(field).ok_or_else(|| IndexError::MissingField {
                    field: field.to_string(),
                    context: format!("record '{}'", key),
                })?;
                Self::storable(field, value)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = self.records.clone();
        let record = Record {
            key: key.to_string(),
            values,
        };
        match records.iter_mut().find(|r| r.key == key) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }

        if let Some(path) = &self.path {
            Self::write_atomically(path, &Self::render_records(&self.rules, &records))?;
        }
        self.records = records;
        debug!(index = %self.name, key, "filed calibration record");
        Ok(())
    }

    fn record(&self, key: &str) -> Result<&Record, IndexError> {
        self.records
            .iter()
            .find(|r| r.key == key)
            .ok_or_else(|| IndexError::NotFound(key.to_string()))
    }

    fn check_shape(&self, record: &Record) -> Result<(), IndexError> {
        if record.values.len() != self.rules.field_count() {
            return Err(IndexError::IndexCorruption(format!(
                "record '{}' in index '{}' has {} values but the rules define {} fields",
                record.key,
                self.name,
                record.values.len(),
                self.rules.field_count()
            )));
        }
        Ok(())
    }

    /// The stored fields of `key`, named by rule field.
    pub fn lookup(&self, key: &str) -> Result<Header, IndexError> {
        let record = self.record(key)?;
        self.check_shape(record)?;
        Ok(self
            .rules
            .fields()
            .zip(record.values.iter().cloned())
            .collect())
    }

    /// Checks every rule against the stored record and reports the first failure.
    pub fn verify(&self, key: &str, header: &Header) -> Result<Verification, IndexError> {
        let record = self.record(key)?;
        self.check_shape(record)?;

        for ((field, rule), value) in self.rules.iter().zip(&record.values) {
            if rule.is_none() {
                continue;
            }
            let verdict = self
                .rules
                .check(field, value, header)
                .map_err(|source| IndexError::RuleEval {
                    field: field.to_string(),
                    source,
                })?;
            if !verdict.passed {
                return Ok(Verification {
                    passed: false,
                    failed_field: Some(field.to_string()),
                    explanation: verdict.explanation,
                });
            }
        }
        Ok(Verification {
            passed: true,
            failed_field: None,
            explanation: format!("all rules of index '{}' passed", self.name),
        })
    }

    /// Whether the record for `key` satisfies every rule for the candidate header.
    pub fn matches_rules(&self, key: &str, header: &Header, warn_on_failure: bool) -> Result<bool, IndexError> {
        let verification = self.verify(key, header)?;
        if !verification.passed && warn_on_failure {
            warn!(
                index = %self.name,
                key,
                field = verification.failed_field.as_deref().unwrap_or_default(),
                "calibration '{}' rejected: rule for {} failed: {}",
                key,
                verification.failed_field.as_deref().unwrap_or_default(),
                verification.explanation
            );
        }
        Ok(verification.passed)
    }

    fn time_value(field: &str, value: &Value) -> Result<f64, IndexError> {
        value.as_number().ok_or_else(|| IndexError::RuleEval {
            field: field.to_string(),
            source: RuleError::Evaluation(EvaluationError::TypeMismatch {
                operation: "time delta".to_string(),
                expected: "Number".to_string(),
                found: value.clone(),
            }),
        })
    }

    /// The key of the passing record closest in `field` to the header's value.
    ///
    /// Candidates are tried by ascending absolute delta, ties broken by key.
    pub fn nearest_by_time(&self, field: &str, header: &Header) -> Result<String, IndexError> {
        let column = self
            .rules
            .position(field)
            .ok_or_else(|| IndexError::MissingField {
                field: field.to_string(),
                context: format!("rules of index '{}'", self.name),
            })?;
        let query = header.get(field).ok_or_else(|| IndexError::MissingField {
            field: field.to_string(),
            context: "query header".to_string(),
        })?;
        let query = Self::time_value(field, query)?;

        let candidates = self
            .records
            .iter()
            .map(|record| {
                self.check_shape(record)?;
                let stored = Self::time_value(field, &record.values[column])?;
                Ok(((stored - query).abs(), record.key.as_str()))
            })
            .collect::<Result<Vec<_>, IndexError>>()?;

        for (delta, key) in candidates
            .into_iter()
            .sorted_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)))
        {
            if self.matches_rules(key, header, false)? {
                debug!(index = %self.name, key, delta, "selected nearest calibration");
                return Ok(key.to_string());
            }
            debug!(index = %self.name, key, delta, "skipped calibration failing its rules");
        }
        Err(IndexError::NoSuitableCalibration(self.name.clone()))
    }

    /// The first record in table order whose rules all pass.
    pub fn cmp_with_hash(&self, header: &Header) -> Result<String, IndexError> {
        for record in &self.records {
            if self.matches_rules(&record.key, header, false)? {
                return Ok(record.key.clone());
            }
        }
        Err(IndexError::NoSuitableCalibration(self.name.clone()))
    }
}
