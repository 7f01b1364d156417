use crate::ast::grammar::parse_rule_predicate;
use crate::ast::{Expression, InputSource, Value};
use crate::error::{EvaluationError, IndexError, RuleError};
use crate::evaluator::{self, Bindings};
use crate::header::Header;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// A parsed rule predicate together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub text: String,
    pub expression: Expression,
}

/// The outcome of checking one predicate against a stored value.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleVerdict {
    pub passed: bool,
    /// The evaluated predicate, e.g. `value (was 'J') eq hdr.FILTER (was 'H')`.
    pub explanation: String,
}

/// Per-field applicability rules of a calibration index.
///
/// Fields are kept in sorted order, which is also the column order of the
/// persisted table. A field without a predicate always passes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: BTreeMap<String, Option<Rule>>,
}

/// Binds `value` to the stored field and `hdr.KEY` to the candidate header.
struct RuleBindings<'a> {
    value: &'a Value,
    header: &'a Header,
}

impl Bindings for RuleBindings<'_> {
    fn resolve(&self, source: &InputSource) -> Result<Value, EvaluationError> {
        match source {
            InputSource::Candidate => Ok(self.value.clone()),
            InputSource::Header { key } => {
                self.header
                    .get(key)
                    .cloned()
                    .ok_or_else(|| EvaluationError::MissingHeader {
                        object: "candidate header".to_string(),
                        key: key.clone(),
                    })
            }
            other => Err(EvaluationError::UnsupportedInput(other.to_string())),
        }
    }
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field with a predicate written in the rule language. Empty text means no predicate.
    pub fn with_rule(mut self, field: &str, predicate: &str) -> Result<Self, RuleError> {
        self.insert(field, predicate)?;
        Ok(self)
    }

    pub fn insert(&mut self, field: &str, predicate: &str) -> Result<(), RuleError> {
        let rule = parse_rule_predicate(predicate)?.map(|expression| Rule {
            text: predicate.trim().to_string(),
            expression,
        });
        self.rules.insert(field.to_string(), rule);
        Ok(())
    }

    /// Parses a rules file: one `FIELD [predicate]` per line, `#` comments and blanks ignored.
    pub fn parse(content: &str) -> Result<Self, IndexError> {
        let mut set = RuleSet::new();
        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (field, predicate) = line
                .split_once(char::is_whitespace)
                .unwrap_or((line, ""));
            set.insert(field, predicate)
                .map_err(|source| IndexError::RuleEval {
                    field: field.to_string(),
                    source,
                })?;
        }
        Ok(set)
    }

    pub fn from_file(path: &Path) -> Result<Self, IndexError> {
        let content = fs::read_to_string(path).map_err(|e| IndexError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Field names in deterministic (sorted) order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn field_count(&self) -> usize {
        self.rules.len()
    }

    pub fn position(&self, field: &str) -> Option<usize> {
        self.rules.keys().position(|k| k == field)
    }

    pub fn rule(&self, field: &str) -> Option<&Rule> {
        self.rules.get(field).and_then(Option::as_ref)
    }

    /// `(field, rule)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Rule>)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Evaluates the predicate of `field` with `value` as the stored operand.
    ///
    /// Fields without a predicate pass. A predicate that cannot be evaluated is an
    /// error, never a failed match.
    pub fn check(
        &self,
        field: &str,
        value: &Value,
        header: &Header,
    ) -> Result<RuleVerdict, RuleError> {
        let Some(rule) = self.rule(field) else {
            return Ok(RuleVerdict {
                passed: true,
                explanation: format!("{} has no rule", field),
            });
        };
        let bindings = RuleBindings { value, header };
        let evaluation = evaluator::explain(&rule.expression, &bindings)?;
        match evaluation.value {
            Value::Bool(passed) => Ok(RuleVerdict {
                passed,
                explanation: evaluation.reason,
            }),
            other => Err(RuleError::NotBoolean(other)),
        }
    }
}
