use super::Header;
use crate::ast::Value;
use ahash::AHashMap;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use std::collections::BTreeMap;

/// Derives one generic header value from an instrument header.
pub type Translator = fn(&Header) -> Option<Value>;

/// An explicit mapping from generic header names to translation functions.
#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    entries: BTreeMap<String, Translator>,
}

impl TranslationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The translations shared by every instrument.
    pub fn generic() -> Self {
        Self::new()
            .with("ORACTIME", oractime)
            .with("ORACUT", oracut)
            .with("ORAC_EXPOSURE_TIME", exposure_time)
            .with("ORAC_FILTER", filter)
            .with("ORAC_OBSERVATION_TYPE", observation_type)
    }

    /// Adds or replaces the translation for `name`.
    pub fn with(mut self, name: &str, translator: Translator) -> Self {
        self.entries.insert(name.to_string(), translator);
        self
    }

    pub fn get(&self, name: &str) -> Option<Translator> {
        self.entries.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Applies every translation to `header`. Translations that yield nothing are omitted.
    pub fn translate(&self, header: &Header) -> Header {
        self.entries
            .iter()
            .filter_map(|(name, translator)| translator(header).map(|v| (name.clone(), v)))
            .collect()
    }

    /// A new table with `other`'s entries taking precedence.
    pub fn extended(&self, other: &TranslationTable) -> Self {
        let mut merged = self.clone();
        merged
            .entries
            .extend(other.entries.iter().map(|(k, v)| (k.clone(), *v)));
        merged
    }
}

/// Generic translations plus per-instrument additions and overrides.
#[derive(Debug, Clone)]
pub struct TranslationRegistry {
    generic: TranslationTable,
    instruments: AHashMap<String, TranslationTable>,
}

impl Default for TranslationRegistry {
    fn default() -> Self {
        Self {
            generic: TranslationTable::generic(),
            instruments: AHashMap::new(),
        }
    }
}

impl TranslationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a translation for one instrument.
    pub fn register(&mut self, instrument: &str, name: &str, translator: Translator) {
        let table = self
            .instruments
            .remove(&instrument.to_uppercase())
            .unwrap_or_default()
            .with(name, translator);
        self.instruments.insert(instrument.to_uppercase(), table);
    }

    pub fn with_translation(mut self, instrument: &str, name: &str, translator: Translator) -> Self {
        self.register(instrument, name, translator);
        self
    }

    /// The effective table for an instrument.
    pub fn table(&self, instrument: &str) -> TranslationTable {
        match self.instruments.get(&instrument.to_uppercase()) {
            Some(specific) => self.generic.extended(specific),
            None => self.generic.clone(),
        }
    }
}

const MJD_EPOCH: (i32, u32, u32) = (1858, 11, 17);

fn parse_date_obs(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim().trim_end_matches('Z');
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn from_mjd(mjd: f64) -> Option<NaiveDateTime> {
    let (y, m, d) = MJD_EPOCH;
    let epoch = NaiveDate::from_ymd_opt(y, m, d)?.and_hms_opt(0, 0, 0)?;
    let millis = (mjd * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

fn date_number(date: &NaiveDateTime) -> f64 {
    (date.year() as f64) * 10_000.0 + (date.month() as f64) * 100.0 + date.day() as f64
}

/// `YYYYMMDD.fraction` where the fraction is the elapsed part of the UT day.
fn day_number(date: &NaiveDateTime) -> f64 {
    let seconds = date.num_seconds_from_midnight() as f64
        + date.nanosecond() as f64 / 1_000_000_000.0;
    date_number(date) + seconds / 86_400.0
}

fn first_of<'a>(header: &'a Header, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|k| header.get(k).filter(|v| !v.is_null()))
}

fn oractime(header: &Header) -> Option<Value> {
    if let Some(mjd) = header.get("MJD-OBS").and_then(Value::as_number) {
        return from_mjd(mjd).map(|d| Value::Number(day_number(&d)));
    }
    let date = parse_date_obs(&header.get("DATE-OBS")?.to_string())?;
    Some(Value::Number(day_number(&date)))
}

fn oracut(header: &Header) -> Option<Value> {
    if let Some(ut) = header.get("UTDATE").and_then(Value::as_number) {
        return Some(Value::Number(ut));
    }
    let date = parse_date_obs(&header.get("DATE-OBS")?.to_string())?;
    Some(Value::Number(date_number(&date)))
}

fn exposure_time(header: &Header) -> Option<Value> {
    first_of(header, &["EXPTIME", "EXP_TIME"]).cloned()
}

fn filter(header: &Header) -> Option<Value> {
    header.get("FILTER").cloned()
}

fn observation_type(header: &Header) -> Option<Value> {
    header
        .get("OBSTYPE")
        .map(|v| Value::Str(v.to_string().trim().to_uppercase()))
}
