//! Tests for headers, header providers and header translations.
mod common;
use common::*;
use kansoku::error::HeaderError;
use kansoku::header::{MemoryHeaderProvider, TranslationRegistry};
use kansoku::prelude::*;
use std::fs;
use tempfile::TempDir;

fn number(header: &Header, key: &str) -> Option<f64> {
    header.get(key).and_then(Value::as_number)
}

#[cfg(test)]
mod translation_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_oractime_from_mjd() {
        let header = Header::from_iter([("MJD-OBS", 60310.5)]);
        let translated = TranslationTable::generic().translate(&header);
        assert_eq!(number(&translated, "ORACTIME"), Some(20240101.5));
    }

    #[test]
    fn test_oractime_and_ut_date_from_date_obs() {
        let header = Header::from_iter([("DATE-OBS", "2024-01-01T06:00:00")]);
        let translated = TranslationTable::generic().translate(&header);
        assert_eq!(number(&translated, "ORACTIME"), Some(20240101.25));
        assert_eq!(number(&translated, "ORACUT"), Some(20240101.0));
    }

    #[test]
    fn test_mjd_takes_precedence_over_date_obs() {
        let header = Header::from_iter([
            ("MJD-OBS", Value::Number(60310.5)),
            ("DATE-OBS", Value::from("2023-06-01T00:00:00")),
            ("UTDATE", Value::Number(20240101.0)),
        ]);
        let translated = TranslationTable::generic().translate(&header);
        assert_eq!(number(&translated, "ORACTIME"), Some(20240101.5));
        assert_eq!(number(&translated, "ORACUT"), Some(20240101.0));
    }

    #[test]
    fn test_exposure_filter_and_type() {
        let header = Header::from_iter([
            ("EXP_TIME", Value::Number(12.0)),
            ("FILTER", Value::from("K")),
            ("OBSTYPE", Value::from(" dark ")),
        ]);
        let translated = TranslationTable::generic().translate(&header);
        assert_eq!(number(&translated, "ORAC_EXPOSURE_TIME"), Some(12.0));
        assert_eq!(translated.get("ORAC_FILTER"), Some(&Value::from("K")));
        assert_eq!(
            translated.get("ORAC_OBSERVATION_TYPE"),
            Some(&Value::from("DARK"))
        );

        let both = Header::from_iter([("EXPTIME", 5.0), ("EXP_TIME", 12.0)]);
        let translated = TranslationTable::generic().translate(&both);
        assert_eq!(number(&translated, "ORAC_EXPOSURE_TIME"), Some(5.0));
    }

    #[test]
    fn test_untranslatable_entries_are_omitted() {
        let header = Header::from_iter([("DATE-OBS", "last tuesday")]);
        let translated = TranslationTable::generic().translate(&header);
        assert!(translated.is_empty());
    }

    #[test]
    fn test_instrument_overrides_are_case_insensitive() {
        fn fixed_filter(_: &Header) -> Option<Value> {
            Some(Value::from("J"))
        }
        let registry = TranslationRegistry::new().with_translation("ufti", "ORAC_FILTER", fixed_filter);
        let header = Header::from_iter([("FILTER", "K")]);

        let ufti = registry.table("UFTI").translate(&header);
        assert_eq!(ufti.get("ORAC_FILTER"), Some(&Value::from("J")));

        let other = registry.table("IRCAM").translate(&header);
        assert_eq!(other.get("ORAC_FILTER"), Some(&Value::from("K")));
        assert_eq!(
            registry.table("UFTI").names().count(),
            TranslationTable::generic().names().count()
        );
    }
}

#[cfg(test)]
mod provider_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_json_provider_reads_sidecar_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("f20240101_00001.json"),
            r#"{ "OBSTYPE": "DARK", "EXPTIME": 30, "COADDS": null, "DETECTOR": { "rows": 1024 } }"#,
        )
        .unwrap();

        let provider = JsonHeaderProvider::new(dir.path());
        let header = provider.read_header("f20240101_00001").unwrap();
        assert_eq!(header.get("OBSTYPE"), Some(&Value::from("DARK")));
        assert_eq!(number(&header, "EXPTIME"), Some(30.0));
        assert_eq!(header.get("COADDS"), Some(&Value::Null));
        assert!(header.get("DETECTOR").is_some_and(|v| v.to_string().contains("1024")));
    }

    #[test]
    fn test_json_provider_errors() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.json"), "[1, 2").unwrap();
        let provider = JsonHeaderProvider::new(dir.path());

        assert!(matches!(
            provider.read_header("missing"),
            Err(HeaderError::Io { path, .. }) if path.ends_with("missing.json")
        ));
        assert!(matches!(
            provider.read_header("broken"),
            Err(HeaderError::Parse { .. })
        ));
        assert!(matches!(
            JsonHeaderProvider::parse("inline", "[1, 2]"),
            Err(HeaderError::Parse { .. })
        ));
    }

    #[test]
    fn test_memory_provider_defaults_to_empty() {
        let provider =
            MemoryHeaderProvider::new().with_header("f1", Header::from_iter([("OBJECT", "M31")]));
        assert_eq!(provider.read_header("f1").unwrap().len(), 1);
        assert!(provider.read_header("f2").unwrap().is_empty());
    }
}

#[cfg(test)]
mod object_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_changing_file_makes_object_stale() {
        init_tracing();
        let provider = MemoryHeaderProvider::new()
            .with_header("f2", Header::from_iter([("OBSTYPE", "flat")]));
        let mut frame = DataObject::new("f1").with_header(Header::from_iter([("OBSTYPE", "dark")]));
        assert!(!frame.is_stale());

        frame.set_file("f2");
        assert!(frame.is_stale());
        assert_eq!(frame.hdr.get("OBSTYPE"), Some(&Value::from("dark")));

        frame
            .refresh(&provider, &TranslationTable::generic())
            .unwrap();
        assert!(!frame.is_stale());
        assert_eq!(frame.hdr.get("OBSTYPE"), Some(&Value::from("flat")));
        assert_eq!(
            frame.uhdr.get("ORAC_OBSERVATION_TYPE"),
            Some(&Value::from("FLAT"))
        );
    }

    #[test]
    fn test_refresh_without_file_fails() {
        let mut object = DataObject::default();
        let err = object
            .refresh(&MemoryHeaderProvider::new(), &TranslationTable::new())
            .unwrap_err();
        assert!(matches!(err, HeaderError::NoFile));
    }

    #[test]
    fn test_user_header_overlays_header() {
        let mut object = DataObject::new("f1").with_header(Header::from_iter([
            ("FILTER", "K"),
            ("OBJECT", "M31"),
        ]));
        object.uhdr.insert("FILTER", "J");

        let merged = object.merged_header();
        assert_eq!(merged.get("FILTER"), Some(&Value::from("J")));
        assert_eq!(merged.get("OBJECT"), Some(&Value::from("M31")));
        assert_eq!(object.hdr.get("FILTER"), Some(&Value::from("K")));
    }

    #[test]
    fn test_merge_overwrites_duplicates() {
        let mut base = Header::from_iter([("A", 1.0), ("B", 2.0)]);
        base.merge(&Header::from_iter([("B", 3.0), ("C", 4.0)]));
        let keys: Vec<&str> = base.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
        assert_eq!(number(&base, "B"), Some(3.0));
    }
}
