//! Science filename metadata.
//!
//! The pipeline never interprets filenames itself; it goes through a
//! [`FilenameParser`] and normalizes the result into [`ScienceFileMetadata`]
//! (for key derivation) or a [`Fingerprint`] (for notification threading).

use crate::keys::{file_name_of, KeyError};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Raw parser output. Parsers for different missions fill in different
/// subsets, so every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFilename {
    pub instrument: Option<String>,
    pub mode: Option<String>,
    pub test: Option<bool>,
    pub time: Option<DateTime<Utc>>,
    pub level: Option<String>,
    pub descriptor: Option<String>,
    pub version: Option<String>,
}

/// Capability for turning a science filename into its metadata
pub trait FilenameParser: Send + Sync {
    fn parse(&self, filename: &str) -> Result<ParsedFilename, KeyError>;
}

/// Metadata required to place a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScienceFileMetadata {
    pub level: String,
    pub time: DateTime<Utc>,
    pub mode: Option<String>,
    pub test: bool,
    pub instrument: Option<String>,
}

impl ScienceFileMetadata {
    /// Normalize parser output, rejecting results without a level or time
    pub fn from_parsed(filename: &str, parsed: ParsedFilename) -> Result<Self, KeyError> {
        let missing = |field| KeyError::Metadata {
            filename: filename.to_string(),
            field,
        };

        Ok(Self {
            level: parsed.level.ok_or_else(|| missing("level"))?,
            time: parsed.time.ok_or_else(|| missing("time"))?,
            mode: parsed.mode,
            test: parsed.test.unwrap_or(false),
            instrument: parsed.instrument,
        })
    }

    pub fn read(parser: &dyn FilenameParser, filename: &str) -> Result<Self, KeyError> {
        let parsed = parser.parse(filename)?;
        Self::from_parsed(filename, parsed)
    }
}

/// Identity of a logical science file for threading purposes.
///
/// Two filenames belong to the same thread iff all three fields are equal,
/// absent fields included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub time: Option<DateTime<Utc>>,
    pub mode: Option<String>,
    pub test: Option<bool>,
}

impl From<&ParsedFilename> for Fingerprint {
    fn from(parsed: &ParsedFilename) -> Self {
        Self {
            time: parsed.time,
            mode: parsed.mode.clone(),
            test: parsed.test,
        }
    }
}

const LEVELS: [&str; 7] = ["raw", "l0", "l1", "l2", "l3", "l4", "ql"];

/// Parser for the SWxSOC mission naming convention.
///
/// Level 0 binaries: `<mission>_<INST>_l0_<YYYYJJJ-HHMMSS>_v<NN>.bin`
///
/// Products: `<mission>_<inst>_[<mode>_]<level>[test]_[<descriptor>_]<YYYYMMDDTHHMMSS>_v<X.Y.Z>.cdf`
#[derive(Debug, Clone)]
pub struct SwxsocFilenameParser {
    mission: String,
}

impl SwxsocFilenameParser {
    pub fn new(mission: impl Into<String>) -> Self {
        Self {
            mission: mission.into(),
        }
    }

    fn parse_binary(&self, name: &str, tokens: &[&str]) -> Result<ParsedFilename, KeyError> {
        let [_, instrument, level, time, version] = tokens else {
            return Err(invalid(name, "expected 5 underscore separated fields"));
        };
        if !level.eq_ignore_ascii_case("l0") {
            return Err(invalid(name, "binary files must be level l0"));
        }
        let time = NaiveDateTime::parse_from_str(time, "%Y%j-%H%M%S")
            .map_err(|e| invalid(name, &format!("bad l0 timestamp {time}: {e}")))?;

        Ok(ParsedFilename {
            instrument: Some(instrument.to_lowercase()),
            mode: None,
            test: Some(false),
            time: Some(time.and_utc()),
            level: Some("l0".to_string()),
            descriptor: None,
            version: Some(parse_version(name, version)?),
        })
    }

    fn parse_product(&self, name: &str, tokens: &[&str]) -> Result<ParsedFilename, KeyError> {
        if tokens.len() < 5 {
            return Err(invalid(name, "too few underscore separated fields"));
        }
        let instrument = tokens[1];
        let time = tokens[tokens.len() - 2];
        let version = tokens[tokens.len() - 1];
        let middle = &tokens[2..tokens.len() - 2];

        let (index, level, test) = middle
            .iter()
            .enumerate()
            .find_map(|(i, token)| {
                let (level, test) = match token.strip_suffix("test") {
                    Some(level) => (level, true),
                    None => (*token, false),
                };
                LEVELS.contains(&level).then_some((i, level, test))
            })
            .ok_or_else(|| invalid(name, "no data level field"))?;

        let time = NaiveDateTime::parse_from_str(time, "%Y%m%dT%H%M%S")
            .map_err(|e| invalid(name, &format!("bad timestamp {time}: {e}")))?;

        Ok(ParsedFilename {
            instrument: Some(instrument.to_lowercase()),
            mode: join_tokens(&middle[..index]),
            test: Some(test),
            time: Some(time.and_utc()),
            level: Some(level.to_string()),
            descriptor: join_tokens(&middle[index + 1..]),
            version: Some(parse_version(name, version)?),
        })
    }
}

impl FilenameParser for SwxsocFilenameParser {
    fn parse(&self, filename: &str) -> Result<ParsedFilename, KeyError> {
        let name = file_name_of(filename);
        // Versions contain dots, so the extension is what follows the last one
        let (stem, extension) = name
            .rsplit_once('.')
            .ok_or_else(|| invalid(name, "missing file extension"))?;

        let tokens: Vec<&str> = stem.split('_').collect();
        if !tokens[0].eq_ignore_ascii_case(&self.mission) {
            return Err(invalid(name, &format!("not a {} file", self.mission)));
        }

        match extension {
            "bin" => self.parse_binary(name, &tokens),
            "cdf" => self.parse_product(name, &tokens),
            other => Err(invalid(name, &format!("unsupported extension .{other}"))),
        }
    }
}

fn invalid(name: &str, reason: &str) -> KeyError {
    KeyError::Parse {
        filename: name.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_version(name: &str, token: &str) -> Result<String, KeyError> {
    token
        .strip_prefix('v')
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| invalid(name, &format!("bad version field {token}")))
}

fn join_tokens(tokens: &[&str]) -> Option<String> {
    (!tokens.is_empty()).then(|| tokens.join("_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parser() -> SwxsocFilenameParser {
        SwxsocFilenameParser::new("mission")
    }

    #[test]
    fn test_parse_level_zero_binary() {
        let parsed = parser().parse("mission_EEA_l0_2022335-200137_v01.bin").unwrap();

        assert_eq!(parsed.level.as_deref(), Some("l0"));
        assert_eq!(parsed.instrument.as_deref(), Some("eea"));
        assert_eq!(parsed.version.as_deref(), Some("01"));
        assert_eq!(
            parsed.time,
            Some(Utc.with_ymd_and_hms(2022, 12, 1, 20, 1, 37).unwrap())
        );
    }

    #[test]
    fn test_parse_product_with_mode_and_descriptor() {
        let parsed = parser()
            .parse("mission_eea_burst_l1test_hk_20230205T000006_v1.0.01.cdf")
            .unwrap();

        assert_eq!(parsed.level.as_deref(), Some("l1"));
        assert_eq!(parsed.mode.as_deref(), Some("burst"));
        assert_eq!(parsed.test, Some(true));
        assert_eq!(parsed.descriptor.as_deref(), Some("hk"));
        assert_eq!(parsed.version.as_deref(), Some("1.0.01"));
        assert_eq!(
            parsed.time,
            Some(Utc.with_ymd_and_hms(2023, 2, 5, 0, 0, 6).unwrap())
        );
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        for name in [
            "mission_EEA_l0_2022335-200137_v01",
            "other_eea_ql_20230205T000006_v1.0.01.cdf",
            "mission_eea_xx_20230205T000006_v1.0.01.cdf",
            "mission_eea_ql_2023-02-05_v1.0.01.cdf",
            "mission_eea_ql_20230205T000006_v1.0.01.txt",
        ] {
            assert!(
                matches!(parser().parse(name), Err(KeyError::Parse { .. })),
                "{name} should not parse"
            );
        }
    }

    #[test]
    fn test_missing_time_is_a_metadata_error() {
        let parsed = ParsedFilename {
            level: Some("l1".to_string()),
            ..Default::default()
        };

        let err = ScienceFileMetadata::from_parsed("f.cdf", parsed).unwrap_err();
        assert!(matches!(err, KeyError::Metadata { field: "time", .. }));
    }

    #[test]
    fn test_fingerprint_ignores_level_and_descriptor() {
        let raw = parser()
            .parse("mission_eea_l1_hk_20230205T000006_v1.0.01.cdf")
            .unwrap();
        let quicklook = parser()
            .parse("mission_eea_ql_eventlist_20230205T000006_v1.0.02.cdf")
            .unwrap();

        assert_eq!(Fingerprint::from(&raw), Fingerprint::from(&quicklook));
    }

    #[test]
    fn test_fingerprint_differs_on_mode() {
        let plain = parser()
            .parse("mission_eea_l1_20230205T000006_v1.0.01.cdf")
            .unwrap();
        let burst = parser()
            .parse("mission_eea_burst_l1_20230205T000006_v1.0.01.cdf")
            .unwrap();

        assert_ne!(Fingerprint::from(&plain), Fingerprint::from(&burst));
    }
}
