use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use crate::text::MIN_TOKEN_LEN;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Data source configuration
    pub data_source_mode: DataSourceMode,
    pub data_file: Option<String>,
    pub remote_url: Option<String>,
    // Text analysis configuration
    #[serde(default)]
    pub stopwords_extra: Vec<String>,
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
    #[serde(default = "default_top_table")]
    pub top_table: usize,
    #[serde(default = "default_top_cloud")]
    pub top_cloud: usize,
    #[serde(default)]
    pub reason_scope: ReasonScope,
    #[serde(default)]
    pub cross_response_bigrams: bool,
    pub log_level: Option<String>,
    // Remote sheet layout
    #[serde(default)]
    pub columns: ColumnMapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataSourceMode {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "remote")]
    Remote,
}

/// Which rows feed the phrase table: the filtered selection or every response.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ReasonScope {
    #[default]
    #[serde(rename = "filtered")]
    Filtered,
    #[serde(rename = "all")]
    All,
}

/// Zero-based column positions of a remote sheet. Headers are localized, so
/// rows are mapped by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub timestamp: usize,
    pub subject: usize,
    pub reason_primary: usize,
    pub reason_secondary: Option<usize>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            timestamp: 0,
            subject: 1,
            reason_primary: 2,
            reason_secondary: Some(3),
        }
    }
}

fn default_min_token_len() -> usize {
    3
}

fn default_top_table() -> usize {
    20
}

fn default_top_cloud() -> usize {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_source_mode: DataSourceMode::Local,
            data_file: Some("datos_alertas.csv".to_string()),
            remote_url: Some(
                "https://docs.google.com/spreadsheets/d/SHEET_ID/edit#gid=0".to_string(),
            ),
            stopwords_extra: Vec::new(),
            min_token_len: default_min_token_len(),
            top_table: default_top_table(),
            top_cloud: default_top_cloud(),
            reason_scope: ReasonScope::Filtered,
            cross_response_bigrams: false,
            log_level: Some("info".to_string()),
            columns: ColumnMapping::default(),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }

    /// Check that the selected mode has a source to read from.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.data_source_mode {
            DataSourceMode::Local => {
                if self.data_file.as_deref().map_or(true, |f| f.trim().is_empty()) {
                    anyhow::bail!("data_file must be set when data_source_mode = \"local\"");
                }
            }
            DataSourceMode::Remote => {
                if self.remote_url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                    anyhow::bail!("remote_url must be set when data_source_mode = \"remote\"");
                }
            }
        }
        if self.min_token_len < MIN_TOKEN_LEN {
            anyhow::bail!(
                "min_token_len must be at least {}, got {}",
                MIN_TOKEN_LEN,
                self.min_token_len
            );
        }
        Ok(())
    }
}

/// One survey response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub timestamp: Option<NaiveDateTime>,
    pub subject: String,
    pub reason_primary: Option<String>,
    pub reason_secondary: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
}

impl Response {
    /// Build a response from a raw timestamp; year and month follow the parsed value.
    pub fn from_timestamp(
        raw_timestamp: &str,
        subject: &str,
        reason_primary: Option<&str>,
        reason_secondary: Option<&str>,
    ) -> Self {
        let timestamp = parse_timestamp(raw_timestamp);
        Self {
            year: timestamp.map(|t| t.year()),
            month: timestamp.map(|t| t.month()),
            timestamp,
            subject: subject.trim().to_string(),
            reason_primary: non_blank(reason_primary),
            reason_secondary: non_blank(reason_secondary),
        }
    }

    /// Build a response from an already split year/month pair.
    pub fn from_period(
        subject: &str,
        year: Option<i32>,
        month: Option<u32>,
        reason_primary: Option<&str>,
        reason_secondary: Option<&str>,
    ) -> Self {
        Self {
            timestamp: None,
            subject: subject.trim().to_string(),
            reason_primary: non_blank(reason_primary),
            reason_secondary: non_blank(reason_secondary),
            year,
            month: month.filter(|m| (1..=12).contains(m)),
        }
    }

    pub fn matches_period(&self, year: i32, month: u32) -> bool {
        self.year == Some(year) && self.month == Some(month)
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

const DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d", "%Y/%m/%d"];

/// Parse a form timestamp. Day-first forms are tried before ISO ones.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parse a year or month cell. Spreadsheet exports sometimes write `2024.0`.
pub fn parse_whole_number<T: std::str::FromStr>(raw: &str) -> Option<T> {
    let raw = raw.trim();
    raw.parse::<T>()
        .ok()
        .or_else(|| raw.strip_suffix(".0").and_then(|r| r.parse::<T>().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_day_first_timestamp() {
        let ts = parse_timestamp("15/03/2024 10:22:11").unwrap();
        assert_eq!(ts.year(), 2024);
        assert_eq!(ts.month(), 3);
        assert_eq!(ts.day(), 15);
    }

    #[test]
    fn test_parse_iso_and_rfc3339() {
        assert_eq!(parse_timestamp("2023-11-02").unwrap().month(), 11);
        assert_eq!(parse_timestamp("2023-11-02 08:00:00").unwrap().day(), 2);
        assert_eq!(parse_timestamp("2023-11-02T08:00:00Z").unwrap().year(), 2023);
    }

    #[test]
    fn test_unparseable_timestamp_has_no_period() {
        let response = Response::from_timestamp("ayer", "Cálculo", Some("no entiendo"), None);
        assert_eq!(response.timestamp, None);
        assert_eq!(response.year, None);
        assert_eq!(response.month, None);
        assert!(!response.matches_period(2024, 3));
    }

    #[test]
    fn test_blank_reasons_are_absent() {
        let response = Response::from_period("Física", Some(2024), Some(5), Some("   "), Some(""));
        assert_eq!(response.reason_primary, None);
        assert_eq!(response.reason_secondary, None);
    }

    #[test]
    fn test_out_of_range_month_is_dropped() {
        let response = Response::from_period("Física", Some(2024), Some(13), None, None);
        assert_eq!(response.month, None);
    }

    #[test]
    fn test_parse_whole_number() {
        assert_eq!(parse_whole_number::<i32>("2024"), Some(2024));
        assert_eq!(parse_whole_number::<i32>(" 2024.0 "), Some(2024));
        assert_eq!(parse_whole_number::<u32>("marzo"), None);
    }

    #[test]
    fn test_config_round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();

        Config::default().save_to_file(path).unwrap();
        let loaded = Config::load_from_file(path).unwrap();
        assert_eq!(loaded.data_source_mode, DataSourceMode::Local);
        assert_eq!(loaded.columns, ColumnMapping::default());
        assert_eq!(loaded.top_table, 20);
        assert_eq!(loaded.top_cloud, 300);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(
            "data_source_mode = \"remote\"\nremote_url = \"https://example.com/data.csv\"\n",
        )
        .unwrap();
        assert_eq!(config.min_token_len, 3);
        assert_eq!(config.reason_scope, ReasonScope::Filtered);
        assert!(!config.cross_response_bigrams);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_keeps_length_floor() {
        let mut config = Config::default();
        for len in [1, 2] {
            config.min_token_len = len;
            assert!(config.validate().is_err());
        }
        config.min_token_len = 3;
        assert!(config.validate().is_ok());
        config.min_token_len = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_source_for_mode() {
        let mut config = Config::default();
        config.data_source_mode = DataSourceMode::Remote;
        config.remote_url = None;
        assert!(config.validate().is_err());
    }
}
