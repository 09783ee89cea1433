use crate::models::{parse_timestamp, parse_whole_number, ColumnMapping, Config, DataSourceMode, Response};
use anyhow::{Context, Result};
use regex::Regex;
use scraper::{Html, Selector};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where the survey table comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    /// CSV with columns subject, year, month and optional reason columns.
    LocalFile(PathBuf),
    /// Published sheet (CSV or HTML table) mapped by column position.
    Remote { url: String, columns: ColumnMapping },
}

impl DataSource {
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let source = match config.data_source_mode {
            DataSourceMode::Local => {
                DataSource::LocalFile(PathBuf::from(config.data_file.clone().unwrap_or_default()))
            }
            DataSourceMode::Remote => DataSource::Remote {
                url: config.remote_url.clone().unwrap_or_default(),
                columns: config.columns.clone(),
            },
        };
        Ok(source)
    }

    pub fn describe(&self) -> String {
        match self {
            DataSource::LocalFile(path) => path.display().to_string(),
            DataSource::Remote { url, .. } => url.clone(),
        }
    }
}

pub struct DatasetLoader {
    client: reqwest::Client,
}

impl DatasetLoader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub async fn load(&self, source: &DataSource) -> Result<Vec<Response>> {
        match source {
            DataSource::LocalFile(path) => self.load_file(path),
            DataSource::Remote { url, columns } => self.fetch_url(url, columns).await,
        }
    }

    pub fn load_file(&self, path: &Path) -> Result<Vec<Response>> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        parse_local_csv(&content)
            .with_context(|| format!("Failed to parse CSV file: {}", path.display()))
    }

    pub async fn fetch_url(&self, url: &str, columns: &ColumnMapping) -> Result<Vec<Response>> {
        let export_url = sheet_export_url(url);
        if export_url != url {
            log::debug!("Rewrote sheet link {} to {}", url, export_url);
        }
        println!("🌐 Fetching data from: {}", export_url);

        let response = self
            .client
            .get(&export_url)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .with_context(|| format!("Failed to fetch URL: {}", export_url))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "HTTP request failed with status: {}",
                response.status()
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let content = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from: {}", export_url))?;

        println!("   ✅ Received {} chars", content.len());
        parse_remote_body(&content, content_type.as_deref(), columns)
            .with_context(|| format!("Unusable response from: {}", export_url))
    }
}

/// Pick the parser for a fetched body. HTML without a table (a sign-in or
/// error page) is an error rather than an empty or junk dataset.
pub fn parse_remote_body(
    content: &str,
    content_type: Option<&str>,
    columns: &ColumnMapping,
) -> Result<Vec<Response>> {
    if !looks_like_html(content, content_type) {
        return parse_remote_csv(content, columns);
    }

    if !content.to_lowercase().contains("<table") {
        return Err(anyhow::anyhow!("Endpoint returned an HTML page without a table"));
    }
    log::debug!("Reading first table of HTML page");
    Ok(parse_html_table(content, columns))
}

/// Turn a Google Sheets edit link into its CSV export link. Other URLs pass through.
pub fn sheet_export_url(url: &str) -> String {
    let sheet_regex =
        Regex::new(r"^(https://docs\.google\.com/spreadsheets/d/[A-Za-z0-9_-]+)/edit(?:[?#].*?gid=(\d+))?")
            .expect("sheet regex is valid");

    match sheet_regex.captures(url) {
        Some(caps) => {
            let gid = caps.get(2).map(|m| m.as_str()).unwrap_or("0");
            format!("{}/export?format=csv&gid={}", &caps[1], gid)
        }
        None => url.to_string(),
    }
}

fn looks_like_html(content: &str, content_type: Option<&str>) -> bool {
    let declared_html = content_type.map_or(false, |ct| ct.to_lowercase().contains("text/html"));
    declared_html || content.trim_start().starts_with('<')
}

fn cell<'a>(row: &'a [String], index: usize) -> Option<&'a str> {
    row.get(index).map(String::as_str)
}

fn is_blank_row(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

fn read_csv_rows(content: &str) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// Local layout: subject, year, month, primary reason, secondary reason.
pub fn parse_local_csv(content: &str) -> Result<Vec<Response>> {
    let rows = read_csv_rows(content)?;
    let mut responses = Vec::with_capacity(rows.len());
    let mut skipped = 0;

    for row in rows {
        if is_blank_row(&row) {
            skipped += 1;
            continue;
        }
        responses.push(Response::from_period(
            cell(&row, 0).unwrap_or_default(),
            cell(&row, 1).and_then(parse_whole_number),
            cell(&row, 2).and_then(parse_whole_number),
            cell(&row, 3),
            cell(&row, 4),
        ));
    }

    if skipped > 0 {
        log::debug!("Skipped {} blank rows", skipped);
    }
    Ok(responses)
}

fn map_remote_row(row: &[String], columns: &ColumnMapping) -> Response {
    Response::from_timestamp(
        cell(row, columns.timestamp).unwrap_or_default(),
        cell(row, columns.subject).unwrap_or_default(),
        cell(row, columns.reason_primary),
        columns.reason_secondary.and_then(|i| cell(row, i)),
    )
}

fn map_remote_rows(rows: Vec<Vec<String>>, columns: &ColumnMapping) -> Vec<Response> {
    let responses: Vec<Response> = rows
        .iter()
        .filter(|row| !is_blank_row(row))
        .map(|row| map_remote_row(row, columns))
        .collect();

    let undated = responses.iter().filter(|r| r.timestamp.is_none()).count();
    if undated > 0 {
        log::warn!("{} responses have an unparseable timestamp and will not match any period", undated);
    }
    responses
}

pub fn parse_remote_csv(content: &str, columns: &ColumnMapping) -> Result<Vec<Response>> {
    Ok(map_remote_rows(read_csv_rows(content)?, columns))
}

/// Read the first `<table>` of a published sheet page. The first `td` row is
/// the header unless a leading `th` row came before it and its timestamp cell
/// parses. Published sheets put column letters in that `th` row and the real
/// labels in the first `td` row.
pub fn parse_html_table(content: &str, columns: &ColumnMapping) -> Vec<Response> {
    let document = Html::parse_document(content);
    let table_selector = Selector::parse("table").expect("table selector is valid");
    let row_selector = Selector::parse("tr").expect("row selector is valid");
    let td_selector = Selector::parse("td").expect("td selector is valid");
    let th_selector = Selector::parse("th").expect("th selector is valid");

    let table = match document.select(&table_selector).next() {
        Some(table) => table,
        None => {
            println!("   ⚠️  Warning: No table found in page");
            return Vec::new();
        }
    };

    let mut has_th_header = false;
    let mut rows = Vec::new();
    for (i, row) in table.select(&row_selector).enumerate() {
        let cells: Vec<String> = row
            .select(&td_selector)
            .map(|c| c.text().collect::<String>().trim().to_string())
            .collect();

        if cells.is_empty() {
            if i == 0 && row.select(&th_selector).next().is_some() {
                has_th_header = true;
            }
            continue;
        }
        rows.push(cells);
    }

    let first_is_header = rows.first().map_or(false, |first| {
        !has_th_header
            || parse_timestamp(cell(first, columns.timestamp).unwrap_or_default()).is_none()
    });
    if first_is_header {
        rows.remove(0);
    }
    map_remote_rows(rows, columns)
}

/// Process-wide immutable copy of the survey table. Loaded once by `init`;
/// only `reload` replaces it.
pub struct DatasetStore {
    source: DataSource,
    loader: DatasetLoader,
    snapshot: Arc<[Response]>,
}

impl DatasetStore {
    pub async fn init(source: DataSource) -> Result<Self> {
        let loader = DatasetLoader::new();
        let responses = loader
            .load(&source)
            .await
            .with_context(|| format!("Failed to load dataset from {}", source.describe()))?;
        log::info!("Loaded {} responses from {}", responses.len(), source.describe());

        Ok(Self {
            source,
            loader,
            snapshot: responses.into(),
        })
    }

    /// Fetch the source again. The previous snapshot is kept if loading fails.
    pub async fn reload(&mut self) -> Result<usize> {
        let responses = self
            .loader
            .load(&self.source)
            .await
            .with_context(|| format!("Failed to reload dataset from {}", self.source.describe()))?;
        let count = responses.len();
        self.snapshot = responses.into();
        log::info!("Reloaded {} responses", count);
        Ok(count)
    }

    pub fn snapshot(&self) -> Arc<[Response]> {
        Arc::clone(&self.snapshot)
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }
}
