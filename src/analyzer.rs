use crate::models::{Config, ReasonScope, Response};
use crate::text::{FrequencyTable, PhraseAnalyzer, StopwordSet};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Year, month and optional course selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub year: i32,
    pub month: u32,
    pub subjects: Vec<String>,
}

impl Filter {
    pub fn new(year: i32, month: u32) -> Self {
        Self {
            year,
            month,
            subjects: Vec::new(),
        }
    }

    pub fn with_subjects(mut self, subjects: Vec<String>) -> Self {
        self.subjects = subjects;
        self
    }

    fn subject_selected(&self, subject: &str) -> bool {
        self.subjects.is_empty() || self.subjects.iter().any(|s| s == subject)
    }

    pub fn matches(&self, response: &Response) -> bool {
        response.matches_period(self.year, self.month) && self.subject_selected(&response.subject)
    }

    /// Borrow the matching rows in source order.
    pub fn apply<'a>(&self, responses: &'a [Response]) -> Vec<&'a Response> {
        responses.iter().filter(|r| self.matches(r)).collect()
    }
}

/// Choices offered by the year, month and subject selectors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterOptions {
    pub years: Vec<i32>,
    pub months: Vec<u32>,
    pub subjects: Vec<String>,
}

impl FilterOptions {
    pub fn from_responses(responses: &[Response]) -> Self {
        let years: BTreeSet<i32> = responses.iter().filter_map(|r| r.year).collect();
        let months: BTreeSet<u32> = responses.iter().filter_map(|r| r.month).collect();
        let subjects: BTreeSet<&str> = responses
            .iter()
            .map(|r| r.subject.as_str())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            years: years.into_iter().collect(),
            months: months.into_iter().collect(),
            subjects: subjects.into_iter().map(str::to_string).collect(),
        }
    }

    /// Most recent dated period in the data.
    pub fn latest_period(responses: &[Response]) -> Option<(i32, u32)> {
        responses
            .iter()
            .filter_map(|r| Some((r.year?, r.month?)))
            .max()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectCount {
    pub subject: String,
    pub count: usize,
}

/// Responses per subject, most reported first; ties by subject name.
pub fn subject_counts(rows: &[&Response]) -> Vec<SubjectCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for row in rows {
        *counts.entry(row.subject.as_str()).or_insert(0) += 1;
    }

    let mut result: Vec<SubjectCount> = counts
        .into_iter()
        .map(|(subject, count)| SubjectCount {
            subject: subject.to_string(),
            count,
        })
        .collect();
    result.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.subject.cmp(&b.subject)));
    result
}

/// Subject × month counts for one year.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossTab {
    pub year: i32,
    pub subjects: Vec<String>,
    /// One row per subject, twelve columns (January first).
    pub cells: Vec<[usize; 12]>,
}

impl CrossTab {
    pub fn build(responses: &[Response], year: i32, subjects: &[String]) -> Self {
        let mut by_subject: HashMap<&str, [usize; 12]> = HashMap::new();
        for response in responses {
            if response.year != Some(year) {
                continue;
            }
            if !subjects.is_empty() && !subjects.iter().any(|s| *s == response.subject) {
                continue;
            }
            if let Some(month) = response.month {
                by_subject.entry(response.subject.as_str()).or_insert([0; 12])[(month - 1) as usize] += 1;
            }
        }

        let mut names: Vec<&str> = by_subject.keys().copied().collect();
        names.sort_unstable();

        Self {
            year,
            cells: names.iter().map(|n| by_subject[n]).collect(),
            subjects: names.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn get(&self, subject: &str, month: u32) -> usize {
        if !(1..=12).contains(&month) {
            return 0;
        }
        self.subjects
            .iter()
            .position(|s| s == subject)
            .map(|i| self.cells[i][(month - 1) as usize])
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

/// Headline numbers for the selected period.
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_responses: usize,
    pub distinct_subjects: usize,
    pub top_subject: Option<SubjectCount>,
    pub with_reason: usize,
    pub with_secondary_reason: usize,
}

impl Metrics {
    pub fn compute(rows: &[&Response], counts: &[SubjectCount]) -> Self {
        let distinct: HashSet<&str> = rows.iter().map(|r| r.subject.as_str()).collect();
        Self {
            total_responses: rows.len(),
            distinct_subjects: distinct.len(),
            top_subject: counts.first().cloned(),
            with_reason: rows.iter().filter(|r| r.reason_primary.is_some()).count(),
            with_secondary_reason: rows.iter().filter(|r| r.reason_secondary.is_some()).count(),
        }
    }
}

/// Knobs for one render pass.
pub struct Settings {
    pub analyzer: PhraseAnalyzer,
    pub reason_scope: ReasonScope,
    pub top_table: usize,
    pub top_cloud: usize,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        let mut stopwords = StopwordSet::default();
        stopwords.add_stopwords(config.stopwords_extra.as_slice());
        log::debug!("Using {} stopwords", stopwords.len());

        Self {
            analyzer: PhraseAnalyzer::new(stopwords, config.min_token_len)
                .with_cross_response_bigrams(config.cross_response_bigrams),
            reason_scope: config.reason_scope,
            top_table: config.top_table,
            top_cloud: config.top_cloud,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything a renderer needs for one filter selection.
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    /// No row matched the filters.
    NoData { filter: Filter },
    Report(Box<Report>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub filter: Filter,
    pub metrics: Metrics,
    pub subject_counts: Vec<SubjectCount>,
    pub crosstab: CrossTab,
    pub phrases: FrequencyTable,
    /// Ranked list for tabular display.
    pub top_phrases: Vec<(String, u32)>,
    /// Ranked list for the cloud display.
    pub cloud: Vec<(String, u32)>,
}

impl Report {
    /// False when every reason token was filtered out.
    pub fn has_significant_text(&self) -> bool {
        !self.phrases.is_empty()
    }
}

/// Build the view for `filter` over `dataset`. Pure: the dataset is only read.
pub fn render(dataset: &[Response], filter: &Filter, settings: &Settings) -> View {
    let rows = filter.apply(dataset);
    if rows.is_empty() {
        return View::NoData {
            filter: filter.clone(),
        };
    }

    let counts = subject_counts(&rows);
    let metrics = Metrics::compute(&rows, &counts);
    let crosstab = CrossTab::build(dataset, filter.year, &filter.subjects);

    let phrases = match settings.reason_scope {
        ReasonScope::Filtered => settings
            .analyzer
            .analyze_corpus(rows.iter().map(|r| r.reason_primary.as_deref())),
        ReasonScope::All => settings
            .analyzer
            .analyze_corpus(dataset.iter().map(|r| r.reason_primary.as_deref())),
    };

    View::Report(Box::new(Report {
        filter: filter.clone(),
        metrics,
        subject_counts: counts,
        crosstab,
        top_phrases: phrases.top(settings.top_table),
        cloud: phrases.top(settings.top_cloud),
        phrases,
    }))
}
