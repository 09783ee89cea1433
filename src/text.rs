//! Free-text reason analysis
//!
//! Turns the primary reasons of a set of responses into a weighted phrase
//! table: unigrams weigh 1, adjacent-token bigrams weigh 2.

use std::collections::{HashMap, HashSet};

/// Tokens shorter than this many characters never count on their own.
pub const MIN_TOKEN_LEN: usize = 3;

/// Connector and function words of the survey language (Spanish), plus a few
/// quantifiers that show up in nearly every answer.
pub const SPANISH_STOPWORDS: &[&str] = &[
    "a", "al", "algo", "algunas", "algunos", "ante", "antes", "aun", "aunque", "bien", "cada",
    "casi", "como", "con", "contra", "cual", "cuando", "de", "del", "desde", "donde", "dos",
    "durante", "e", "el", "ella", "ellas", "ellos", "en", "entre", "era", "eran", "es", "esa",
    "esas", "ese", "eso", "esos", "esta", "estaba", "estan", "estas", "este", "esto", "estos",
    "fue", "fueron", "ha", "hace", "han", "hasta", "hay", "la", "las", "le", "les", "lo", "los",
    "mas", "me", "mi", "mis", "mucho", "muchos", "muy", "nada", "ni", "no", "nos", "nosotros",
    "o", "otra", "otras", "otro", "otros", "para", "pero", "poco", "por", "porque", "que",
    "quien", "se", "sea", "ser", "si", "sin", "sobre", "solo", "son", "su", "sus", "suficiente",
    "tambien", "tan", "tanto", "te", "tiene", "todo", "todos", "tu", "tus", "un", "una", "unas",
    "uno", "unos", "y", "ya", "yo", "más", "también", "sí", "él", "tú", "qué", "cómo", "está",
    "están", "sólo", "mí",
];

/// Set of words excluded from standalone phrase counting.
#[derive(Debug, Clone)]
pub struct StopwordSet {
    words: HashSet<String>,
}

impl Default for StopwordSet {
    fn default() -> Self {
        Self::from_list(SPANISH_STOPWORDS)
    }
}

impl StopwordSet {
    pub fn from_list(words: &[&str]) -> Self {
        Self {
            words: words.iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    pub fn add_stopwords<S: AsRef<str>>(&mut self, words: &[S]) {
        for word in words {
            self.words.insert(word.as_ref().trim().to_lowercase());
        }
    }

    pub fn is_stopword(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }
}

/// Lowercase and drop ASCII punctuation. Non-ASCII marks such as `¿` or `¡` stay.
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect()
}

/// Join every present text with a single space and normalize the result.
pub fn normalize_corpus<'a, I>(texts: I) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let joined = texts.into_iter().flatten().collect::<Vec<_>>().join(" ");
    normalize_text(&joined)
}

/// Split on whitespace runs, keeping order.
pub fn tokenize(normalized: &str) -> Vec<String> {
    normalized.split_whitespace().map(String::from).collect()
}

/// Phrase → weight mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrequencyTable {
    weights: HashMap<String, u32>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, phrase: String, weight: u32) {
        *self.weights.entry(phrase).or_insert(0) += weight;
    }

    #[cfg(test)]
    pub fn get(&self, phrase: &str) -> Option<u32> {
        self.weights.get(phrase).copied()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn total_weight(&self) -> u32 {
        self.weights.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// The `n` heaviest phrases, heaviest first. Equal weights are ordered
    /// alphabetically so repeated calls always agree.
    pub fn top(&self, n: usize) -> Vec<(String, u32)> {
        let mut entries: Vec<(String, u32)> = self
            .weights
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(n);
        entries
    }
}

pub struct PhraseAnalyzer {
    stopwords: StopwordSet,
    min_len: usize,
    cross_response_bigrams: bool,
}

impl Default for PhraseAnalyzer {
    fn default() -> Self {
        Self::new(StopwordSet::default(), MIN_TOKEN_LEN)
    }
}

impl PhraseAnalyzer {
    pub fn new(stopwords: StopwordSet, min_len: usize) -> Self {
        Self {
            stopwords,
            min_len,
            cross_response_bigrams: false,
        }
    }

    /// Let bigrams run across the boundary between two consecutive responses.
    pub fn with_cross_response_bigrams(mut self, enabled: bool) -> Self {
        self.cross_response_bigrams = enabled;
        self
    }

    fn long_enough(&self, token: &str) -> bool {
        token.chars().count() >= self.min_len
    }

    pub fn admits_unigram(&self, token: &str) -> bool {
        self.long_enough(token) && !self.stopwords.is_stopword(token)
    }

    /// Both halves must be long enough; only a pair of two stopwords is rejected.
    pub fn admits_bigram(&self, first: &str, second: &str) -> bool {
        self.long_enough(first)
            && self.long_enough(second)
            && !(self.stopwords.is_stopword(first) && self.stopwords.is_stopword(second))
    }

    /// Add the unigram and bigram contributions of one token stream to `table`.
    pub fn accumulate(&self, table: &mut FrequencyTable, tokens: &[String]) {
        for token in tokens {
            if self.admits_unigram(token) {
                table.add(token.clone(), 1);
            }
        }

        for pair in tokens.windows(2) {
            if self.admits_bigram(&pair[0], &pair[1]) {
                table.add(format!("{} {}", pair[0], pair[1]), 2);
            }
        }
    }

    pub fn analyze_tokens(&self, tokens: &[String]) -> FrequencyTable {
        let mut table = FrequencyTable::new();
        self.accumulate(&mut table, tokens);
        table
    }

    /// Run the whole pipeline over a corpus of reason texts. Absent texts are
    /// skipped. Unless cross-response bigrams are enabled, each response is
    /// its own token stream.
    pub fn analyze_corpus<'a, I>(&self, texts: I) -> FrequencyTable
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        if self.cross_response_bigrams {
            return self.analyze_tokens(&tokenize(&normalize_corpus(texts)));
        }

        let mut table = FrequencyTable::new();
        for text in texts.into_iter().flatten() {
            self.accumulate(&mut table, &tokenize(&normalize_text(text)));
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<String> {
        tokenize(&normalize_text(text))
    }

    #[test]
    fn test_normalize_strips_ascii_punctuation_only() {
        assert_eq!(normalize_text("¡No Tengo TIEMPO!"), "¡no tengo tiempo");
        assert_eq!(normalize_text("(a)-b,c.d;e:f\"g'h"), "abcdefgh");
        assert_eq!(normalize_text("¿Por qué?"), "¿por qué");
    }

    #[test]
    fn test_normalize_corpus_skips_absent_values() {
        let corpus = normalize_corpus(vec![Some("Falta de tiempo."), None, Some("Trabajo")]);
        assert_eq!(corpus, "falta de tiempo trabajo");
        assert_eq!(normalize_corpus(vec![None, None]), "");
        assert_eq!(normalize_corpus(Vec::<Option<&str>>::new()), "");
    }

    #[test]
    fn test_tokenize_splits_whitespace_runs() {
        assert_eq!(tokenize("  uno \t dos\n\ntres "), vec!["uno", "dos", "tres"]);
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_single_response_scenario() {
        let analyzer = PhraseAnalyzer::default();
        let table = analyzer.analyze_corpus(vec![Some("no tengo tiempo suficiente para estudiar")]);

        let mut expected = FrequencyTable::new();
        for (phrase, weight) in [
            ("tengo", 1),
            ("tiempo", 1),
            ("estudiar", 1),
            ("tengo tiempo", 2),
            ("tiempo suficiente", 2),
            ("para estudiar", 2),
        ] {
            expected.add(phrase.to_string(), weight);
        }
        assert_eq!(table, expected);
        assert_eq!(table.get("suficiente para"), None);
        assert_eq!(table.get("no tengo"), None);
    }

    #[test]
    fn test_bigram_admission_boundary() {
        let analyzer = PhraseAnalyzer::new(StopwordSet::from_list(&["para", "con", "sin"]), 3);
        assert!(!analyzer.admits_bigram("para", "con"));
        assert!(analyzer.admits_bigram("para", "estudiar"));
        assert!(analyzer.admits_bigram("estudiar", "sin"));
        assert!(!analyzer.admits_bigram("de", "estudiar"));

        let table = analyzer.analyze_tokens(&tokens("sin con estudiar"));
        assert_eq!(table.get("sin con"), None);
        assert_eq!(table.get("con estudiar"), Some(2));
    }

    #[test]
    fn test_stopwords_never_standalone_keys() {
        let analyzer = PhraseAnalyzer::default();
        let table = analyzer.analyze_corpus(vec![
            Some("Para mí es muy difícil porque trabajo y no tengo tiempo para nada"),
            Some("Durante el semestre tuve problemas con el profesor"),
        ]);
        let stopwords = StopwordSet::default();
        for (phrase, _) in table.iter() {
            if !phrase.contains(' ') {
                assert!(!stopwords.is_stopword(phrase), "stopword key: {}", phrase);
                assert!(phrase.chars().count() >= MIN_TOKEN_LEN, "short key: {}", phrase);
            }
        }
        assert_eq!(table.get("porque trabajo"), Some(2));
    }

    #[test]
    fn test_weight_invariant() {
        let analyzer = PhraseAnalyzer::default();
        let text = "el profesor explica muy rápido y no entiendo la materia porque el profesor no repite";
        let stream = tokens(text);
        let table = analyzer.analyze_tokens(&stream);

        let unigrams = stream.iter().filter(|t| analyzer.admits_unigram(t)).count() as u32;
        let bigrams = stream
            .windows(2)
            .filter(|p| analyzer.admits_bigram(&p[0], &p[1]))
            .count() as u32;

        let unigram_sum: u32 = table.iter().filter(|(k, _)| !k.contains(' ')).map(|(_, w)| w).sum();
        let bigram_sum: u32 = table.iter().filter(|(k, _)| k.contains(' ')).map(|(_, w)| w).sum();
        assert_eq!(unigram_sum, unigrams);
        assert_eq!(bigram_sum, 2 * bigrams);
        assert_eq!(table.get("profesor"), Some(2));
        assert_eq!(table.get("profesor explica"), Some(2));
    }

    #[test]
    fn test_idempotent() {
        let analyzer = PhraseAnalyzer::default();
        let corpus = vec![Some("Horario de trabajo"), None, Some("Falta de tiempo, horario de trabajo")];
        let first = analyzer.analyze_corpus(corpus.clone());
        let second = analyzer.analyze_corpus(corpus);
        assert_eq!(first, second);
        assert_eq!(first.top(10), second.top(10));
    }

    #[test]
    fn test_degenerate_corpus_is_empty() {
        let analyzer = PhraseAnalyzer::default();
        assert!(analyzer.analyze_corpus(Vec::<Option<&str>>::new()).is_empty());
        assert!(analyzer.analyze_corpus(vec![None, Some("   ")]).is_empty());
        assert!(analyzer.analyze_corpus(vec![Some("no es para que de la"), Some("yo, tú... él!")]).is_empty());
    }

    #[test]
    fn test_row_boundary_controls_cross_response_bigrams() {
        let corpus = vec![Some("mucho trabajo"), Some("horario difícil")];

        let per_response = PhraseAnalyzer::default().analyze_corpus(corpus.clone());
        assert_eq!(per_response.get("trabajo horario"), None);
        assert_eq!(per_response.get("horario difícil"), Some(2));

        let blob = PhraseAnalyzer::default()
            .with_cross_response_bigrams(true)
            .analyze_corpus(corpus);
        assert_eq!(blob.get("trabajo horario"), Some(2));
    }

    #[test]
    fn test_top_orders_by_weight_then_phrase() {
        let mut table = FrequencyTable::new();
        table.add("b".to_string(), 5);
        table.add("c".to_string(), 1);
        table.add("a".to_string(), 5);

        let top = table.top(2);
        assert_eq!(top, vec![("a".to_string(), 5), ("b".to_string(), 5)]);
        assert_eq!(table.top(2), top);
        assert_eq!(table.top(10).len(), 3);
        assert!(table.top(0).is_empty());
        assert_eq!(table.total_weight(), 11);
    }

    #[test]
    fn test_extra_stopwords() {
        let mut stopwords = StopwordSet::default();
        stopwords.add_stopwords(&["  Profesor "]);
        let analyzer = PhraseAnalyzer::new(stopwords, MIN_TOKEN_LEN);
        let table = analyzer.analyze_corpus(vec![Some("el profesor falta")]);
        assert_eq!(table.get("profesor"), None);
        assert_eq!(table.get("falta"), Some(1));
        assert_eq!(table.get("profesor falta"), Some(2));
    }
}
