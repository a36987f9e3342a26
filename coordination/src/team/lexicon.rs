//! Keyword tables driving team composition
//!
//! Plain data, injected into the composer and selector so the heuristics
//! can be swapped or tested in isolation.

use std::collections::{BTreeMap, HashMap, HashSet};

/// Built-in domain names
pub const CODE: &str = "code";
pub const DATA: &str = "data";
pub const VISUALIZATION: &str = "visualization";
pub const RESEARCH: &str = "research";

const CODE_KEYWORDS: &[&str] = &[
    "code", "function", "implement", "debug", "bug", "refactor", "script", "python", "rust",
    "javascript", "compile", "class", "api", "algorithm", "program", "test",
];

const DATA_KEYWORDS: &[&str] = &[
    "data", "dataset", "csv", "dataframe", "pandas", "statistics", "statistical", "analyze",
    "analysis", "clean", "aggregate", "sql", "table", "column", "regression", "correlation",
];

const VISUALIZATION_KEYWORDS: &[&str] = &[
    "plot", "chart", "graph", "visualize", "visualization", "dashboard", "histogram", "scatter",
    "figure", "diagram", "heatmap", "matplotlib",
];

const RESEARCH_KEYWORDS: &[&str] = &[
    "research", "paper", "literature", "study", "cite", "citation", "survey", "explain",
    "background", "theory", "hypothesis", "review",
];

const COMPLEXITY_KEYWORDS: &[&str] = &[
    "complex", "complicated", "optimize", "optimization", "integrate", "integration",
    "scalable", "distributed", "pipeline", "architecture", "multiple", "comprehensive",
    "advanced", "performance", "concurrent",
];

/// Lowercase alphanumeric words of `text`
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Domain and complexity keyword tables
#[derive(Debug, Clone)]
pub struct Lexicon {
    /// Domains in tie-break order
    domains: Vec<(String, HashSet<String>)>,
    complexity: HashSet<String>,
    complements: HashMap<String, String>,
}

impl Default for Lexicon {
    fn default() -> Self {
        let domains = [
            (CODE, CODE_KEYWORDS),
            (DATA, DATA_KEYWORDS),
            (VISUALIZATION, VISUALIZATION_KEYWORDS),
            (RESEARCH, RESEARCH_KEYWORDS),
        ];
        let complements = [
            (CODE, DATA),
            (DATA, VISUALIZATION),
            (VISUALIZATION, DATA),
            (RESEARCH, CODE),
        ];

        Self {
            domains: domains
                .iter()
                .map(|(name, words)| (name.to_string(), to_set(words)))
                .collect(),
            complexity: to_set(COMPLEXITY_KEYWORDS),
            complements: complements
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
        }
    }
}

fn to_set(words: &[&str]) -> HashSet<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Lexicon {
    /// Start from an empty table
    pub fn empty() -> Self {
        Self {
            domains: Vec::new(),
            complexity: HashSet::new(),
            complements: HashMap::new(),
        }
    }

    pub fn with_domain<I, S>(mut self, name: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = name.into();
        let words = keywords
            .into_iter()
            .map(|w| w.as_ref().to_lowercase())
            .collect();
        match self.domains.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = words,
            None => self.domains.push((name, words)),
        }
        self
    }

    pub fn with_complexity_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.complexity = keywords
            .into_iter()
            .map(|w| w.as_ref().to_lowercase())
            .collect();
        self
    }

    pub fn with_complement(mut self, domain: impl Into<String>, partner: impl Into<String>) -> Self {
        self.complements.insert(domain.into(), partner.into());
        self
    }

    /// Domain names in tie-break order
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(|(name, _)| name.as_str())
    }

    /// Keyword hits per domain, including domains with zero hits
    pub fn domain_scores(&self, text: &str) -> BTreeMap<String, usize> {
        let words: Vec<String> = tokenize(text).collect();
        self.domains
            .iter()
            .map(|(name, keywords)| {
                let hits = words.iter().filter(|w| keywords.contains(*w)).count();
                (name.clone(), hits)
            })
            .collect()
    }

    /// Domains with at least one hit, ranked by hit count; ties keep table order
    pub fn ranked_domains(&self, text: &str) -> Vec<(String, usize)> {
        let scores = self.domain_scores(text);
        let mut ranked: Vec<(String, usize)> = self
            .domains()
            .filter_map(|name| {
                let hits = scores.get(name).copied().unwrap_or(0);
                (hits > 0).then(|| (name.to_string(), hits))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    pub fn complexity_hits(&self, text: &str) -> usize {
        tokenize(text).filter(|w| self.complexity.contains(w)).count()
    }

    /// Partner domain used to diversify a single-domain team
    pub fn complement(&self, domain: &str) -> Option<&str> {
        self.complements.get(domain).map(String::as_str)
    }
}

/// Symmetric bonus table for worker-type pairs
#[derive(Debug, Clone)]
pub struct SynergyTable {
    pairs: HashMap<(String, String), f64>,
}

impl Default for SynergyTable {
    fn default() -> Self {
        let table = [
            (CODE, DATA, 0.25),
            (DATA, VISUALIZATION, 0.30),
            (CODE, VISUALIZATION, 0.20),
            (RESEARCH, CODE, 0.15),
            (RESEARCH, DATA, 0.20),
            (RESEARCH, VISUALIZATION, 0.15),
        ];
        table
            .iter()
            .fold(Self::empty(), |t, (a, b, bonus)| t.with_pair(*a, *b, *bonus))
    }
}

impl SynergyTable {
    pub fn empty() -> Self {
        Self {
            pairs: HashMap::new(),
        }
    }

    pub fn with_pair(mut self, a: impl Into<String>, b: impl Into<String>, bonus: f64) -> Self {
        self.pairs.insert(ordered(a.into(), b.into()), bonus);
        self
    }

    /// Bonus for having `a` and `b` on the same team; 0.0 if unlisted
    pub fn bonus(&self, a: &str, b: &str) -> f64 {
        self.pairs
            .get(&ordered(a.to_string(), b.to_string()))
            .copied()
            .unwrap_or(0.0)
    }
}

fn ordered(a: String, b: String) -> (String, String) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
