//! Query field DSL: turns one search term into weighted backend query
//! fragments.
//!
//! Each [`QueryField`] maps a term to an optional [`Fragment`]. A collection
//! combines the fragments of all its fields per term (OR, strongest field
//! wins) and all terms of the query (AND), see [`build_query`].
//!
//! Fields are configured in the collection mapping as an internally tagged
//! enum:
//!
//! ```json
//! {"type": "only", "pattern": "\\d{5}", "field": {"type": "simple", "field": "plz", "boost": 3.0}}
//! ```

use std::fmt;

use geocodr_solr::strip_special_chars;
use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Deserializer, de};

mod ngram;

use ngram::{edge_ngrams, fold_german, format_boost, ngrams};

/// Minimum-match policy for [`QueryField::NGram`]: all but one gram below 4
/// grams, all but two below 6, all but three below 8, all but four above.
pub const NGRAM_MIN_MATCH: &str = "2<-1 4<-2 6<-3 8<-4";

/// A backend query snippet for one field and one term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub query: String,
    /// An exclusive fragment suppresses all non-exclusive fragments of the
    /// same term.
    pub exclusive: bool,
}

impl Fragment {
    fn new(query: String) -> Self {
        Self {
            query,
            exclusive: false,
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query)
    }
}

/// A compiled regular expression that deserializes from its source string.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    /// Compile `pattern` so that it only matches the whole input.
    pub fn whole(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{pattern})$")).map(Self)
    }

    pub fn as_regex(&self) -> &Regex {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Self::new(&source).map_err(de::Error::custom)
    }
}

/// Pattern that must match a whole term; used by [`QueryField::Only`].
#[derive(Debug, Clone)]
pub struct WholePattern(Pattern);

impl WholePattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Pattern::whole(pattern).map(Self)
    }

    pub fn is_match(&self, term: &str) -> bool {
        self.0.0.is_match(term)
    }
}

impl<'de> Deserialize<'de> for WholePattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Self::new(&source).map_err(de::Error::custom)
    }
}

fn default_boost() -> f64 {
    1.0
}
const fn default_min_term() -> usize {
    4
}
const fn default_min_gram() -> usize {
    3
}
const fn default_max_gram() -> usize {
    3
}
const fn default_max_edge_gram() -> usize {
    8
}

/// Strategy that turns one term into an optional query fragment.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum QueryField {
    /// Exact match: `field:term`.
    Simple {
        field: String,
        #[serde(default = "default_boost")]
        boost: f64,
    },
    /// Prefix match `field:term*`, only for terms of at least `min_term` characters.
    Prefix {
        field: String,
        #[serde(default = "default_min_term")]
        min_term: usize,
        #[serde(default = "default_boost")]
        boost: f64,
    },
    /// Fuzzy match on overlapping grams, see [`NGRAM_MIN_MATCH`].
    #[serde(rename = "ngram")]
    NGram {
        field: String,
        #[serde(default = "default_min_gram")]
        min_gram: usize,
        #[serde(default = "default_max_gram")]
        max_gram: usize,
        #[serde(default = "default_boost")]
        boost: f64,
    },
    /// Like [`QueryField::NGram`], on a term folded for German spelling variants.
    #[serde(rename = "german_ngram")]
    GermanNGram {
        field: String,
        #[serde(default = "default_min_gram")]
        min_gram: usize,
        #[serde(default = "default_max_gram")]
        max_gram: usize,
        #[serde(default = "default_boost")]
        boost: f64,
    },
    /// Prefix grams of increasing length, all of which must match.
    #[serde(rename = "edge_ngram")]
    EdgeNGram {
        field: String,
        #[serde(default = "default_min_gram")]
        min_gram: usize,
        #[serde(default = "default_max_edge_gram")]
        max_gram: usize,
        #[serde(default = "default_boost")]
        boost: f64,
    },
    /// Delegate only if the whole term matches `pattern`; the fragment is exclusive.
    Only {
        pattern: WholePattern,
        field: Box<QueryField>,
    },
    /// Rewrite the term before delegating. Boosts belong on the wrapped field.
    PatternReplace {
        pattern: Pattern,
        replacement: String,
        field: Box<QueryField>,
    },
}

impl QueryField {
    pub fn simple(field: impl Into<String>) -> Self {
        Self::Simple {
            field: field.into(),
            boost: 1.0,
        }
    }

    pub fn prefix(field: impl Into<String>) -> Self {
        Self::Prefix {
            field: field.into(),
            min_term: default_min_term(),
            boost: 1.0,
        }
    }

    pub fn ngram(field: impl Into<String>) -> Self {
        Self::NGram {
            field: field.into(),
            min_gram: default_min_gram(),
            max_gram: default_max_gram(),
            boost: 1.0,
        }
    }

    pub fn german_ngram(field: impl Into<String>) -> Self {
        Self::GermanNGram {
            field: field.into(),
            min_gram: default_min_gram(),
            max_gram: default_max_gram(),
            boost: 1.0,
        }
    }

    pub fn edge_ngram(field: impl Into<String>) -> Self {
        Self::EdgeNGram {
            field: field.into(),
            min_gram: default_min_gram(),
            max_gram: default_max_edge_gram(),
            boost: 1.0,
        }
    }

    pub fn only(pattern: &str, field: Self) -> Result<Self, regex::Error> {
        Ok(Self::Only {
            pattern: WholePattern::new(pattern)?,
            field: Box::new(field),
        })
    }

    pub fn pattern_replace(
        pattern: &str,
        replacement: impl Into<String>,
        field: Self,
    ) -> Result<Self, regex::Error> {
        Ok(Self::PatternReplace {
            pattern: Pattern::new(pattern)?,
            replacement: replacement.into(),
            field: Box::new(field),
        })
    }

    /// Set the boost. Wrappers pass it on to the field they wrap.
    pub fn boost(mut self, value: f64) -> Self {
        match &mut self {
            Self::Simple { boost, .. }
            | Self::Prefix { boost, .. }
            | Self::NGram { boost, .. }
            | Self::GermanNGram { boost, .. }
            | Self::EdgeNGram { boost, .. } => *boost = value,
            Self::Only { field, .. } | Self::PatternReplace { field, .. } => {
                let inner = std::mem::replace(field.as_mut(), Self::simple(""));
                **field = inner.boost(value);
            }
        }
        self
    }

    /// Build the fragment for `term`, if this field has one.
    pub fn fragment(&self, term: &str) -> Option<Fragment> {
        match self {
            Self::Simple { field, boost } => {
                if term.is_empty() {
                    return None;
                }
                Some(Fragment::new(with_boost(format!("{field}:{term}"), *boost)))
            }
            Self::Prefix {
                field,
                min_term,
                boost,
            } => {
                if term.chars().count() < *min_term {
                    return None;
                }
                Some(Fragment::new(with_boost(format!("{field}:{term}*"), *boost)))
            }
            Self::NGram {
                field,
                min_gram,
                max_gram,
                boost,
            } => ngram_fragment(field, &ngrams(term, *min_gram, *max_gram), *boost),
            Self::GermanNGram {
                field,
                min_gram,
                max_gram,
                boost,
            } => ngram_fragment(
                field,
                &ngrams(&fold_german(term), *min_gram, *max_gram),
                *boost,
            ),
            Self::EdgeNGram {
                field,
                min_gram,
                max_gram,
                boost,
            } => {
                let grams = edge_ngrams(term, *min_gram, *max_gram);
                if grams.is_empty() {
                    return None;
                }
                let query = format!(
                    "{{!edismax qf={field} v='{}' mm='100%'}}",
                    grams.join(" ")
                );
                Some(Fragment::new(with_boost(query, *boost)))
            }
            Self::Only { pattern, field } => {
                if !pattern.is_match(term) {
                    return None;
                }
                field.fragment(term).map(|f| Fragment {
                    exclusive: true,
                    ..f
                })
            }
            Self::PatternReplace {
                pattern,
                replacement,
                field,
            } => {
                let term = pattern.as_regex().replace_all(term, replacement.as_str());
                field.fragment(&term)
            }
        }
    }
}

fn with_boost(query: String, boost: f64) -> String {
    if (boost - 1.0).abs() < f64::EPSILON {
        query
    } else {
        format!("{query}^{}", format_boost(boost))
    }
}

/// Per-gram weight of an n-gram fragment: `boost / gram_count`, so longer
/// terms add less weight per gram.
pub fn ngram_weight(boost: f64, gram_count: usize) -> f64 {
    boost / gram_count as f64
}

fn ngram_fragment(field: &str, grams: &[String], boost: f64) -> Option<Fragment> {
    if grams.is_empty() {
        return None;
    }
    Some(Fragment::new(format!(
        "{{!edismax qf={field} v='{}' mm='{NGRAM_MIN_MATCH}'}}^{}",
        grams.join(" "),
        format_boost(ngram_weight(boost, grams.len())),
    )))
}

/// All fragments for `term` across `fields`, reduced to the exclusive ones
/// if any field claimed the term exclusively.
pub fn term_fragments(fields: &[QueryField], term: &str) -> Vec<Fragment> {
    let fragments = fields.iter().filter_map(|f| f.fragment(term)).collect_vec();
    if fragments.iter().any(|f| f.exclusive) {
        fragments.into_iter().filter(|f| f.exclusive).collect()
    } else {
        fragments
    }
}

/// The OR-combination of all fragments for `term`.
pub fn term_query(fields: &[QueryField], term: &str) -> Option<String> {
    let fragments = term_fragments(fields, term);
    if fragments.is_empty() {
        return None;
    }
    Some(fragments.iter().join(" OR "))
}

/// Build the collection query for a raw search string.
///
/// Special characters are stripped, then every whitespace-separated term
/// becomes a `{!maxscore tie=0}` group (the best matching field scores the
/// term) and all groups are ANDed. Returns `None` if the query has no terms
/// or a term matches none of the fields, as the collection cannot match then.
pub fn build_query(fields: &[QueryField], raw_query: &str) -> Option<String> {
    let query = strip_special_chars(raw_query);
    let groups = query
        .split(' ')
        .filter(|term| !term.is_empty())
        .map(|term| {
            term_query(fields, term).map(|q| format!("_query_:\"{{!maxscore tie=0}}({q})\""))
        })
        .collect::<Option<Vec<_>>>()?;
    if groups.is_empty() {
        return None;
    }
    Some(groups.join(" AND "))
}
