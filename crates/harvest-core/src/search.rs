//! # Search Planner
//!
//! Turns a free-text search term into a WHERE fragment.
//!
//! ## Strategy Selection (first match wins)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  "" / "   "            → no predicate                                   │
//! │  "exact phrase"        → col = 'exact phrase'                           │
//! │  te?t*                 → col LIKE 'te_t%'                               │
//! │  a                     → col LIKE 'a%'                                  │
//! │  你好 世界  (FT table)  → MATCH(col) AGAINST('+你好* +世界*' BOOLEAN)    │
//! │  hello world (FT)      → MATCH(col) AGAINST('hello world' NATURAL)      │
//! │  hello world (no FT)   → col LIKE '%hello%' AND col LIKE '%world%'      │
//! │  你好       (FT table)  → MATCH(col) AGAINST('+你好*' BOOLEAN)           │
//! │  hello      (FT table)  → MATCH(col) AGAINST('hello' NATURAL)           │
//! │  anything else         → col LIKE '%term%'                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! InnoDB full-text indexes ignore tokens shorter than the minimum token
//! size and treat boolean and natural-language mode differently. Short or
//! mixed tokens are therefore routed to LIKE, where the index would not
//! return them anyway.

use serde::Serialize;

use crate::table::{quote_ident, TableDescriptor};
use crate::types::SqlValue;

/// Minimum length of a CJK token sent to boolean-mode full-text search.
const MIN_CJK_FULL_TEXT_CHARS: usize = 2;

/// Minimum length of a Latin token sent to natural-language full-text search.
const MIN_ALPHA_FULL_TEXT_CHARS: usize = 4;

/// Characters with meaning in boolean-mode full-text queries.
const BOOLEAN_OPERATORS: &[char] = &['+', '-', '<', '>', '(', ')', '~', '*', '"', '@'];

// =============================================================================
// Lexical Features
// =============================================================================

/// Lexical features of a search term. Derived per request, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchFeatures {
    pub has_chinese: bool,
    pub has_english: bool,
    pub has_numbers: bool,
    pub has_spaces: bool,
    pub is_quoted: bool,
    pub has_wildcard: bool,
    /// Length in characters, not bytes.
    pub length: usize,
    pub word_count: usize,
}

impl SearchFeatures {
    pub fn analyze(term: &str) -> Self {
        let term = term.trim();
        let length = term.chars().count();
        SearchFeatures {
            has_chinese: term.chars().any(is_cjk),
            has_english: term.chars().any(|c| c.is_ascii_alphabetic()),
            has_numbers: term.chars().any(|c| c.is_ascii_digit()),
            has_spaces: term.chars().any(char::is_whitespace),
            is_quoted: length >= 2 && term.starts_with('"') && term.ends_with('"'),
            has_wildcard: term.contains('*') || term.contains('?'),
            length,
            word_count: term.split_whitespace().count(),
        }
    }
}

/// CJK unified ideographs (plus extension A and compatibility ideographs).
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}')
}

// =============================================================================
// Plan
// =============================================================================

/// Which search path was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    None,
    Exact,
    Wildcard,
    Prefix,
    BooleanFullText,
    NaturalFullText,
    MultiWordLike,
    Substring,
}

/// Output of the search planner.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPredicate {
    pub strategy: SearchStrategy,
    /// WHERE fragment, `None` when every row matches.
    pub clause: Option<String>,
    /// Parameters for `clause`, in placeholder order.
    pub params: Vec<SqlValue>,
    /// Relevance expression for ORDER BY, present for full-text plans.
    pub relevance: Option<String>,
    /// Parameters for `relevance`.
    pub relevance_params: Vec<SqlValue>,
}

impl SearchPredicate {
    fn none() -> Self {
        SearchPredicate {
            strategy: SearchStrategy::None,
            clause: None,
            params: Vec::new(),
            relevance: None,
            relevance_params: Vec::new(),
        }
    }

    fn like(strategy: SearchStrategy, column: &str, patterns: Vec<String>) -> Self {
        let col = quote_ident(column);
        let clause = patterns
            .iter()
            .map(|_| format!("{} LIKE ?", col))
            .collect::<Vec<_>>()
            .join(" AND ");
        let clause = if patterns.len() > 1 {
            format!("({})", clause)
        } else {
            clause
        };
        SearchPredicate {
            strategy,
            clause: Some(clause),
            params: patterns.into_iter().map(SqlValue::Text).collect(),
            relevance: None,
            relevance_params: Vec::new(),
        }
    }

    fn full_text(strategy: SearchStrategy, columns: &[&str], query: String) -> Self {
        let mode = match strategy {
            SearchStrategy::BooleanFullText => "IN BOOLEAN MODE",
            _ => "IN NATURAL LANGUAGE MODE",
        };
        let cols = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let expr = format!("MATCH({}) AGAINST(? {})", cols, mode);
        SearchPredicate {
            strategy,
            clause: Some(expr.clone()),
            params: vec![SqlValue::Text(query.clone())],
            relevance: Some(expr),
            relevance_params: vec![SqlValue::Text(query)],
        }
    }

    /// Whether MATCH ... AGAINST is part of the predicate.
    pub fn uses_full_text(&self) -> bool {
        matches!(
            self.strategy,
            SearchStrategy::BooleanFullText | SearchStrategy::NaturalFullText
        )
    }
}

/// Picks a search strategy for `term` against `table`.
pub fn plan_search(term: Option<&str>, table: &TableDescriptor) -> SearchPredicate {
    let term = match term.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return SearchPredicate::none(),
    };
    let features = SearchFeatures::analyze(term);
    let column = table.search_column;
    let full_text = table.supports_full_text();

    if features.is_quoted {
        let inner = term[1..term.len() - 1].trim();
        if inner.is_empty() {
            return SearchPredicate::none();
        }
        return SearchPredicate {
            strategy: SearchStrategy::Exact,
            clause: Some(format!("{} = ?", quote_ident(column))),
            params: vec![SqlValue::Text(inner.to_string())],
            relevance: None,
            relevance_params: Vec::new(),
        };
    }

    if features.has_wildcard {
        return SearchPredicate::like(
            SearchStrategy::Wildcard,
            column,
            vec![translate_wildcards(term)],
        );
    }

    if features.length == 1 {
        return SearchPredicate::like(
            SearchStrategy::Prefix,
            column,
            vec![format!("{}%", escape_like(term))],
        );
    }

    if features.has_spaces {
        let words: Vec<&str> = term.split_whitespace().collect();
        if full_text && features.word_count >= 2 {
            if features.has_chinese {
                let query = words
                    .iter()
                    .map(|w| strip_boolean_operators(w))
                    .filter(|w| !w.is_empty())
                    .map(|w| format!("+{}*", w))
                    .collect::<Vec<_>>()
                    .join(" ");
                if !query.is_empty() {
                    return SearchPredicate::full_text(
                        SearchStrategy::BooleanFullText,
                        table.full_text_columns,
                        query,
                    );
                }
            } else {
                return SearchPredicate::full_text(
                    SearchStrategy::NaturalFullText,
                    table.full_text_columns,
                    words.join(" "),
                );
            }
        }
        return SearchPredicate::like(
            SearchStrategy::MultiWordLike,
            column,
            words
                .iter()
                .map(|w| format!("%{}%", escape_like(w)))
                .collect(),
        );
    }

    if full_text && features.has_chinese && features.length >= MIN_CJK_FULL_TEXT_CHARS {
        let token = strip_boolean_operators(term);
        if !token.is_empty() {
            return SearchPredicate::full_text(
                SearchStrategy::BooleanFullText,
                table.full_text_columns,
                format!("+{}*", token),
            );
        }
    }

    if full_text
        && features.length >= MIN_ALPHA_FULL_TEXT_CHARS
        && term.chars().all(|c| c.is_alphabetic() && !is_cjk(c))
    {
        return SearchPredicate::full_text(
            SearchStrategy::NaturalFullText,
            table.full_text_columns,
            term.to_string(),
        );
    }

    SearchPredicate::like(
        SearchStrategy::Substring,
        column,
        vec![format!("%{}%", escape_like(term))],
    )
}

/// Escapes LIKE metacharacters so they match literally.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `*` → `%`, `?` → `_`, with literal `%`/`_` escaped first.
fn translate_wildcards(s: &str) -> String {
    escape_like(s)
        .chars()
        .map(|c| match c {
            '*' => '%',
            '?' => '_',
            other => other,
        })
        .collect()
}

fn strip_boolean_operators(word: &str) -> String {
    word.chars().filter(|c| !BOOLEAN_OPERATORS.contains(c)).collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn crawler() -> TableDescriptor {
        TableDescriptor::crawler()
    }

    fn text(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    #[test]
    fn test_features() {
        let f = SearchFeatures::analyze("  你好 world 42 ");
        assert!(f.has_chinese && f.has_english && f.has_numbers && f.has_spaces);
        assert_eq!(f.word_count, 3);
        assert_eq!(f.length, 11);
        assert!(!f.is_quoted);

        let f = SearchFeatures::analyze("\"abc\"");
        assert!(f.is_quoted);
        assert!(!SearchFeatures::analyze("\"").is_quoted);
    }

    #[test]
    fn test_blank_term_has_no_predicate() {
        for term in [None, Some(""), Some("   ")] {
            let p = plan_search(term, &crawler());
            assert_eq!(p.strategy, SearchStrategy::None);
            assert!(p.clause.is_none());
            assert!(p.params.is_empty());
        }
    }

    #[test]
    fn test_quoted_is_exact_match() {
        let p = plan_search(Some("\"exact phrase\""), &crawler());
        assert_eq!(p.strategy, SearchStrategy::Exact);
        assert_eq!(p.clause.as_deref(), Some("`title` = ?"));
        assert_eq!(p.params, vec![text("exact phrase")]);
        assert!(!p.uses_full_text());
    }

    #[test]
    fn test_wildcards_translate() {
        let p = plan_search(Some("te?t*"), &crawler());
        assert_eq!(p.strategy, SearchStrategy::Wildcard);
        assert_eq!(p.clause.as_deref(), Some("`title` LIKE ?"));
        assert_eq!(p.params, vec![text("te_t%")]);

        let p = plan_search(Some("100%_off*"), &crawler());
        assert_eq!(p.params, vec![text("100\\%\\_off%")]);
    }

    #[test]
    fn test_single_char_is_prefix() {
        let p = plan_search(Some("a"), &crawler());
        assert_eq!(p.strategy, SearchStrategy::Prefix);
        assert_eq!(p.params, vec![text("a%")]);

        let p = plan_search(Some("字"), &crawler());
        assert_eq!(p.strategy, SearchStrategy::Prefix);
    }

    #[test]
    fn test_chinese_words_use_boolean_mode() {
        let p = plan_search(Some("你好 世界"), &crawler());
        assert_eq!(p.strategy, SearchStrategy::BooleanFullText);
        assert_eq!(
            p.clause.as_deref(),
            Some("MATCH(`title`) AGAINST(? IN BOOLEAN MODE)")
        );
        assert_eq!(p.params, vec![text("+你好* +世界*")]);
        assert_eq!(p.relevance_params, p.params);
        assert!(p.uses_full_text());
    }

    #[test]
    fn test_latin_words_use_natural_mode() {
        let p = plan_search(Some("hello   world"), &crawler());
        assert_eq!(p.strategy, SearchStrategy::NaturalFullText);
        assert_eq!(
            p.clause.as_deref(),
            Some("MATCH(`title`) AGAINST(? IN NATURAL LANGUAGE MODE)")
        );
        assert_eq!(p.params, vec![text("hello world")]);
    }

    #[test]
    fn test_multi_word_without_full_text_uses_like() {
        let log = TableDescriptor::crawl_log();
        let p = plan_search(Some("disk full"), &log);
        assert_eq!(p.strategy, SearchStrategy::MultiWordLike);
        assert_eq!(
            p.clause.as_deref(),
            Some("(`message` LIKE ? AND `message` LIKE ?)")
        );
        assert_eq!(p.params, vec![text("%disk%"), text("%full%")]);
        assert!(!p.uses_full_text());
    }

    #[test]
    fn test_single_token_routing() {
        let p = plan_search(Some("电影"), &crawler());
        assert_eq!(p.strategy, SearchStrategy::BooleanFullText);
        assert_eq!(p.params, vec![text("+电影*")]);

        let p = plan_search(Some("ubuntu"), &crawler());
        assert_eq!(p.strategy, SearchStrategy::NaturalFullText);

        // too short for the full-text index
        let p = plan_search(Some("abc"), &crawler());
        assert_eq!(p.strategy, SearchStrategy::Substring);
        assert_eq!(p.params, vec![text("%abc%")]);

        // mixed alphanumerics stay on LIKE
        let p = plan_search(Some("x264"), &crawler());
        assert_eq!(p.strategy, SearchStrategy::Substring);

        let p = plan_search(Some("ubuntu"), &TableDescriptor::crawl_log());
        assert_eq!(p.strategy, SearchStrategy::Substring);
    }

    #[test]
    fn test_accented_words_use_natural_full_text() {
        let p = plan_search(Some("café"), &crawler());
        assert_eq!(p.strategy, SearchStrategy::NaturalFullText);
        assert_eq!(p.params, vec![text("café")]);

        let p = plan_search(Some("Überwachung"), &crawler());
        assert_eq!(p.strategy, SearchStrategy::NaturalFullText);

        // letters mixed with punctuation still fall through to LIKE
        let p = plan_search(Some("café-bar"), &crawler());
        assert_eq!(p.strategy, SearchStrategy::Substring);
    }

    #[test]
    fn test_boolean_operators_are_stripped() {
        let p = plan_search(Some("+你好 -世界"), &crawler());
        assert_eq!(p.params, vec![text("+你好* +世界*")]);
    }
}
