//! Reference extraction
//!
//! A bounded lexical scan, not a parser: it finds table identifiers after
//! FROM/JOIN and `table.column` references. Upstream generation is limited to
//! single-statement SELECT queries, which this handles; nested subqueries are
//! scanned but their derived-table aliases are not resolved.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word { text: String, quoted: bool },
    Dot,
    Comma,
    LParen,
    RParen,
    Star,
    Other,
}

impl Token {
    fn word(&self) -> Option<&str> {
        match self {
            Token::Word { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Unquoted word matching a keyword (case-insensitive)
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word { text, quoted: false } if text.eq_ignore_ascii_case(keyword))
    }
}

/// Words that end a table reference instead of naming its alias
const NON_ALIAS_KEYWORDS: &[&str] = &[
    "WHERE", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "OUTER", "NATURAL", "ON",
    "USING", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "UNION", "EXCEPT", "INTERSECT",
    "WINDOW", "FETCH", "FOR", "SELECT", "FROM", "RETURNING", "LATERAL", "TABLESAMPLE",
];

/// Functions whose argument syntax contains a FROM keyword
const FROM_TAKING_FUNCTIONS: &[&str] = &["EXTRACT", "SUBSTRING", "TRIM", "POSITION", "OVERLAY"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Prefix as written (table name or alias)
    pub qualifier: String,
    /// Table the prefix resolves to
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    /// `qualifier.column`, exactly as the query wrote it
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.qualifier, self.column)
    }
}

/// A place where a catalog table is named: FROM/JOIN position, or a column
/// qualifier that is the table name itself rather than an alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMention {
    pub name: String,
    /// Byte range of the identifier in the scanned text
    pub span: Range<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct References {
    /// Catalog tables after FROM/JOIN, first-seen order, CTE names excluded
    pub tables: Vec<String>,
    /// Qualified column references against catalog tables
    pub columns: Vec<ColumnRef>,
    /// alias (lower-case) -> table
    pub aliases: BTreeMap<String, String>,
    /// Names defined by WITH clauses (lower-case)
    pub cte_names: BTreeSet<String>,
    /// Every table mention, in text order
    pub mentions: Vec<TableMention>,
}

pub fn extract_references(sql: &str) -> References {
    let (tokens, spans) = tokenize(sql);
    let mut refs = References {
        cte_names: find_cte_names(&tokens),
        ..Default::default()
    };
    let mut derived_aliases: BTreeSet<String> = BTreeSet::new();
    let mut consumed = vec![false; tokens.len()];
    let mut mention_tokens: Vec<usize> = Vec::new();
    let mut paren_owner: Vec<Option<String>> = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::LParen => {
                let owner = i
                    .checked_sub(1)
                    .and_then(|p| tokens[p].word())
                    .map(|w| w.to_uppercase());
                paren_owner.push(owner);
                i += 1;
            }
            Token::RParen => {
                paren_owner.pop();
                i += 1;
            }
            t if t.is_keyword("FROM") => {
                let inside_function = matches!(
                    paren_owner.last(),
                    Some(Some(owner)) if FROM_TAKING_FUNCTIONS.contains(&owner.as_str())
                );
                let is_distinct_from = i >= 1 && tokens[i - 1].is_keyword("DISTINCT");
                if inside_function || is_distinct_from {
                    i += 1;
                    continue;
                }
                i = scan_table_list(
                    &tokens,
                    i + 1,
                    true,
                    &mut refs,
                    &mut derived_aliases,
                    &mut consumed,
                    &mut mention_tokens,
                );
            }
            t if t.is_keyword("JOIN") => {
                i = scan_table_list(
                    &tokens,
                    i + 1,
                    false,
                    &mut refs,
                    &mut derived_aliases,
                    &mut consumed,
                    &mut mention_tokens,
                );
            }
            _ => i += 1,
        }
    }

    refs.tables.retain(|t| !refs.cte_names.contains(&t.to_lowercase()));
    refs.columns = find_qualified_columns(&tokens, &consumed, &refs, &derived_aliases, &mut mention_tokens);

    mention_tokens.sort_unstable();
    mention_tokens.dedup();
    refs.mentions = mention_tokens
        .into_iter()
        .filter_map(|idx| {
            let name = tokens[idx].word()?;
            if refs.cte_names.contains(&name.to_lowercase()) {
                return None;
            }
            Some(TableMention {
                name: name.to_string(),
                span: spans[idx].clone(),
            })
        })
        .collect();
    refs
}

/// Table references after FROM (comma lists allowed) or JOIN. Returns the index
/// where the main scan resumes; subqueries are left for the main scan.
fn scan_table_list(
    tokens: &[Token],
    mut j: usize,
    allow_list: bool,
    refs: &mut References,
    derived_aliases: &mut BTreeSet<String>,
    consumed: &mut [bool],
    mention_tokens: &mut Vec<usize>,
) -> usize {
    loop {
        match tokens.get(j) {
            Some(Token::LParen) => {
                if let Some(close) = matching_paren(tokens, j) {
                    if let Some((alias, _)) = read_alias(tokens, close + 1) {
                        derived_aliases.insert(alias.to_lowercase());
                    }
                }
                return j;
            }
            Some(Token::Word { text, quoted }) => {
                if !quoted && NON_ALIAS_KEYWORDS.iter().any(|k| text.eq_ignore_ascii_case(k)) {
                    return j;
                }
                let mut name = text.clone();
                let mut name_idx = j;
                consumed[j] = true;
                let mut k = j + 1;
                while matches!(tokens.get(k), Some(Token::Dot)) {
                    match tokens.get(k + 1) {
                        Some(Token::Word { text, .. }) => {
                            name = text.clone();
                            name_idx = k + 1;
                            consumed[k + 1] = true;
                            k += 2;
                        }
                        _ => break,
                    }
                }
                // table-valued function call, not a table
                if matches!(tokens.get(k), Some(Token::LParen)) {
                    return k;
                }
                mention_tokens.push(name_idx);
                if !refs.tables.iter().any(|t| t.eq_ignore_ascii_case(&name)) {
                    refs.tables.push(name.clone());
                }
                j = k;
                if let Some((alias, next)) = read_alias(tokens, j) {
                    consumed[next - 1] = true;
                    refs.aliases.insert(alias.to_lowercase(), name);
                    j = next;
                }
            }
            _ => return j,
        }

        if allow_list && matches!(tokens.get(j), Some(Token::Comma)) {
            j += 1;
            continue;
        }
        return j;
    }
}

/// `[AS] alias` starting at `j`; returns the alias and the index after it
fn read_alias(tokens: &[Token], j: usize) -> Option<(String, usize)> {
    let (j, explicit) = if tokens.get(j).map_or(false, |t| t.is_keyword("AS")) {
        (j + 1, true)
    } else {
        (j, false)
    };
    match tokens.get(j) {
        Some(Token::Word { text, quoted }) => {
            let reserved = !quoted && NON_ALIAS_KEYWORDS.iter().any(|k| text.eq_ignore_ascii_case(k));
            if reserved && !explicit {
                None
            } else {
                Some((text.clone(), j + 1))
            }
        }
        _ => None,
    }
}

fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// `WITH name AS (` and `, name AS (` (optionally with a column list)
fn find_cte_names(tokens: &[Token]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for i in 1..tokens.len() {
        let Some(name) = tokens[i].word() else { continue };
        let prev = &tokens[i - 1];
        if !(prev.is_keyword("WITH") || prev.is_keyword("RECURSIVE") || *prev == Token::Comma) {
            continue;
        }
        let mut k = i + 1;
        if matches!(tokens.get(k), Some(Token::LParen)) {
            match matching_paren(tokens, k) {
                Some(close) => k = close + 1,
                None => continue,
            }
        }
        if tokens.get(k).map_or(false, |t| t.is_keyword("AS"))
            && matches!(tokens.get(k + 1), Some(Token::LParen))
        {
            names.insert(name.to_lowercase());
        }
    }
    names
}

fn find_qualified_columns(
    tokens: &[Token],
    consumed: &[bool],
    refs: &References,
    derived_aliases: &BTreeSet<String>,
    mention_tokens: &mut Vec<usize>,
) -> Vec<ColumnRef> {
    let mut columns: Vec<ColumnRef> = Vec::new();
    let mut i = 0;
    while i + 2 < tokens.len() {
        let (Some(first), Token::Dot) = (tokens[i].word(), &tokens[i + 1]) else {
            i += 1;
            continue;
        };
        if consumed[i] {
            i += 1;
            continue;
        }
        let Some(second) = tokens[i + 2].word() else {
            // t.* or a dangling dot
            let key = first.to_lowercase();
            if tokens[i + 2] == Token::Star && !refs.aliases.contains_key(&key) && !derived_aliases.contains(&key) {
                mention_tokens.push(i);
            }
            i += 3;
            continue;
        };

        // schema.table.column
        let (qualifier, qualifier_idx, column, width) = match (tokens.get(i + 3), tokens.get(i + 4)) {
            (Some(Token::Dot), Some(Token::Word { text, .. })) => (second, i + 2, text.as_str(), 5),
            _ => (first, i, second, 3),
        };

        // schema-qualified function call
        if matches!(tokens.get(i + width), Some(Token::LParen)) {
            i += width;
            continue;
        }

        let key = qualifier.to_lowercase();
        let alias_target = refs.aliases.get(&key);
        let table = alias_target.cloned().unwrap_or_else(|| qualifier.to_string());
        let table_key = table.to_lowercase();
        let not_in_catalog = derived_aliases.contains(&key) || refs.cte_names.contains(&table_key);

        if !not_in_catalog {
            if alias_target.is_none() {
                mention_tokens.push(qualifier_idx);
            }
            let col = ColumnRef {
                qualifier: qualifier.to_string(),
                table,
                column: column.to_string(),
            };
            if !columns.contains(&col) {
                columns.push(col);
            }
        }
        i += width;
    }
    columns
}

/// Tokens with the byte range each one covers in the source text. Quoted
/// identifiers cover the text between the quotes.
fn tokenize(sql: &str) -> (Vec<Token>, Vec<Range<usize>>) {
    let chars: Vec<char> = sql.chars().collect();
    let offsets: Vec<usize> = sql
        .char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(sql.len()))
        .collect();
    let byte = |i: usize| offsets[i.min(chars.len())];

    let mut tokens = Vec::new();
    let mut spans = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        let token = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i += 2;
                continue;
            }
            '\'' => {
                i += 1;
                while i < chars.len() {
                    if chars[i] == '\'' {
                        if chars.get(i + 1) == Some(&'\'') {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
                Token::Other
            }
            '"' | '`' => {
                let close = c;
                let inner = i + 1;
                i = inner;
                while i < chars.len() && chars[i] != close {
                    i += 1;
                }
                let end = i.min(chars.len());
                i += 1;
                tokens.push(Token::Word {
                    text: chars[inner..end].iter().collect(),
                    quoted: true,
                });
                spans.push(byte(inner)..byte(end));
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                    i += 1;
                }
                Token::Word {
                    text: chars[start..i].iter().collect(),
                    quoted: false,
                }
            }
            c if c.is_ascii_digit() => {
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                    i += 1;
                }
                Token::Other
            }
            _ => {
                i += 1;
                match c {
                    '.' => Token::Dot,
                    ',' => Token::Comma,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '*' => Token::Star,
                    _ => Token::Other,
                }
            }
        };
        tokens.push(token);
        spans.push(byte(start)..byte(i));
    }
    (tokens, spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(cols: &[ColumnRef]) -> Vec<String> {
        cols.iter().map(|c| format!("{}->{}.{}", c.qualifier, c.table, c.column)).collect()
    }

    #[test]
    fn test_tables_and_qualified_columns() {
        let refs = extract_references(
            "SELECT sales.amount, customers.region FROM sales \
             JOIN customers ON sales.customer_id = customers.customer_id",
        );
        assert_eq!(refs.tables, vec!["sales", "customers"]);
        assert_eq!(
            names(&refs.columns),
            vec![
                "sales->sales.amount",
                "customers->customers.region",
                "sales->sales.customer_id",
                "customers->customers.customer_id",
            ]
        );
    }

    #[test]
    fn test_aliases_resolve_to_tables() {
        let refs = extract_references(
            "SELECT s.amount, c.region FROM sales s LEFT JOIN customers AS c ON s.customer_id = c.customer_id",
        );
        assert_eq!(refs.tables, vec!["sales", "customers"]);
        assert_eq!(refs.aliases.get("s").map(String::as_str), Some("sales"));
        assert_eq!(refs.aliases.get("c").map(String::as_str), Some("customers"));
        assert_eq!(refs.columns[0].table, "sales");
        assert_eq!(refs.columns[0].qualified_name(), "s.amount");
    }

    #[test]
    fn test_comma_separated_from_list() {
        let refs = extract_references("SELECT * FROM sales s, stores WHERE s.store_id = stores.store_id");
        assert_eq!(refs.tables, vec!["sales", "stores"]);
    }

    #[test]
    fn test_extract_from_is_not_a_table() {
        let refs = extract_references(
            "SELECT EXTRACT(YEAR FROM sale_date) AS yr, SUM(amount) FROM sales GROUP BY yr",
        );
        assert_eq!(refs.tables, vec!["sales"]);
        assert!(refs.columns.is_empty());
    }

    #[test]
    fn test_cte_names_are_not_catalog_tables() {
        let refs = extract_references(
            "WITH start_period AS (SELECT SUM(amount) AS v FROM sales), \
             end_period AS (SELECT SUM(amount) AS w FROM sales) \
             SELECT v, w FROM start_period CROSS JOIN end_period",
        );
        assert_eq!(refs.tables, vec!["sales"]);
        assert!(refs.cte_names.contains("start_period"));
        assert!(refs.cte_names.contains("end_period"));
    }

    #[test]
    fn test_strings_and_numbers_are_ignored() {
        let refs = extract_references(
            "SELECT sales.amount * 1.5 FROM sales WHERE sales.note = 'from fake.table'",
        );
        assert_eq!(refs.tables, vec!["sales"]);
        assert_eq!(names(&refs.columns), vec!["sales->sales.amount", "sales->sales.note"]);
    }

    #[test]
    fn test_schema_qualified_table() {
        let refs = extract_references("SELECT public.sales.amount FROM public.sales");
        assert_eq!(refs.tables, vec!["sales"]);
        assert_eq!(names(&refs.columns), vec!["sales->sales.amount"]);
    }

    #[test]
    fn test_derived_table_alias_is_skipped() {
        let refs = extract_references(
            "SELECT t.total FROM (SELECT SUM(amount) AS total FROM sales) t",
        );
        assert_eq!(refs.tables, vec!["sales"]);
        assert!(refs.columns.is_empty());
    }

    #[test]
    fn test_star_and_quoted_identifiers() {
        let refs = extract_references("SELECT s.* , \"sales\".\"amount\" FROM \"sales\" s");
        assert_eq!(refs.tables, vec!["sales"]);
        assert_eq!(names(&refs.columns), vec!["sales->sales.amount"]);
    }

    #[test]
    fn test_mentions_cover_only_table_positions() {
        let sql = "SELECT o.customer, customer.segment, customer.* FROM customer \
                   JOIN orders o ON o.customer = customer.customer_id WHERE customer.segment = 'customer'";
        let refs = extract_references(sql);
        let spans: Vec<&str> = refs.mentions.iter().map(|m| &sql[m.span.clone()]).collect();
        assert_eq!(spans, vec!["customer", "customer", "customer", "orders", "customer", "customer"]);
        // the column o.customer and the literal are not mentions
        assert!(refs.mentions.iter().all(|m| !sql[..m.span.start].ends_with("o.")));
        assert!(refs.mentions.iter().all(|m| !sql[..m.span.start].ends_with('\'')));
    }

    #[test]
    fn test_quoted_mention_spans_exclude_quotes() {
        let sql = "SELECT \"sales\".amount FROM \"sales\"";
        let refs = extract_references(sql);
        assert_eq!(refs.mentions.len(), 2);
        assert!(refs.mentions.iter().all(|m| &sql[m.span.clone()] == "sales"));
    }

    #[test]
    fn test_unknown_qualifier_is_kept_for_validation() {
        let refs = extract_references("SELECT t.c FROM sales");
        assert_eq!(names(&refs.columns), vec!["t->t.c"]);
    }
}
