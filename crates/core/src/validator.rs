//! Static query validation
//!
//! Checks a query's syntax before it is sent. Nothing here touches the
//! network; the report lists every issue found, with an optional position
//! (character offset) and a suggested fix.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

/// Functions the validator recognizes without comment
const KNOWN_FUNCTIONS: &[&str] = &[
    "count", "avg", "sum", "min", "max", "groupBy", "bucket", "collect", "percentile",
    "stdDev", "variance", "top", "stats", "in", "regex", "cidr", "ipLocation", "test",
    "exists", "empty", "select", "rename", "drop", "eval", "format", "lower", "upper",
    "replace", "split", "concat", "sort", "head", "tail", "sample", "dedup", "ioc:lookup",
    "hashMatch", "hashRewrite", "formatTime", "parseTimestamp", "now", "timechart",
    "kvParse", "parseJson", "parseXml", "parseCsv", "join", "selfJoin", "correlate",
    "table", "sankey", "worldMap", "piechart", "barchart", "array:append",
    "array:contains", "array:filter", "array:length", "array:eval", "array:exists",
    "array:intersection", "array:union",
];

const MAX_SUGGESTIONS: usize = 10;

lazy_static! {
    // Statement chaining, script tags, template and shell interpolation
    static ref DANGEROUS_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i);\s*(?:drop|delete|truncate|insert|update)").unwrap(),
        Regex::new(r"(?i)<script").unwrap(),
        Regex::new(r"\{\{.*\}\}").unwrap(),
        Regex::new(r"\$\{.*\}").unwrap(),
    ];

    static ref FUNCTION_CALL: Regex = Regex::new(r"(\w+(?::\w+)?)\s*\(").unwrap();

    static ref EMPTY_PIPE_STAGE: Regex = Regex::new(r"\|\s*\|").unwrap();

    static ref UNQUOTED_SPACED_VALUE: Regex =
        Regex::new(r#"=\s*([^"'=\s|]+\s+[^"'=\s|]+)\s*(?:\||$)"#).unwrap();

    static ref LINE_COMMENT: Regex = Regex::new(r"//[^\n]*").unwrap();

    static ref BLOCK_COMMENT: Regex = Regex::new(r"(?s)/\*.*?\*/").unwrap();

    static ref KNOWN_FUNCTIONS_LOWER: HashSet<String> =
        KNOWN_FUNCTIONS.iter().map(|f| f.to_lowercase()).collect();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Prevents execution
    Error,
    /// May cause problems
    Warning,
    /// Suggestion only
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub message: String,
    pub position: Option<usize>,
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    fn new(severity: IssueSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            position: None,
            suggestion: None,
        }
    }

    fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    /// Normalized query, present only when valid
    pub sanitized_query: Option<String>,
}

impl ValidationReport {
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
    }
}

/// Query syntax checker
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryValidator;

impl QueryValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate `query`; with `strict`, warnings also make it invalid
    pub fn validate(&self, query: &str, strict: bool) -> ValidationReport {
        let query = query.trim();
        if query.is_empty() {
            return ValidationReport {
                valid: false,
                issues: vec![ValidationIssue::new(
                    IssueSeverity::Error,
                    "Query cannot be empty",
                )],
                sanitized_query: None,
            };
        }

        let mut issues = Vec::new();
        issues.extend(check_dangerous_patterns(query));
        issues.extend(check_balanced(query, '(', ')', "parenthesis", "parentheses"));
        issues.extend(check_balanced(query, '[', ']', "bracket", "brackets"));
        issues.extend(check_balanced_quotes(query));
        issues.extend(check_function_names(query));
        issues.extend(check_pipe_syntax(query));
        issues.extend(check_common_mistakes(query));

        let has = |severity| issues.iter().any(|i: &ValidationIssue| i.severity == severity);
        let valid = !has(IssueSeverity::Error) && !(strict && has(IssueSeverity::Warning));

        ValidationReport {
            valid,
            sanitized_query: valid.then(|| sanitize(query)),
            issues,
        }
    }

    /// Completion candidates for a partially typed query
    ///
    /// After a trailing pipe every known function is offered; inside the last
    /// pipe stage, functions matching the typed prefix are.
    pub fn suggest_completion(&self, partial: &str) -> Vec<String> {
        let partial = partial.trim().to_lowercase();
        let mut functions: Vec<&str> = KNOWN_FUNCTIONS.to_vec();
        functions.sort_unstable();

        if partial.ends_with('|') {
            return functions
                .into_iter()
                .take(MAX_SUGGESTIONS)
                .map(|f| format!("{}()", f))
                .collect();
        }

        match partial.rsplit_once('|') {
            Some((_, last)) => {
                let prefix = last.trim();
                functions
                    .into_iter()
                    .filter(|f| f.to_lowercase().starts_with(prefix))
                    .take(MAX_SUGGESTIONS)
                    .map(str::to_string)
                    .collect()
            }
            None => Vec::new(),
        }
    }
}

fn check_dangerous_patterns(query: &str) -> Option<ValidationIssue> {
    DANGEROUS_PATTERNS.iter().any(|re| re.is_match(query)).then(|| {
        ValidationIssue::new(
            IssueSeverity::Error,
            "Query contains potentially dangerous pattern",
        )
        .suggest("Remove suspicious content")
    })
}

/// Depth check for one bracket pair, ignoring quoted text
fn check_balanced(
    query: &str,
    open: char,
    close: char,
    singular: &str,
    plural: &str,
) -> Option<ValidationIssue> {
    let mut depth: i64 = 0;
    let mut quote: Option<char> = None;
    let mut previous = None;

    for (position, c) in query.chars().enumerate() {
        let escaped = previous == Some('\\');
        previous = Some(c);

        if (c == '"' || c == '\'') && !escaped {
            match quote {
                None => quote = Some(c),
                Some(q) if q == c => quote = None,
                Some(_) => {}
            }
            continue;
        }
        if quote.is_some() {
            continue;
        }

        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth < 0 {
                return Some(
                    ValidationIssue::new(
                        IssueSeverity::Error,
                        format!("Unmatched closing {}", singular),
                    )
                    .at(position),
                );
            }
        }
    }

    (depth != 0).then(|| {
        ValidationIssue::new(
            IssueSeverity::Error,
            format!("Unbalanced {}: {} unclosed", plural, depth),
        )
        .suggest(format!("Check opening and closing {} match", plural))
    })
}

fn check_balanced_quotes(query: &str) -> Option<ValidationIssue> {
    let mut doubles = 0;
    let mut singles = 0;
    let mut previous = None;

    for c in query.chars() {
        if previous != Some('\\') {
            match c {
                '"' => doubles += 1,
                '\'' => singles += 1,
                _ => {}
            }
        }
        previous = Some(c);
    }

    if doubles % 2 != 0 {
        return Some(
            ValidationIssue::new(IssueSeverity::Error, "Unbalanced double quotes")
                .suggest("Check all double quotes are closed"),
        );
    }
    if singles % 2 != 0 {
        return Some(
            ValidationIssue::new(IssueSeverity::Error, "Unbalanced single quotes")
                .suggest("Check all single quotes are closed"),
        );
    }
    None
}

fn check_function_names(query: &str) -> Vec<ValidationIssue> {
    FUNCTION_CALL
        .captures_iter(query)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str();
            if KNOWN_FUNCTIONS_LOWER.contains(&name.to_lowercase()) {
                return None;
            }
            // `field=(a or b)` style filters are not calls
            let before = query[..whole.start()].trim_end();
            if before.ends_with('=') || before.ends_with('!') {
                return None;
            }
            Some(
                ValidationIssue::new(IssueSeverity::Info, format!("Unknown function: {}", name))
                    .at(query[..whole.start()].chars().count())
                    .suggest("Check function name spelling or refer to documentation"),
            )
        })
        .collect()
}

fn check_pipe_syntax(query: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if EMPTY_PIPE_STAGE.is_match(query) {
        issues.push(
            ValidationIssue::new(
                IssueSeverity::Error,
                "Empty pipe segment (consecutive pipes)",
            )
            .suggest("Remove duplicate pipe or add command between pipes"),
        );
    }
    if query.ends_with('|') {
        issues.push(
            ValidationIssue::new(
                IssueSeverity::Error,
                "Query ends with pipe but no following command",
            )
            .suggest("Add command after pipe or remove trailing pipe"),
        );
    }
    if query.starts_with('|') {
        issues.push(
            ValidationIssue::new(IssueSeverity::Warning, "Query starts with pipe")
                .suggest("Queries usually start with a filter, not a pipe"),
        );
    }

    issues
}

fn check_common_mistakes(query: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if query.contains(" == ") {
        issues.push(
            ValidationIssue::new(IssueSeverity::Warning, "Use single = for equality, not ==")
                .suggest("Replace == with ="),
        );
    }
    if query.contains(" and ") || query.contains(" or ") {
        issues.push(
            ValidationIssue::new(
                IssueSeverity::Warning,
                "Logical operators should be uppercase (AND, OR)",
            )
            .suggest("Use AND/OR instead of and/or"),
        );
    }
    if let Some(value) = UNQUOTED_SPACED_VALUE
        .captures(query)
        .and_then(|caps| caps.get(1))
    {
        issues.push(
            ValidationIssue::new(IssueSeverity::Warning, "Value with spaces should be quoted")
                .suggest(format!("Consider: =\"{}\"", value.as_str())),
        );
    }

    issues
}

/// Collapse whitespace and strip comments
fn sanitize(query: &str) -> String {
    let collapsed = query.split_whitespace().collect::<Vec<_>>().join(" ");
    let without_lines = LINE_COMMENT.replace_all(&collapsed, "");
    BLOCK_COMMENT
        .replace_all(&without_lines, "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(query: &str) -> ValidationReport {
        QueryValidator::new().validate(query, false)
    }

    fn messages(report: &ValidationReport) -> Vec<&str> {
        report.issues.iter().map(|i| i.message.as_str()).collect()
    }

    #[test]
    fn test_valid_query() {
        let report =
            validate("  #event_simpleName=ProcessRollup2   | groupBy([ComputerName]) | sort(_count)  ");
        assert!(report.valid, "{:?}", report.issues);
        assert!(report.issues.is_empty());
        assert_eq!(
            report.sanitized_query.as_deref(),
            Some("#event_simpleName=ProcessRollup2 | groupBy([ComputerName]) | sort(_count)")
        );
    }

    #[test]
    fn test_empty_query() {
        let report = validate("   ");
        assert!(!report.valid);
        assert_eq!(messages(&report), vec!["Query cannot be empty"]);
        assert!(report.sanitized_query.is_none());
    }

    #[test]
    fn test_dangerous_patterns() {
        for query in [
            "a=1; DROP table",
            "x=<script>alert(1)",
            "name={{user}}",
            "cmd=${HOME}",
        ] {
            let report = validate(query);
            assert!(!report.valid, "{query}");
            assert!(messages(&report).contains(&"Query contains potentially dangerous pattern"));
        }
    }

    #[test]
    fn test_unbalanced_parentheses_and_brackets() {
        let report = validate("count(x");
        assert!(messages(&report).contains(&"Unbalanced parentheses: 1 unclosed"));

        let report = validate("count(x))");
        let issue = report
            .issues
            .iter()
            .find(|i| i.message == "Unmatched closing parenthesis")
            .unwrap();
        assert_eq!(issue.position, Some(8));

        let report = validate("groupBy([a, b)");
        assert!(messages(&report).contains(&"Unbalanced brackets: 1 unclosed"));
    }

    #[test]
    fn test_brackets_inside_strings_are_ignored() {
        let report = validate(r#"CommandLine="cmd (x" | count()"#);
        assert!(report.valid, "{:?}", report.issues);
    }

    #[test]
    fn test_unbalanced_quotes() {
        let report = validate(r#"name="abc"#);
        assert!(!report.valid);
        assert!(messages(&report).contains(&"Unbalanced double quotes"));
    }

    #[test]
    fn test_pipe_syntax() {
        let report = validate("a=1 | | count()");
        assert!(messages(&report).contains(&"Empty pipe segment (consecutive pipes)"));

        let report = validate("a=1 |");
        assert!(messages(&report).contains(&"Query ends with pipe but no following command"));

        let report = validate("| count()");
        assert!(report.valid);
        assert!(!QueryValidator::new().validate("| count()", true).valid);
    }

    #[test]
    fn test_unknown_function_is_informational() {
        let report = validate("a=1 | frobnicate(x)");
        assert!(report.valid);
        let issue = &report.issues[0];
        assert_eq!(issue.severity, IssueSeverity::Info);
        assert_eq!(issue.message, "Unknown function: frobnicate");
        assert_eq!(issue.position, Some(6));

        assert!(validate("a=1 | GROUPBY(x)").issues.is_empty());
        assert!(validate("ioc:lookup(field=x)").issues.is_empty());
    }

    #[test]
    fn test_field_filter_is_not_a_function() {
        let report = validate("status=(x)");
        assert!(report.issues.is_empty(), "{:?}", report.issues);
    }

    #[test]
    fn test_common_mistakes_warn() {
        let report = validate("a == 1 and b=2");
        assert!(report.valid);
        let found = messages(&report);
        assert!(found.contains(&"Use single = for equality, not =="));
        assert!(found.contains(&"Logical operators should be uppercase (AND, OR)"));

        let strict = QueryValidator::new().validate("a == 1", true);
        assert!(!strict.valid);
        assert!(strict.sanitized_query.is_none());
    }

    #[test]
    fn test_unquoted_value_with_spaces() {
        let report = validate("ComputerName=my host | count()");
        let issue = report
            .issues
            .iter()
            .find(|i| i.message == "Value with spaces should be quoted")
            .unwrap();
        assert_eq!(issue.suggestion.as_deref(), Some("Consider: =\"my host\""));
    }

    #[test]
    fn test_sanitize_strips_comments() {
        assert_eq!(sanitize("a=1 /* note */ | count()"), "a=1  | count()");
        assert_eq!(sanitize("a=1 | count() // trailing"), "a=1 | count()");
    }

    #[test]
    fn test_suggest_completion() {
        let validator = QueryValidator::new();
        let after_pipe = validator.suggest_completion("a=1 |");
        assert_eq!(after_pipe.len(), 10);
        assert!(after_pipe.iter().all(|s| s.ends_with("()")));

        let prefixed = validator.suggest_completion("a=1 | group");
        assert_eq!(prefixed, vec!["groupBy"]);

        assert!(validator.suggest_completion("a=1").is_empty());
    }
}
