use crate::error::{AppError, Result};
use crate::literal::literal_len;
use regex_lite::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use tracing::debug;

/// Name of the per-station measurement array in the feed.
pub const MEASUREMENTS_VAR: &str = "datostazione";
/// Name of the per-station metadata array in the feed.
pub const METADATA_VAR: &str = "coords";

/// Raw literal substrings isolated from one feed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFragments {
    pub measurements: String,
    pub metadata: String,
}

/// Locate both named array assignments in a payload.
///
/// Script elements are searched first; a payload without a matching
/// `<script>` (the endpoint sometimes answers with bare script text) is
/// scanned as a whole.
pub fn extract_fragments(body: &str) -> Result<FeedFragments> {
    let scripts = script_sources(body);

    let find = |name: &str| {
        scripts
            .iter()
            .find_map(|script| find_assignment(script, name))
            .or_else(|| find_assignment(body, name))
            .ok_or_else(|| AppError::MissingFragment(name.to_string()))
    };

    let measurements = find(MEASUREMENTS_VAR)?;
    let metadata = find(METADATA_VAR)?;

    debug!(
        "Extracted fragments: {} bytes of {}, {} bytes of {}",
        measurements.len(),
        MEASUREMENTS_VAR,
        metadata.len(),
        METADATA_VAR
    );

    Ok(FeedFragments {
        measurements,
        metadata,
    })
}

/// Find `var <name> = [ ... ];` and return the bracketed literal.
///
/// The literal ends at the bracket that balances the opening one; brackets
/// and semicolons inside quoted values do not count. A literal whose
/// brackets never balance is cut at the first `];` so the parser can
/// reject it.
pub fn find_assignment(text: &str, name: &str) -> Option<String> {
    static MEASUREMENTS: OnceLock<Regex> = OnceLock::new();
    static METADATA: OnceLock<Regex> = OnceLock::new();

    let value_start = |re: &Regex| re.find(text).map(|m| m.end());

    let start = match name {
        MEASUREMENTS_VAR => value_start(MEASUREMENTS.get_or_init(|| assignment_regex(name))),
        METADATA_VAR => value_start(METADATA.get_or_init(|| assignment_regex(name))),
        other => value_start(&assignment_regex(other)),
    }?;

    let rest = &text[start..];
    match literal_len(rest) {
        Some(len) => Some(rest[..len].to_string()),
        None => unbalanced_literal(rest),
    }
}

fn assignment_regex(name: &str) -> Regex {
    let pattern = format!(r"\bvar\s+{}\s*=\s*", regex_lite::escape(name));
    Regex::new(&pattern).expect("assignment pattern is valid for an escaped name")
}

fn unbalanced_literal(rest: &str) -> Option<String> {
    static UNBALANCED: OnceLock<Regex> = OnceLock::new();

    let re = UNBALANCED
        .get_or_init(|| Regex::new(r"(?s)^(\[.*?\])\s*;").expect("literal pattern is valid"));
    re.captures(rest)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

fn script_sources(body: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse("script") else {
        return Vec::new();
    };

    Html::parse_document(body)
        .select(&selector)
        .map(|element| element.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_from_script_element() {
        let body = r#"<html><head><script type="text/javascript">
            var datostazione = [['0','y','01/01/2024','12:00','5.5']];
            var coords = [['101','Test','BG','100','200']];
        </script></head><body></body></html>"#;

        let fragments = extract_fragments(body).unwrap();
        assert_eq!(
            fragments.measurements,
            "[['0','y','01/01/2024','12:00','5.5']]"
        );
        assert_eq!(fragments.metadata, "[['101','Test','BG','100','200']]");
    }

    #[test]
    fn test_extracts_from_bare_script_text() {
        let body = "var coords = [['1','A']];\nvar datostazione = [['0']];";
        let fragments = extract_fragments(body).unwrap();
        assert_eq!(fragments.metadata, "[['1','A']]");
        assert_eq!(fragments.measurements, "[['0']]");
    }

    #[test]
    fn test_multiline_assignment_is_non_greedy() {
        let body = "var coords = [\n ['1','A'],\n ['2','B']\n];\nvar other = [[3]];";
        assert_eq!(
            find_assignment(body, METADATA_VAR).as_deref(),
            Some("[\n ['1','A'],\n ['2','B']\n]")
        );
    }

    #[test]
    fn test_nested_brackets_inside_strings() {
        let body = "var coords = [['1','x[0], y']];";
        assert_eq!(
            find_assignment(body, METADATA_VAR).as_deref(),
            Some("[['1','x[0], y']]")
        );
    }

    #[test]
    fn test_semicolon_and_brackets_inside_value() {
        let body = "var coords = [['1','Cima [A]; Nord','BG','10','20']];\nvar datostazione = [['0']];";
        let fragments = extract_fragments(body).unwrap();
        assert_eq!(fragments.metadata, "[['1','Cima [A]; Nord','BG','10','20']]");

        let rows = crate::literal::parse_rows(&fragments.metadata);
        assert_eq!(rows.len(), 1);
        assert_eq!(crate::literal::field_text(&rows[0], 1).as_deref(), Some("Cima [A]; Nord"));
    }

    #[test]
    fn test_unbalanced_literal_is_cut_at_first_terminator() {
        let body = "var datostazione = [['0','',;\nvar coords = [['1']];";
        assert_eq!(
            find_assignment(body, MEASUREMENTS_VAR).as_deref(),
            Some("[['0','',;\nvar coords = [['1']]")
        );
    }

    #[test]
    fn test_missing_fragment_reports_name() {
        let body = "<script>var coords = [['1']];</script>";
        match extract_fragments(body) {
            Err(AppError::MissingFragment(name)) => assert_eq!(name, MEASUREMENTS_VAR),
            other => panic!("Expected MissingFragment, got {:?}", other),
        }
    }

    #[test]
    fn test_does_not_match_suffix_names() {
        let body = "var mycoords = [['1']];";
        assert_eq!(find_assignment(body, METADATA_VAR), None);
    }
}
