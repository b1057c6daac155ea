//! Error locations reported by a plain run of the interpreter.

use std::collections::BTreeMap;

const ERROR_AT: &str = "Error at [";
const LINE_PREFIX: &str = "line ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    /// One-based source line.
    pub line: usize,
    pub column: usize,
    pub message: String,
}

fn parse_coordinates(text: &str) -> Option<(usize, usize)> {
    let (line, column) = text.split_once(':')?;
    Some((line.trim().parse().ok()?, column.trim().parse().ok()?))
}

/// Recognizes `Error at [L:C]: message` and `line L:C message`.
pub fn parse_error(line: &str) -> Option<RunError> {
    if let Some(start) = line.find(ERROR_AT) {
        let rest = &line[start + ERROR_AT.len()..];
        let (coordinates, message) = rest.split_once(']')?;
        let (line, column) = parse_coordinates(coordinates)?;
        return Some(RunError {
            line,
            column,
            message: message.trim_start_matches(':').trim().to_string(),
        });
    }

    let start = line.find(LINE_PREFIX)?;
    let rest = &line[start + LINE_PREFIX.len()..];
    let (coordinates, message) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let (line, column) = parse_coordinates(coordinates)?;
    Some(RunError {
        line,
        column,
        message: message.trim().to_string(),
    })
}

/// Every recognized error, grouped by line in ascending order.
pub fn collect_errors<'a>(output: impl IntoIterator<Item = &'a str>) -> BTreeMap<usize, Vec<RunError>> {
    output
        .into_iter()
        .filter_map(parse_error)
        .fold(BTreeMap::new(), |mut errors, error| {
            errors.entry(error.line).or_insert_with(Vec::new).push(error);
            errors
        })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::error_at(
        "Error at [3:14]: undefined variable x",
        Some(RunError { line: 3, column: 14, message: "undefined variable x".to_string() })
    )]
    #[case::parser(
        "line 7:2 mismatched input '}'",
        Some(RunError { line: 7, column: 2, message: "mismatched input '}'".to_string() })
    )]
    #[case::prefixed(
        "Exception: Error at [1:0]: boom",
        Some(RunError { line: 1, column: 0, message: "boom".to_string() })
    )]
    #[case::plain("x |-> 3", None)]
    #[case::bad_numbers("line a:b oops", None)]
    fn test_parse_error(#[case] line: &str, #[case] expected: Option<RunError>) {
        assert_eq!(parse_error(line), expected);
    }

    #[test]
    fn test_collect_groups_by_line() {
        let errors = collect_errors([
            "Error at [4:1]: first",
            "unrelated",
            "line 2:0 second",
            "Error at [4:9]: third",
        ]);

        assert_eq!(errors.keys().copied().collect::<Vec<_>>(), vec![2, 4]);
        assert_eq!(errors[&4].len(), 2);
        assert_eq!(errors[&4][1].message, "third");
    }
}
