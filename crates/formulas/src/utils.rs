use crate::parser::parse_formula;
use crate::FormulaError;

/// Cell input starting with `=` is a formula.
pub fn is_a_formula(text: &str) -> bool {
    text.starts_with('=')
}

/// Whether `text` is a formula that parses.
pub fn is_valid_formula(text: &str) -> bool {
    let trimmed = text.trim();
    is_a_formula(trimmed) && trimmed.len() > 1 && parse_formula(trimmed).is_ok()
}

/// Parse formula string, returning Ok(()) on success.
pub fn validate_formula(text: &str) -> Result<(), FormulaError> {
    parse_formula(text).map(|_| ())
}

/// Close an unterminated string literal and any open parentheses, the way
/// interactive entry completes `=SUM(A1:A3`.
pub fn balance_formula(input: &str) -> String {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_string && chars.peek() == Some(&'"') => {
                chars.next();
            }
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    let mut out = input.trim_end().to_string();
    if in_string {
        out.push('"');
    }
    out.extend(std::iter::repeat(')').take(depth));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_formula() {
        assert_eq!(balance_formula("=SUM(A1:A3"), "=SUM(A1:A3)");
        assert_eq!(balance_formula("=CONCAT(\"a(\", \"b"), "=CONCAT(\"a(\", \"b\")");
        assert_eq!(balance_formula("=\"say \"\"hi\"\"\""), "=\"say \"\"hi\"\"\"");
        assert_eq!(balance_formula("=1+2"), "=1+2");
    }

    #[test]
    fn test_is_a_formula() {
        assert!(is_a_formula("=A1"));
        assert!(!is_a_formula("A1"));
        assert!(!is_a_formula("'=A1"));
    }

    #[test]
    fn test_is_valid_formula() {
        assert!(is_valid_formula("=A1+1"));
        assert!(!is_valid_formula("A1+1"));
        assert!(!is_valid_formula("="));
        assert!(!is_valid_formula("=SUM("));
        assert!(validate_formula("=1+").is_err());
    }
}
