//! Variable extraction for designer-written formulas.
//!
//! A designer writes `POIDS / (TAILLE * TAILLE)`. The engine needs an
//! ordered operand list and a formula over positional placeholders:
//! `["POIDS", "TAILLE", "IMC"]` and `$1 / ($2 * $2)`. The target variable
//! is always the last operand so a formula can see its own prior state.

use std::collections::BTreeSet;

use crate::error::FormulaError;

const RESERVED: [&str; 4] = ["true", "false", "null", "undefined"];

/// Operand list and placeholder formula extracted from a raw formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFormula {
    /// Variable names in operand order, target last. Names keep their
    /// scope prefix (`$` outer, `@` global).
    pub variable_names: Vec<String>,
    /// Formula with each variable replaced by `$k`, k being its 1-based
    /// position in `variable_names`.
    pub formula: String,
}

impl ParsedFormula {
    pub fn arg_count(&self) -> usize {
        self.variable_names.len()
    }
}

enum Segment {
    Text(String),
    Var(String),
}

pub struct ComputedParser;

impl ComputedParser {
    /// Extract the variables of `raw` and rewrite it over placeholders.
    ///
    /// Variables are sorted by name, the target is removed from that list
    /// and appended last whether or not the formula mentions it. String
    /// literal contents, date literals, intrinsic names, reserved words
    /// and `_temporaries` are left untouched.
    pub fn parse(target: &str, raw: &str) -> Result<ParsedFormula, FormulaError> {
        let segments = split(raw)?;

        let mut names: BTreeSet<&str> = BTreeSet::new();
        for segment in &segments {
            if let Segment::Var(name) = segment {
                names.insert(name);
            }
        }
        names.remove(target);

        let mut variable_names: Vec<String> = names.into_iter().map(str::to_owned).collect();
        variable_names.push(target.to_owned());

        let mut formula = String::with_capacity(raw.len());
        for segment in &segments {
            match segment {
                Segment::Text(text) => formula.push_str(text),
                Segment::Var(name) => {
                    // every Var was collected above, so the lookup cannot miss
                    let index = variable_names
                        .iter()
                        .position(|v| v == name)
                        .unwrap_or(variable_names.len() - 1);
                    formula.push('$');
                    formula.push_str(&(index + 1).to_string());
                }
            }
        }

        Ok(ParsedFormula {
            variable_names,
            formula,
        })
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_temporary(name: &str) -> bool {
    name.starts_with('_') && name.len() > 1 && !name.starts_with("__")
}

fn split(raw: &str) -> Result<Vec<Segment>, FormulaError> {
    let chars: Vec<char> = raw.chars().collect();
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut pos = 0usize;

    let flush = |text: &mut String, segments: &mut Vec<Segment>| {
        if !text.is_empty() {
            segments.push(Segment::Text(std::mem::take(text)));
        }
    };

    while pos < chars.len() {
        let c = chars[pos];
        let start = pos;

        // String literals are copied verbatim, escapes included.
        if c == '"' || c == '\'' {
            text.push(c);
            pos += 1;
            loop {
                if pos >= chars.len() {
                    return Err(FormulaError::lex(raw, start, "unterminated string literal"));
                }
                let sc = chars[pos];
                text.push(sc);
                pos += 1;
                if sc == '\\' && pos < chars.len() {
                    text.push(chars[pos]);
                    pos += 1;
                    continue;
                }
                if sc == c {
                    break;
                }
            }
            continue;
        }

        if c == '#' {
            text.push(c);
            pos += 1;
            while pos < chars.len() && chars[pos] != '#' {
                text.push(chars[pos]);
                pos += 1;
            }
            if pos >= chars.len() {
                return Err(FormulaError::lex(raw, start, "malformed date literal"));
            }
            text.push('#');
            pos += 1;
            continue;
        }

        if c == '~' {
            text.push(c);
            pos += 1;
            while pos < chars.len() && is_ident_char(chars[pos]) {
                text.push(chars[pos]);
                pos += 1;
            }
            continue;
        }

        if c.is_ascii_digit() {
            while pos < chars.len() && (is_ident_char(chars[pos]) || chars[pos] == '.') {
                text.push(chars[pos]);
                pos += 1;
            }
            continue;
        }

        if c == '$' && pos + 1 < chars.len() && chars[pos + 1].is_ascii_digit() {
            return Err(FormulaError::lex(
                raw,
                start,
                "positional placeholders are reserved, name the variable instead",
            ));
        }

        let prefixed = (c == '$' || c == '@')
            && pos + 1 < chars.len()
            && chars[pos + 1].is_ascii_alphabetic();
        if prefixed || is_ident_start(c) {
            pos += 1;
            while pos < chars.len() && is_ident_char(chars[pos]) {
                pos += 1;
            }
            let word: String = chars[start..pos].iter().collect();
            if !prefixed && (is_temporary(&word) || RESERVED.contains(&word.as_str())) {
                text.push_str(&word);
            } else {
                flush(&mut text, &mut segments);
                segments.push(Segment::Var(word));
            }
            continue;
        }

        text.push(c);
        pos += 1;
    }
    flush(&mut text, &mut segments);
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_mass_index() {
        let parsed = ComputedParser::parse("IMC", "POIDS / (TAILLE * TAILLE)").unwrap();
        assert_eq!(parsed.variable_names, vec!["POIDS", "TAILLE", "IMC"]);
        assert_eq!(parsed.formula, "$1 / ($2 * $2)");
        assert_eq!(parsed.arg_count(), 3);
    }

    #[test]
    fn target_reference_moves_last() {
        let parsed = ComputedParser::parse("TOTAL", "TOTAL + A").unwrap();
        assert_eq!(parsed.variable_names, vec!["A", "TOTAL"]);
        assert_eq!(parsed.formula, "$2 + $1");
    }

    #[test]
    fn scope_prefixes_are_kept() {
        let parsed = ComputedParser::parse("DELTA", "POIDS - $POIDS + @THISYEAR * 0").unwrap();
        assert_eq!(
            parsed.variable_names,
            vec!["$POIDS", "@THISYEAR", "POIDS", "DELTA"]
        );
        assert_eq!(parsed.formula, "$3 - $1 + $2 * 0");
    }

    #[test]
    fn literals_intrinsics_and_temporaries_are_untouched() {
        let parsed = ComputedParser::parse(
            "R",
            "(_n = ~IN(['A', \"B C\"], CODE), _n ? #2020-01-01# : undefined)",
        )
        .unwrap();
        assert_eq!(parsed.variable_names, vec!["CODE", "R"]);
        assert_eq!(
            parsed.formula,
            "(_n = ~IN(['A', \"B C\"], $1), _n ? #2020-01-01# : undefined)"
        );
    }

    #[test]
    fn memo_shorthand_is_not_a_variable() {
        let parsed = ComputedParser::parse("FIRST", "$(A == 1 ? @TODAY : undefined)").unwrap();
        assert_eq!(parsed.variable_names, vec!["@TODAY", "A", "FIRST"]);
        assert_eq!(parsed.formula, "$($2 == 1 ? $1 : undefined)");
    }

    #[test]
    fn numbers_are_not_split() {
        let parsed = ComputedParser::parse("Y", "X * 1.5 + 10").unwrap();
        assert_eq!(parsed.formula, "$1 * 1.5 + 10");
    }

    #[test]
    fn raw_placeholders_are_rejected() {
        let err = ComputedParser::parse("Y", "X + $1").unwrap_err();
        assert_eq!(err.offset, 4);
        assert!(err.message.contains("placeholders are reserved"));
        // the memo shorthand and string contents are not placeholders
        assert!(ComputedParser::parse("Y", "$(X) + '$1'").is_ok());
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(ComputedParser::parse("Y", "X + 'abc").is_err());
    }
}
