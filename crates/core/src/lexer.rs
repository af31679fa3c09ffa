use crate::error::FormulaError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Decimal literal, kept as written
    Number(String),
    /// Quoted string literal (content without quotes, escapes resolved)
    Str(String),
    /// `#YYYY-MM-DD#` date literal (content between the hashes)
    Date(String),
    /// `$1`, `$2`, ... positional operand
    Placeholder(usize),
    /// `$` directly followed by `(`: the memoization shorthand
    Memo,
    /// `_name` local temporary
    Temp(String),
    /// `~NAME` intrinsic
    Intrinsic(String),
    /// `true`, `false`, `null`, `undefined`
    Word(String),
    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Question,
    Colon,
    // Arithmetic operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    // Comparison operators
    Eq,
    Neq,
    StrictEq,
    StrictNeq,
    Lt,
    Lte,
    Gt,
    Gte,
    // Logical operators
    AndAnd,
    OrOr,
    Bang,
    Assign,
    // End of input
    Eof,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

const WORDS: [&str; 4] = ["true", "false", "null", "undefined"];

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Tokenize a placeholder formula (variables already replaced by `$n`).
///
/// The accepted alphabet is closed: any character or identifier outside
/// the grammar is rejected here, so a formula can never name anything
/// but its operands, its temporaries and the intrinsics.
pub fn lex(src: &str) -> Result<Vec<Spanned>, FormulaError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut pos = 0usize;

    while pos < chars.len() {
        let c = chars[pos];

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;

        // String literal
        if c == '"' || c == '\'' {
            let quote = c;
            pos += 1;
            let mut s = String::new();
            loop {
                if pos >= chars.len() {
                    return Err(FormulaError::lex(src, start, "unterminated string literal"));
                }
                let sc = chars[pos];
                if sc == quote {
                    pos += 1;
                    break;
                }
                if sc == '\\' {
                    pos += 1;
                    if pos >= chars.len() {
                        return Err(FormulaError::lex(
                            src,
                            start,
                            "unterminated escape in string",
                        ));
                    }
                    match chars[pos] {
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        other => s.push(other),
                    }
                    pos += 1;
                    continue;
                }
                s.push(sc);
                pos += 1;
            }
            tokens.push(Spanned {
                token: Token::Str(s),
                offset: start,
            });
            continue;
        }

        // Date literal
        if c == '#' {
            pos += 1;
            let body_start = pos;
            while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '-') {
                pos += 1;
            }
            if pos >= chars.len() || chars[pos] != '#' {
                return Err(FormulaError::lex(src, start, "malformed date literal"));
            }
            let body: String = chars[body_start..pos].iter().collect();
            pos += 1;
            tokens.push(Spanned {
                token: Token::Date(body),
                offset: start,
            });
            continue;
        }

        // Number
        if c.is_ascii_digit() || (c == '.' && pos + 1 < chars.len() && chars[pos + 1].is_ascii_digit())
        {
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
            if pos < chars.len() && chars[pos] == '.' {
                pos += 1;
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
            }
            if pos < chars.len() && is_ident_start(chars[pos]) {
                return Err(FormulaError::lex(src, pos, "unexpected character after number"));
            }
            let s: String = chars[start..pos].iter().collect();
            tokens.push(Spanned {
                token: Token::Number(s),
                offset: start,
            });
            continue;
        }

        // Placeholder or memo shorthand
        if c == '$' {
            pos += 1;
            if pos < chars.len() && chars[pos] == '(' {
                tokens.push(Spanned {
                    token: Token::Memo,
                    offset: start,
                });
                continue;
            }
            let digits_start = pos;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
            if pos == digits_start {
                return Err(FormulaError::lex(
                    src,
                    start,
                    "'$' must be followed by an operand number or '('",
                ));
            }
            let s: String = chars[digits_start..pos].iter().collect();
            let n: usize = s
                .parse()
                .map_err(|_| FormulaError::lex(src, start, format!("invalid operand '${}'", s)))?;
            if n == 0 {
                return Err(FormulaError::lex(src, start, "operands are numbered from $1"));
            }
            tokens.push(Spanned {
                token: Token::Placeholder(n),
                offset: start,
            });
            continue;
        }

        // Intrinsic
        if c == '~' {
            pos += 1;
            let name_start = pos;
            while pos < chars.len() && is_ident_char(chars[pos]) {
                pos += 1;
            }
            if pos == name_start {
                return Err(FormulaError::lex(src, start, "'~' must name an intrinsic"));
            }
            let name: String = chars[name_start..pos].iter().collect();
            tokens.push(Spanned {
                token: Token::Intrinsic(name),
                offset: start,
            });
            continue;
        }

        // Temporaries and reserved words
        if is_ident_start(c) {
            while pos < chars.len() && is_ident_char(chars[pos]) {
                pos += 1;
            }
            let word: String = chars[start..pos].iter().collect();
            let token = if word.starts_with('_') && word.len() > 1 && !word.starts_with("__") {
                Token::Temp(word)
            } else if WORDS.contains(&word.as_str()) {
                Token::Word(word)
            } else {
                return Err(FormulaError::lex(
                    src,
                    start,
                    format!("unauthorized identifier '{}'", word),
                ));
            };
            tokens.push(Spanned {
                token,
                offset: start,
            });
            continue;
        }

        let next = chars.get(pos + 1).copied();
        let next2 = chars.get(pos + 2).copied();
        let (token, width) = match (c, next, next2) {
            ('=', Some('='), Some('=')) => (Token::StrictEq, 3),
            ('!', Some('='), Some('=')) => (Token::StrictNeq, 3),
            ('=', Some('='), _) => (Token::Eq, 2),
            ('!', Some('='), _) => (Token::Neq, 2),
            ('<', Some('='), _) => (Token::Lte, 2),
            ('>', Some('='), _) => (Token::Gte, 2),
            ('&', Some('&'), _) => (Token::AndAnd, 2),
            ('|', Some('|'), _) => (Token::OrOr, 2),
            ('=', _, _) => (Token::Assign, 1),
            ('!', _, _) => (Token::Bang, 1),
            ('<', _, _) => (Token::Lt, 1),
            ('>', _, _) => (Token::Gt, 1),
            ('+', _, _) => (Token::Plus, 1),
            ('-', _, _) => (Token::Minus, 1),
            ('*', _, _) => (Token::Star, 1),
            ('/', _, _) => (Token::Slash, 1),
            ('%', _, _) => (Token::Percent, 1),
            ('(', _, _) => (Token::LParen, 1),
            (')', _, _) => (Token::RParen, 1),
            ('[', _, _) => (Token::LBracket, 1),
            (']', _, _) => (Token::RBracket, 1),
            (',', _, _) => (Token::Comma, 1),
            ('?', _, _) => (Token::Question, 1),
            (':', _, _) => (Token::Colon, 1),
            _ => {
                return Err(FormulaError::lex(
                    src,
                    start,
                    format!("unexpected character '{}'", c),
                ))
            }
        };
        pos += width;
        tokens.push(Spanned {
            token,
            offset: start,
        });
    }

    tokens.push(Spanned {
        token: Token::Eof,
        offset: chars.len(),
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        lex(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn lexes_arithmetic_over_placeholders() {
        assert_eq!(
            kinds("$1 / ($2 * $2)"),
            vec![
                Token::Placeholder(1),
                Token::Slash,
                Token::LParen,
                Token::Placeholder(2),
                Token::Star,
                Token::Placeholder(2),
                Token::RParen,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn lexes_intrinsics_dates_and_memo() {
        assert_eq!(
            kinds("~IN([1, 2], $1) ? $(#2020-01-31#) : undefined"),
            vec![
                Token::Intrinsic("IN".to_string()),
                Token::LParen,
                Token::LBracket,
                Token::Number("1".to_string()),
                Token::Comma,
                Token::Number("2".to_string()),
                Token::RBracket,
                Token::Comma,
                Token::Placeholder(1),
                Token::RParen,
                Token::Question,
                Token::Memo,
                Token::LParen,
                Token::Date("2020-01-31".to_string()),
                Token::RParen,
                Token::Colon,
                Token::Word("undefined".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn distinguishes_equality_operators() {
        assert_eq!(
            kinds("$1 == 1 != 2 === 3 !== 4"),
            vec![
                Token::Placeholder(1),
                Token::Eq,
                Token::Number("1".to_string()),
                Token::Neq,
                Token::Number("2".to_string()),
                Token::StrictEq,
                Token::Number("3".to_string()),
                Token::StrictNeq,
                Token::Number("4".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn temporaries_are_accepted() {
        assert_eq!(
            kinds("_bmi = 2"),
            vec![
                Token::Temp("_bmi".to_string()),
                Token::Assign,
                Token::Number("2".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn rejects_foreign_identifiers() {
        let err = lex("window.alert(1)").unwrap_err();
        assert!(err.message.contains("unauthorized identifier 'window'"));
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn rejects_statement_separators() {
        let err = lex("$1; $2").unwrap_err();
        assert!(err.message.contains("unexpected character ';'"));
        assert_eq!(err.offset, 2);
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(lex("'abc").is_err());
    }

    #[test]
    fn rejects_zero_placeholder() {
        assert!(lex("$0 + 1").is_err());
    }
}
