use super::ExprError;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Question,
    Colon,
    Bang,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    StrictEq,
    StrictNe,
    AndAnd,
    OrOr,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if is_ident_start(c) {
            let start = i;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(match word.as_str() {
                "true" => Token::True,
                "false" => Token::False,
                "null" => Token::Null,
                _ => Token::Ident(word),
            });
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let is_float = i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit();
            if is_float {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let token = if is_float {
                text.parse().map(Token::Float).ok()
            } else {
                text.parse().map(Token::Int).ok()
            };
            tokens.push(token.ok_or(ExprError::InvalidNumber(text))?);
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            let mut value = String::new();
            i += 1;
            loop {
                let Some(&ch) = chars.get(i) else {
                    return Err(ExprError::UnterminatedString);
                };
                i += 1;
                match ch {
                    ch if ch == quote => break,
                    '\\' => {
                        let Some(&escaped) = chars.get(i) else {
                            return Err(ExprError::UnterminatedString);
                        };
                        i += 1;
                        value.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                    }
                    ch => value.push(ch),
                }
            }
            tokens.push(Token::Str(value));
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
        let (token, width) = if rest.starts_with("===") {
            (Token::StrictEq, 3)
        } else if rest.starts_with("!==") {
            (Token::StrictNe, 3)
        } else if rest.starts_with("==") {
            (Token::EqEq, 2)
        } else if rest.starts_with("!=") {
            (Token::NotEq, 2)
        } else if rest.starts_with("<=") {
            (Token::Le, 2)
        } else if rest.starts_with(">=") {
            (Token::Ge, 2)
        } else if rest.starts_with("&&") {
            (Token::AndAnd, 2)
        } else if rest.starts_with("||") {
            (Token::OrOr, 2)
        } else {
            let single = match c {
                '(' => Token::LParen,
                ')' => Token::RParen,
                '[' => Token::LBracket,
                ']' => Token::RBracket,
                '.' => Token::Dot,
                '?' => Token::Question,
                ':' => Token::Colon,
                '!' => Token::Bang,
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '%' => Token::Percent,
                '<' => Token::Lt,
                '>' => Token::Gt,
                other => return Err(ExprError::UnexpectedChar(other)),
            };
            (single, 1)
        };
        tokens.push(token);
        i += width;
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_mixed_expression() {
        let tokens = tokenize("a.b[0] >= 2.5 && name !== 'x\\'y'").unwrap();
        assert_eq!(
            tokens,
            [
                Token::Ident("a".into()),
                Token::Dot,
                Token::Ident("b".into()),
                Token::LBracket,
                Token::Int(0),
                Token::RBracket,
                Token::Ge,
                Token::Float(2.5),
                Token::AndAnd,
                Token::Ident("name".into()),
                Token::StrictNe,
                Token::Str("x'y".into()),
            ]
        );
    }

    #[test]
    fn keywords_are_literals() {
        assert_eq!(
            tokenize("true false null").unwrap(),
            [Token::True, Token::False, Token::Null]
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(tokenize("'open"), Err(ExprError::UnterminatedString)));
        assert!(matches!(tokenize("a # b"), Err(ExprError::UnexpectedChar('#'))));
    }
}
