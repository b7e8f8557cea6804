use crate::error::HeaderError;

/// One lexical element of a WebDAV If header.
#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    /// A bareword made of URI characters, e.g. `urn:lock:abc123` or `Not`.
    Word(String),
    /// The content of a `"`-quoted span, quotes stripped.
    Quoted(String),
    /// One of `< > ( ) [ ]`.
    Delim(char),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Word(w) => write!(f, "{}", w),
            Self::Quoted(q) => write!(f, "\"{}\"", q),
            Self::Delim(c) => write!(f, "{}", c),
        }
    }
}

const DELIMS: [char; 6] = ['<', '>', '(', ')', '[', ']'];

/// The Condition grammar treats the URI punctuation ranges `!`-`/` and
/// `:`-`@` as word characters; the Precondition grammar additionally
/// accepts `\`, `^` and `_` (the `[`-`_` range minus the bracket
/// delimiters).
fn is_word_char(c: char, lenient: bool) -> bool {
    if DELIMS.contains(&c) {
        return false;
    }
    c.is_ascii_alphanumeric()
        || ('!'..='/').contains(&c)
        || (':'..='@').contains(&c)
        || (lenient && ('['..='_').contains(&c))
}

/// Tokenize a whole If header eagerly. The grammar never sees a scanning
/// fault mid-parse: the only possible fault, an unterminated quoted
/// string, aborts here with its own error variant.
pub fn scan(input: &str, lenient: bool) -> Result<Vec<Token>, HeaderError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if DELIMS.contains(&c) {
            tokens.push(Token::Delim(c));
        } else if c == '"' {
            let mut quoted = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(other) => quoted.push(other),
                    None => return Err(HeaderError::UnterminatedQuote),
                }
            }
            tokens.push(Token::Quoted(quoted));
        } else if is_word_char(c, lenient) {
            let mut word = String::new();
            word.push(c);
            while let Some(&next) = chars.peek() {
                if !is_word_char(next, lenient) {
                    break;
                }
                word.push(next);
                chars.next();
            }
            tokens.push(Token::Word(word));
        }
        // anything else separates words
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delims_and_words() {
        let got = scan("<urn:lock:abc123> (Not <urn:x>)", true).unwrap();
        assert_eq!(
            got,
            vec![
                Token::Delim('<'),
                Token::Word("urn:lock:abc123".into()),
                Token::Delim('>'),
                Token::Delim('('),
                Token::Word("Not".into()),
                Token::Delim('<'),
                Token::Word("urn:x".into()),
                Token::Delim('>'),
                Token::Delim(')'),
            ]
        );
    }

    #[test]
    fn quoted_span() {
        let got = scan("[\"etag one\"]", true).unwrap();
        assert_eq!(
            got,
            vec![
                Token::Delim('['),
                Token::Quoted("etag one".into()),
                Token::Delim(']'),
            ]
        );
    }

    #[test]
    fn unterminated_quote_aborts() {
        assert_eq!(scan("[\"oops", true), Err(HeaderError::UnterminatedQuote));
    }

    #[test]
    fn lenient_extends_word_chars() {
        // underscore splits a word under the strict configuration
        assert_eq!(
            scan("a_b", false).unwrap(),
            vec![Token::Word("a".into()), Token::Word("b".into())]
        );
        assert_eq!(scan("a_b", true).unwrap(), vec![Token::Word("a_b".into())]);
    }
}
