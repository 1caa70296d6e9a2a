//! Redis command line tokenizer
//!
//! Splits a `redis-cli` style line into arguments. Single and double quotes
//! group words containing spaces and are not part of the resulting token.
//! Parsing is lenient: an unterminated quote simply runs to the end of the line.

/// Split a command line into tokens
///
/// # Arguments
/// * `line` - Raw command text, e.g. `SET greeting "hello world"`
///
/// # Returns
/// * `Vec<String>` - Tokens in order; empty for blank input
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    // A quoted empty string ("") still yields a token.
    let mut has_token = false;

    for ch in line.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None => match ch {
                '"' | '\'' => {
                    quote = Some(ch);
                    has_token = true;
                }
                c if c.is_whitespace() => {
                    if has_token || !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                    has_token = false;
                }
                c => current.push(c),
            },
        }
    }

    if has_token || !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_words() {
        assert_eq!(tokenize("GET mykey"), vec!["GET", "mykey"]);
    }

    #[test]
    fn test_double_quoted_value() {
        assert_eq!(
            tokenize(r#"SET mykey "hello world""#),
            vec!["SET", "mykey", "hello world"]
        );
    }

    #[test]
    fn test_single_quotes_keep_double_quotes() {
        assert_eq!(
            tokenize(r#"SET k 'say "hi"'"#),
            vec!["SET", "k", r#"say "hi""#]
        );
    }

    #[test]
    fn test_repeated_spaces_are_dropped() {
        assert_eq!(tokenize("  HGET   h    f  "), vec!["HGET", "h", "f"]);
    }

    #[test]
    fn test_blank_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \t ").is_empty());
    }

    #[test]
    fn test_unterminated_quote_is_flushed() {
        assert_eq!(tokenize(r#"SET k "open value"#), vec!["SET", "k", "open value"]);
    }

    #[test]
    fn test_empty_quoted_argument() {
        assert_eq!(tokenize(r#"SET k """#), vec!["SET", "k", ""]);
    }

    #[test]
    fn test_rejoin_preserves_token_sequence() {
        let tokens = tokenize(r#"LPUSH list "a b" c 'd e'"#);
        assert_eq!(tokens.join(" "), "LPUSH list a b c d e");
        assert_eq!(tokens.len(), 5);
    }
}
