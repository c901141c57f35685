use serde::{Deserialize, Serialize};

/// Kind of a token produced by [`tokenize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    /// A maximal run of word characters (letters, digits, apostrophes).
    Word,
    /// A single non-whitespace, non-word character.
    Punct,
}

/// A comparable text unit. Original casing is preserved in `text` for
/// display; word matching uses the case-folded form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// The token exactly as it appears in the source text.
    pub text: String,
    pub kind: TokenKind,
    /// Index of this token in the source sequence.
    pub position: usize,
    /// Lowercased form of `text`, used for word comparison.
    folded: String,
}

impl Token {
    fn new(text: String, kind: TokenKind, position: usize) -> Self {
        let folded = text.to_lowercase();
        Self {
            text,
            kind,
            position,
            folded,
        }
    }

    /// Equality rule for alignment: word tokens compare case-insensitively,
    /// punctuation tokens compare by exact character.
    #[must_use]
    pub fn matches(&self, other: &Token) -> bool {
        match (self.kind, other.kind) {
            (TokenKind::Word, TokenKind::Word) => self.folded == other.folded,
            (TokenKind::Punct, TokenKind::Punct) => self.text == other.text,
            _ => false,
        }
    }

    /// Whether this token is a word containing at least one alphabetic
    /// character. Only such tokens are eligible for mismatch highlighting
    /// and count toward the score denominator.
    #[must_use]
    pub fn is_alphabetic_word(&self) -> bool {
        self.kind == TokenKind::Word && self.text.chars().any(char::is_alphabetic)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '\''
}

/// Split text into word and punctuation tokens.
///
/// Whitespace is a separator and is never emitted. Empty input produces an
/// empty sequence. This function is pure and has no failure modes.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();

    let mut flush = |word: &mut String, tokens: &mut Vec<Token>| {
        if !word.is_empty() {
            let position = tokens.len();
            tokens.push(Token::new(std::mem::take(word), TokenKind::Word, position));
        }
    };

    for c in text.chars() {
        if is_word_char(c) {
            word.push(c);
        } else {
            flush(&mut word, &mut tokens);
            if !c.is_whitespace() {
                let position = tokens.len();
                tokens.push(Token::new(c.to_string(), TokenKind::Punct, position));
            }
        }
    }
    flush(&mut word, &mut tokens);

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \t\n").is_empty());
    }

    #[test]
    fn test_tokenize_words_and_punctuation() {
        let tokens = tokenize("Hello, my name is John.");
        assert_eq!(
            texts(&tokens),
            vec!["Hello", ",", "my", "name", "is", "John", "."]
        );
        assert_eq!(tokens[0].kind, TokenKind::Word);
        assert_eq!(tokens[1].kind, TokenKind::Punct);
        assert_eq!(tokens[6].kind, TokenKind::Punct);
    }

    #[test]
    fn test_tokenize_positions_are_sequential() {
        let tokens = tokenize("a, b c!");
        for (i, token) in tokens.iter().enumerate() {
            assert_eq!(token.position, i);
        }
    }

    #[test]
    fn test_apostrophes_stay_inside_words() {
        let tokens = tokenize("it's John's");
        assert_eq!(texts(&tokens), vec!["it's", "John's"]);
        assert!(tokens.iter().all(|t| t.kind == TokenKind::Word));
    }

    #[test]
    fn test_word_match_is_case_insensitive() {
        let a = tokenize("Hello");
        let b = tokenize("hello");
        assert!(a[0].matches(&b[0]));
    }

    #[test]
    fn test_punct_match_is_exact_and_kinds_never_cross() {
        let comma = tokenize(",");
        let period = tokenize(".");
        assert!(!comma[0].matches(&period[0]));

        let word_a = tokenize("a");
        assert!(!word_a[0].matches(&comma[0]));
    }

    #[test]
    fn test_alphabetic_word_classification() {
        let tokens = tokenize("it's 2nd 123 ,");
        assert!(tokens[0].is_alphabetic_word());
        assert!(tokens[1].is_alphabetic_word());
        assert!(!tokens[2].is_alphabetic_word());
        assert!(!tokens[3].is_alphabetic_word());
    }

    #[test]
    fn test_rejoin_recovers_non_whitespace_characters() {
        let input = "Well, I can't say - it was 100% \"fine\"!";
        let rejoined: String = tokenize(input).iter().map(|t| t.text.as_str()).collect();
        let expected: String = input.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(rejoined, expected);
    }
}
