//! Natural-language tokenization

/// One unit of the caller's request text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NlToken {
    /// Lower-cased word (letters, digits, underscores)
    Word(String),
    /// Integer or decimal, optionally negative
    Number(String),
    /// Text between matching quotes, verbatim
    Quoted(String),
    /// Comparison operator: `=`, `!=`, `<>`, `<`, `<=`, `>`, `>=`
    Op(String),
}

impl NlToken {
    pub fn word(&self) -> Option<&str> {
        match self {
            NlToken::Word(w) => Some(w),
            _ => None,
        }
    }

    pub fn is(&self, word: &str) -> bool {
        self.word() == Some(word)
    }

    pub fn is_any(&self, words: &[&str]) -> bool {
        self.word().is_some_and(|w| words.contains(&w))
    }
}

/// Words that never stand on their own as a filter value
pub const STOPWORDS: &[&str] = &[
    "a", "all", "an", "and", "any", "are", "as", "asc", "ascending", "at", "be", "by", "desc",
    "descending", "each", "every", "first", "for", "from", "give", "in", "is", "it", "its",
    "last", "limit", "list", "me", "of", "on", "or", "order", "ordered", "please", "records",
    "results", "row", "rows", "show", "sort", "sorted", "than", "that", "the", "their", "them",
    "then", "there", "these", "those", "to", "top", "was", "were", "what", "where", "which",
    "who", "whose", "with", "without",
];

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Split request text into tokens
///
/// Quotes only open at a word boundary, so apostrophes inside words
/// ("user's", "don't") are dropped rather than starting a quoted value.
pub fn tokenize(text: &str) -> Vec<NlToken> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if let Some(close) = closing_quote(c) {
            let at_boundary = i == 0 || !is_word_char(chars[i - 1]);
            if at_boundary {
                if let Some(len) = chars[i + 1..].iter().position(|&ch| ch == close) {
                    let value: String = chars[i + 1..i + 1 + len].iter().collect();
                    tokens.push(NlToken::Quoted(value));
                    i += len + 2;
                    continue;
                }
            }
            i += 1;
            continue;
        }

        let negative = c == '-'
            && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())
            && (i == 0 || chars[i - 1].is_whitespace());
        if c.is_ascii_digit() || negative {
            let start = i;
            i += 1;
            let mut seen_dot = false;
            while i < chars.len() {
                let d = chars[i];
                if d.is_ascii_digit() {
                    i += 1;
                } else if d == '.'
                    && !seen_dot
                    && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())
                {
                    seen_dot = true;
                    i += 1;
                } else {
                    break;
                }
            }
            // Digits glued to letters ("2nd", "v2") are words
            if i < chars.len() && is_word_char(chars[i]) {
                while i < chars.len() && is_word_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(NlToken::Word(word.to_lowercase()));
            } else {
                tokens.push(NlToken::Number(chars[start..i].iter().collect()));
            }
            continue;
        }

        if matches!(c, '<' | '>' | '=' | '!') {
            let next = chars.get(i + 1).copied();
            let op = match (c, next) {
                ('<', Some('=')) | ('>', Some('=')) | ('!', Some('=')) | ('<', Some('>')) => {
                    i += 2;
                    format!("{}{}", c, next.unwrap_or_default())
                }
                ('!', _) => {
                    i += 1;
                    continue;
                }
                _ => {
                    i += 1;
                    c.to_string()
                }
            };
            tokens.push(NlToken::Op(op));
            continue;
        }

        if is_word_char(c) {
            let mut word = String::new();
            while i < chars.len() {
                let ch = chars[i];
                if is_word_char(ch) {
                    word.extend(ch.to_lowercase());
                    i += 1;
                } else if (ch == '\'' || ch == '’')
                    && chars.get(i + 1).is_some_and(|n| n.is_alphabetic())
                {
                    i += 1;
                } else {
                    break;
                }
            }
            tokens.push(NlToken::Word(word));
            continue;
        }

        // Punctuation acts as a separator
        i += 1;
    }

    tokens
}

/// Split request text at `,` and `;` outside quoted values
pub fn clauses(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut open_quote: Option<char> = None;
    let mut prev: Option<char> = None;

    for (i, c) in text.char_indices() {
        match open_quote {
            Some(close) if c == close => open_quote = None,
            Some(_) => {}
            None => {
                let at_boundary = prev.map_or(true, |p| !is_word_char(p));
                if let Some(close) = closing_quote(c).filter(|_| at_boundary) {
                    open_quote = Some(close);
                } else if c == ',' || c == ';' {
                    out.push(&text[start..i]);
                    start = i + c.len_utf8();
                }
            }
        }
        prev = Some(c);
    }
    out.push(&text[start..]);
    out
}

fn closing_quote(c: char) -> Option<char> {
    match c {
        '\'' => Some('\''),
        '"' => Some('"'),
        '`' => Some('`'),
        '“' => Some('”'),
        '‘' => Some('’'),
        _ => None,
    }
}

/// Reduce an English plural to its singular form
pub fn singular(word: &str) -> String {
    let w = word.to_lowercase();
    if w.len() > 4 && w.ends_with("ies") {
        return format!("{}y", &w[..w.len() - 3]);
    }
    for suffix in ["sses", "shes", "ches", "xes", "zes"] {
        if w.len() > suffix.len() + 1 && w.ends_with(suffix) {
            return w[..w.len() - 2].to_string();
        }
    }
    if w.len() > 3 && w.ends_with('s') && !w.ends_with("ss") && !w.ends_with("us") {
        return w[..w.len() - 1].to_string();
    }
    w
}

/// Lower-cased words of an identifier such as `order_items` or `OrderItems`
pub fn identifier_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in name.chars() {
        if c == '_' || c == '-' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(s: &str) -> NlToken {
        NlToken::Word(s.to_string())
    }

    #[test]
    fn test_tokenize_mixed() {
        let tokens = tokenize("Orders where total >= 10.5 and status is 'shipped'");
        assert_eq!(
            tokens,
            vec![
                w("orders"),
                w("where"),
                w("total"),
                NlToken::Op(">=".into()),
                NlToken::Number("10.5".into()),
                w("and"),
                w("status"),
                w("is"),
                NlToken::Quoted("shipped".into()),
            ]
        );
    }

    #[test]
    fn test_apostrophes_inside_words() {
        assert_eq!(tokenize("user's orders"), vec![w("users"), w("orders")]);
    }

    #[test]
    fn test_punctuation_and_semicolons_are_separators() {
        assert_eq!(tokenize("users; drop table"), vec![w("users"), w("drop"), w("table")]);
    }

    #[test]
    fn test_clauses_split_outside_quotes() {
        assert_eq!(clauses("users; drop table"), vec!["users", " drop table"]);
        assert_eq!(clauses("a, b;c"), vec!["a", " b", "c"]);
        assert_eq!(clauses("name is 'x; y', then z"), vec!["name is 'x; y'", " then z"]);
        assert_eq!(clauses("user's orders, all"), vec!["user's orders", " all"]);
        assert_eq!(clauses("plain"), vec!["plain"]);
    }

    #[test]
    fn test_negative_numbers_and_glued_digits() {
        assert_eq!(
            tokenize("balance < -5 in 2nd"),
            vec![
                w("balance"),
                NlToken::Op("<".into()),
                NlToken::Number("-5".into()),
                w("in"),
                w("2nd"),
            ]
        );
    }

    #[test]
    fn test_unterminated_quote_is_dropped() {
        assert_eq!(tokenize("name is 'bob"), vec![w("name"), w("is"), w("bob")]);
    }

    #[test]
    fn test_singular() {
        assert_eq!(singular("orders"), "order");
        assert_eq!(singular("categories"), "category");
        assert_eq!(singular("addresses"), "address");
        assert_eq!(singular("boxes"), "box");
        assert_eq!(singular("status"), "status");
        assert_eq!(singular("class"), "class");
        assert_eq!(singular("user"), "user");
        assert_eq!(singular("ids"), "ids");
    }

    #[test]
    fn test_identifier_words() {
        assert_eq!(identifier_words("order_items"), vec!["order", "items"]);
        assert_eq!(identifier_words("OrderItems"), vec!["order", "items"]);
        assert_eq!(identifier_words("created_at"), vec!["created", "at"]);
        assert_eq!(identifier_words("id"), vec!["id"]);
    }
}
