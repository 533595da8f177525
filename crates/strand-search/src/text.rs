//! Tokenization, stop words and stemming shared by indexing and querying.

/// One indexed word and its position among all words of the text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    pub position: u32,
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.binary_search(&word).is_ok()
}

/// Split on anything that is not alphanumeric, lowercase, drop stop words
/// and stem.
///
/// Positions count stop words too, so phrase queries keep their gaps.
pub fn tokenize(text: &str) -> Vec<Token> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .enumerate()
        .filter_map(|(position, word)| {
            let lower = word.to_lowercase();
            if is_stop_word(&lower) {
                return None;
            }
            Some(Token {
                term: stem(&lower),
                position: position as u32,
            })
        })
        .collect()
}

/// Light suffix stripping. Only the first matching rule applies.
pub fn stem(word: &str) -> String {
    let len = word.chars().count();
    let strip = |suffix: &str| word[..word.len() - suffix.len()].to_string();

    if len > 4 && word.ends_with("ies") {
        return format!("{}y", strip("ies"));
    }
    if word.ends_with("sses") {
        return strip("es");
    }
    if len > 5 && word.ends_with("ing") {
        return strip("ing");
    }
    if len > 4 && word.ends_with("edly") {
        return strip("edly");
    }
    if len > 4 && word.ends_with("ed") {
        return strip("ed");
    }
    if len > 4 && word.ends_with("ly") {
        return strip("ly");
    }
    if len > 3 && word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") {
        return strip("s");
    }
    word.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(text: &str) -> Vec<String> {
        tokenize(text).into_iter().map(|t| t.term).collect()
    }

    #[test]
    fn stop_word_list_is_sorted() {
        let mut sorted = STOP_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOP_WORDS);
    }

    #[test]
    fn lowercases_and_drops_stop_words() {
        assert_eq!(terms("The Deploy is DONE"), vec!["deploy", "done"]);
    }

    #[test]
    fn positions_include_stop_words() {
        let tokens = tokenize("cat in the hat");
        assert_eq!(tokens[0].position, 0);
        assert_eq!(tokens[1].position, 3);
    }

    #[test]
    fn unicode_words_survive() {
        assert_eq!(terms("Grüße, Zoë!"), vec!["grüße", "zoë"]);
        assert_eq!(terms("東京 タワー"), vec!["東京", "タワー"]);
    }

    #[test]
    fn stems_common_suffixes() {
        assert_eq!(stem("deploying"), "deploy");
        assert_eq!(stem("deployed"), "deploy");
        assert_eq!(stem("deploys"), "deploy");
        assert_eq!(stem("queries"), "query");
        assert_eq!(stem("classes"), "class");
        assert_eq!(stem("status"), "status");
        assert_eq!(stem("bus"), "bus");
        assert_eq!(stem("quickly"), "quick");
    }
}
