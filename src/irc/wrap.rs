/// Widest chunk sent in a single PRIVMSG.
pub const WRAP_WIDTH: usize = 450;

/// Greedily pack the words of `text` into chunks of at most `width`
/// characters. Words are never split, so a single word longer than `width`
/// becomes a chunk of its own. Whitespace runs collapse to one space.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for word in text.split_whitespace() {
        let len = word.chars().count();
        if current_len > 0 && current_len + 1 + len > width {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(wrap("  hello   world ", 450), vec!["hello world"]);
        assert!(wrap("   ", 450).is_empty());
    }

    #[test]
    fn long_text_rejoins_to_the_same_words() {
        let text: String = (0..400).map(|i| format!("word{} ", i)).collect();
        let chunks = wrap(&text, WRAP_WIDTH);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= WRAP_WIDTH));
        assert!(chunks.iter().all(|c| c.trim() == c));

        let rejoined = chunks.join(" ");
        let expected: Vec<&str> = text.split_whitespace().collect();
        let words: Vec<&str> = rejoined.split_whitespace().collect();
        assert_eq!(words, expected);
    }

    #[test]
    fn long_words_are_not_broken() {
        let long = "x".repeat(30);
        let chunks = wrap(&format!("a {long} b"), 10);
        assert_eq!(chunks, vec!["a".to_string(), long, "b".to_string()]);
    }

    #[test]
    fn width_counts_characters_not_bytes() {
        let chunks = wrap("héé héé", 7);
        assert_eq!(chunks, vec!["héé héé"]);
    }
}
