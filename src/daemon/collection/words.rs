/// Derives word counts from a stream of typed characters. A word is counted once a separator
/// follows at least one other character.
#[derive(Debug, Default)]
pub struct WordCounter {
    in_word: bool,
}

impl WordCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_separator(c: char) -> bool {
        c.is_whitespace() || matches!(c, '.' | ',' | ';' | ':' | '!' | '?')
    }

    /// Returns whether `c` completed a word.
    pub fn push(&mut self, c: char) -> bool {
        if Self::is_separator(c) {
            std::mem::take(&mut self.in_word)
        } else {
            self.in_word = true;
            false
        }
    }

    /// Number of words completed by `text`.
    pub fn push_str(&mut self, text: &str) -> u64 {
        text.chars().filter(|c| self.push(*c)).count() as u64
    }
}
