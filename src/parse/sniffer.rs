//! Withholding of text that may be the start of a control tag.
//!
//! Network chunking can split `<tool_call>` into `<`, `too`, `l_call>`. The
//! sniffer keeps any trailing text that could still grow into a control
//! token out of the plain-text path until it is disambiguated.

/// Bounded lookahead over the tail of pending text.
///
/// The window is the length of the longest control token.
#[derive(Debug, Clone)]
pub struct PrefixSniffer {
    tokens: Vec<String>,
}

impl PrefixSniffer {
    /// Create a sniffer for the given control tokens (e.g. `<tool_call>`).
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Return how many leading bytes of `pending` can be released as text.
    ///
    /// The withheld tail is always a proper prefix of some control token, so
    /// it is never longer than the window and is released as soon as the
    /// following input diverges from every token.
    pub fn releasable(&self, pending: &str) -> usize {
        pending.len() - self.held_len(pending)
    }

    fn held_len(&self, pending: &str) -> usize {
        let mut best = 0;
        for token in &self.tokens {
            let max = token.len().saturating_sub(1).min(pending.len());
            for k in (best + 1..=max).rev() {
                if token.is_char_boundary(k) && pending.ends_with(&token[..k]) {
                    best = k;
                    break;
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sniffer() -> PrefixSniffer {
        PrefixSniffer::new(["<tool_call>", "</tool_call>"])
    }

    #[test]
    fn holds_partial_tag_prefixes() {
        let s = sniffer();
        assert_eq!(s.releasable("Hello <"), 6);
        assert_eq!(s.releasable("Hello <too"), 6);
        assert_eq!(s.releasable("</tool_ca"), 0);
    }

    #[test]
    fn releases_once_input_diverges() {
        let s = sniffer();
        assert_eq!(s.releasable("a <"), 2);
        assert_eq!(s.releasable("a < b"), 5);
        assert_eq!(s.releasable("<tool>"), 6);
    }

    #[test]
    fn complete_tokens_are_not_held_by_the_sniffer() {
        let s = sniffer();
        assert_eq!(s.releasable("<tool_call>"), "<tool_call>".len());
    }

    #[test]
    fn held_tail_is_shorter_than_longest_token() {
        let s = sniffer();
        let pending = "text </tool_call";
        assert_eq!(pending.len() - s.releasable(pending), "</tool_call".len());
    }

    #[test]
    fn plain_text_passes_through() {
        let s = sniffer();
        assert_eq!(s.releasable("no tags here"), 12);
        assert_eq!(s.releasable(""), 0);
    }
}
