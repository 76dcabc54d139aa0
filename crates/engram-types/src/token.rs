/// Deterministic token estimate for budget accounting.
///
/// `ceil(chars / 4)` with a floor of 1 for non-empty text. This is a
/// documented approximation, not a tokenizer: budgets only need a stable,
/// reproducible upper-bound-ish figure, and the same text must always cost
/// the same amount.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    if chars == 0 {
        return 0;
    }
    (chars.div_ceil(4)).max(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_rounds_up() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(9)), 3);
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        // four 3-byte chars: one token, not three
        assert_eq!(estimate_tokens("ありがと"), 1);
    }

    #[test]
    fn test_deterministic() {
        let text = "the same text must always cost the same amount";
        assert_eq!(estimate_tokens(text), estimate_tokens(text));
    }
}
