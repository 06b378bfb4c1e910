//! Name similarity scorer used by both rule tiers.

/// Compare two free-text names and return a similarity in `[0, 1]`.
///
/// Both names are normalized (uppercase, non-alphanumeric folded to spaces).
/// Identical normalized strings score 1.0. Otherwise each side is split into
/// words longer than two characters and a word from the first name counts as
/// matched when any word of the second contains it or is contained by it.
/// The ratio is taken against the larger word count, so the score is only
/// symmetric when both names have the same number of qualifying words.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let na = normalize(a);
    let nb = normalize(b);

    if na == nb {
        return 1.0;
    }

    let words_a: Vec<&str> = na.split_whitespace().filter(|w| w.chars().count() > 2).collect();
    let words_b: Vec<&str> = nb.split_whitespace().filter(|w| w.chars().count() > 2).collect();

    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let matched = words_a
        .iter()
        .filter(|w| words_b.iter().any(|o| o.contains(*w) || w.contains(o)))
        .count();

    matched as f64 / words_a.len().max(words_b.len()) as f64
}

fn normalize(name: &str) -> String {
    name.to_uppercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
