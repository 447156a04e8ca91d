//! Name normalisation and string-distance helpers for entity resolution.

use unicode_normalization::UnicodeNormalization;

/// Inflectional endings recognised by [`inflection_root`].
pub const INFLECTION_SUFFIXES: [&str; 5] = ["s", "es", "ed", "ing", "er"];

/// Normalize an entity name for comparison (Unicode NFKC + lowercase).
///
/// Separators (`_`, `-`, `/`) become spaces, other punctuation is dropped and
/// runs of whitespace collapse to one space.
pub fn normalize_name(name: &str) -> String {
    let normalized: String = name.nfkc().collect();
    let cleaned: String = normalized
        .to_lowercase()
        .chars()
        .map(|c| if matches!(c, '_' | '-' | '/') { ' ' } else { c })
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Calculate Levenshtein distance between two strings.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    let (m, n) = (a_chars.len(), b_chars.len());

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut prev = (0..=n).collect::<Vec<_>>();
    let mut curr = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Lexical gate applied on top of vector similarity: case-insensitive
/// containment either way, or an edit distance below `max_edit_distance`.
pub fn lexically_close(a: &str, b: &str, max_edit_distance: usize) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    a.contains(&b) || b.contains(&a) || levenshtein_distance(&a, &b) < max_edit_distance
}

/// If one identifier is the other plus an inflectional suffix, return the
/// shorter one (the root). Comparison ignores case.
pub fn inflection_root<'a>(a: &'a str, b: &'a str) -> Option<&'a str> {
    let (root, longer) = if a.chars().count() < b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    if root.is_empty() {
        return None;
    }
    let root_lower = root.to_lowercase();
    let longer_lower = longer.to_lowercase();
    let rest = longer_lower.strip_prefix(&root_lower)?;
    INFLECTION_SUFFIXES
        .contains(&rest)
        .then_some(root)
}
