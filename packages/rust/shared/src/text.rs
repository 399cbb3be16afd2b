//! Text normalization helpers: slugs and keyword sets.

use std::collections::HashSet;

/// Minimum token length (in chars) kept in a derived keyword set.
const MIN_KEYWORD_LEN: usize = 2;

/// Build a URL slug: lowercase, spaces and dashes become `-`, letters,
/// digits and underscores are kept, everything else is dropped.
pub fn generate_slug(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' | '-' => Some('-'),
            '_' => Some('_'),
            c if c.is_alphanumeric() => Some(c),
            _ => None,
        })
        .collect()
}

/// Derive the comma-separated keyword set of a product from its display
/// name and display description.
///
/// Tokens are lowercase alphanumeric runs of at least two chars, unique, in
/// first-seen order (name tokens first).
pub fn derive_keywords(name: &str, description: &str) -> String {
    let mut seen = HashSet::new();
    let mut tokens: Vec<String> = Vec::new();

    for text in [name, description] {
        for raw in text.split(|c: char| !c.is_alphanumeric()) {
            if raw.chars().count() < MIN_KEYWORD_LEN {
                continue;
            }
            let token = raw.to_lowercase();
            if seen.insert(token.clone()) {
                tokens.push(token);
            }
        }
    }

    tokens.join(",")
}

/// Split a comma-separated keyword list into trimmed, non-empty tokens.
///
/// Matching on these tokens is case-sensitive.
pub fn keyword_tokens(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|t| !t.is_empty())
}

/// True when the two comma-separated keyword lists share at least one token.
pub fn keywords_overlap(a: &str, b: &str) -> bool {
    let left: HashSet<&str> = keyword_tokens(a).collect();
    keyword_tokens(b).any(|t| left.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_rules() {
        assert_eq!(generate_slug("  Red Running-Shoes "), "red-running-shoes");
        assert_eq!(generate_slug("Size 42 (EU)!"), "size-42-eu");
        assert_eq!(generate_slug("snake_case"), "snake_case");
        assert_eq!(generate_slug("Åre Jacka"), "åre-jacka");
    }

    #[test]
    fn derived_keywords_are_unique_and_ordered() {
        let kw = derive_keywords("Red Shoes", "Comfortable shoes, in red. A size 9");
        assert_eq!(kw, "red,shoes,comfortable,in,size");
    }

    #[test]
    fn derived_keywords_empty_input() {
        assert_eq!(derive_keywords("", ""), "");
    }

    #[test]
    fn keyword_tokens_trim_and_skip_empty() {
        let tokens: Vec<&str> = keyword_tokens(" shoes, boots ,,  ").collect();
        assert_eq!(tokens, vec!["shoes", "boots"]);
    }

    #[test]
    fn overlap_is_case_sensitive() {
        assert!(keywords_overlap("shoes,red", "shoes, boots"));
        assert!(!keywords_overlap("shoes,red", "Shoes,boots"));
        assert!(!keywords_overlap("", "shoes"));
    }
}
