/// Leftmost label of a domain (the text before the first dot).
/// A domain without dots is its own label.
pub fn leftmost_label(domain: &str) -> &str {
    domain.split('.').next().unwrap_or(domain)
}

/// Return the first needle contained in `domain`, if any.
/// Matching is a plain substring test on the verbatim domain.
pub fn first_match<'a>(domain: &str, needles: &'a [String]) -> Option<&'a str> {
    needles
        .iter()
        .map(String::as_str)
        .filter(|needle| !needle.is_empty())
        .find(|needle| domain.contains(needle))
}

/// Basic domain validation for names typed on the command line
pub fn is_valid_domain(domain: &str) -> bool {
    // Must contain at least one dot
    if !domain.contains('.') {
        return false;
    }

    // Must not contain protocols or paths
    if domain.contains("://") || domain.contains('/') {
        return false;
    }

    // Must not start or end with dot or hyphen
    if domain.starts_with('.') || domain.ends_with('.')
        || domain.starts_with('-') || domain.ends_with('-') {
        return false;
    }

    // Must not contain consecutive dots
    if domain.contains("..") {
        return false;
    }

    domain.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
}
