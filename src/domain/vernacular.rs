//! Rules for accepting common names returned by the name source.

use std::fmt;

/// Lookup pass against the name source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamePass {
    /// Dedicated vernacular-name property
    Vernacular,
    /// Generic English label, used for ids the first pass missed
    Label,
}

impl fmt::Display for NamePass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamePass::Vernacular => write!(f, "vernacular"),
            NamePass::Label => write!(f, "label"),
        }
    }
}

/// `Genus species` shape: capitalized first word, lowercase alphabetic second word.
pub fn looks_like_binomial(label: &str) -> bool {
    let words: Vec<&str> = label.split_whitespace().collect();
    let [genus, species] = words.as_slice() else {
        return false;
    };
    genus.chars().next().is_some_and(char::is_uppercase)
        && species.chars().next().is_some_and(char::is_lowercase)
        && species.chars().all(char::is_alphabetic)
}

/// Whether a fallback label is a usable common name for a taxon.
///
/// Labels that repeat the scientific name or read like a binomial are
/// rejected; they mean no common name exists.
pub fn accept_label(label: &str, scientific_name: Option<&str>) -> bool {
    let label = label.trim();
    if label.is_empty() {
        return false;
    }
    if scientific_name.is_some_and(|sci| sci.trim().eq_ignore_ascii_case(label)) {
        return false;
    }
    !looks_like_binomial(label)
}
