use std::path::{Path, PathBuf};

/// Expand `~`, `$VAR` and `${VAR}` in a user-supplied path.
///
/// Unknown variables leave the input untouched.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    shellexpand::full(raw.as_ref())
        .map(|s| PathBuf::from(s.into_owned()))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_tilde_when_expanding_then_resolves_home() {
        let home = std::env::var("HOME").expect("HOME should be set");
        let expanded = expand_path(Path::new("~/cladesync.toml"));
        assert!(expanded.starts_with(&home), "{}", expanded.display());
    }

    #[test]
    fn given_unknown_variable_when_expanding_then_keeps_input() {
        let input = Path::new("$CLADESYNC_SURELY_UNSET_VAR/x.toml");
        assert_eq!(expand_path(input), input.to_path_buf());
    }
}
