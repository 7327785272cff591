use rustc_hash::FxHashSet;

/// Characters the target device's filesystem cannot store.
pub const DEFAULT_FORBIDDEN: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Replacement rules for device-safe path components.
///
/// Read-only after construction. The replacement character is removed from
/// the forbidden set so repeated sanitization is a fixed point.
#[derive(Debug, Clone)]
pub struct SanitizeRules {
    forbidden: FxHashSet<char>,
    replacement: char,
}

impl Default for SanitizeRules {
    fn default() -> Self {
        Self::with_replacement('_')
    }
}

impl SanitizeRules {
    pub fn new(forbidden: impl IntoIterator<Item = char>, replacement: char) -> Self {
        let forbidden = forbidden
            .into_iter()
            .filter(|&c| c != replacement)
            .collect();
        Self {
            forbidden,
            replacement,
        }
    }

    /// Default forbidden set with a custom replacement character.
    pub fn with_replacement(replacement: char) -> Self {
        Self::new(DEFAULT_FORBIDDEN.iter().copied(), replacement)
    }

    pub fn replacement(&self) -> char {
        self.replacement
    }

    /// Control characters are always forbidden on top of the configured set.
    pub fn is_forbidden(&self, c: char) -> bool {
        c.is_control() || self.forbidden.contains(&c)
    }

    /// Characters some filesystem may have substituted in an existing file
    /// name: the forbidden punctuation (separators excluded) plus the
    /// replacement character itself. Used by fuzzy reference resolution.
    pub fn ambiguous_set(&self) -> FxHashSet<char> {
        let mut set: FxHashSet<char> = self
            .forbidden
            .iter()
            .copied()
            .filter(|c| !matches!(c, '/' | '\\'))
            .collect();
        set.insert(self.replacement);
        set
    }
}

/// Replace every forbidden character in a single path component.
///
/// Everything else, including non-ASCII, passes through untouched.
pub fn sanitize_component(component: &str, rules: &SanitizeRules) -> String {
    component
        .chars()
        .map(|c| {
            if rules.is_forbidden(c) {
                rules.replacement()
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_component_basic() {
        let rules = SanitizeRules::default();
        assert_eq!(sanitize_component("normal_name", &rules), "normal_name");
        assert_eq!(
            sanitize_component("file with spaces", &rules),
            "file with spaces"
        );
        assert_eq!(
            sanitize_component("file/with\\bad:chars*", &rules),
            "file_with_bad_chars_"
        );
        assert_eq!(sanitize_component("What?.mp3", &rules), "What_.mp3");
    }

    #[test]
    fn test_sanitize_component_control_chars() {
        let rules = SanitizeRules::default();
        assert_eq!(
            sanitize_component("file\x00with\x01control\x02chars", &rules),
            "file_with_control_chars"
        );
    }

    #[test]
    fn test_sanitize_component_keeps_non_ascii() {
        let rules = SanitizeRules::default();
        assert_eq!(sanitize_component("Björk - Jóga.flac", &rules), "Björk - Jóga.flac");
        assert_eq!(sanitize_component("雨の歌?.mp3", &rules), "雨の歌_.mp3");
    }

    #[test]
    fn test_sanitize_component_idempotent() {
        let rules = SanitizeRules::default();
        for input in ["a?b:c\"d.mp3", "already_clean.mp3", "x\x07y<z>.flac"] {
            let once = sanitize_component(input, &rules);
            assert_eq!(sanitize_component(&once, &rules), once);
        }
    }

    #[test]
    fn test_sanitize_component_total() {
        let rules = SanitizeRules::default();
        let out = sanitize_component("<>:\"|?*\\/\x1f", &rules);
        assert!(out.chars().all(|c| !rules.is_forbidden(c)));
        assert_eq!(out, "__________");
    }

    #[test]
    fn test_custom_replacement_never_forbidden() {
        // A replacement that appears in the forbidden set must not be replaced
        // with itself forever; the constructor drops it from the set.
        let rules = SanitizeRules::new(['-', '?'], '-');
        assert_eq!(sanitize_component("a?b-c", &rules), "a-b-c");
        assert_eq!(sanitize_component("a-b-c", &rules), "a-b-c");
    }

    #[test]
    fn test_ambiguous_set_excludes_separators() {
        let rules = SanitizeRules::default();
        let ambiguous = rules.ambiguous_set();
        assert!(ambiguous.contains(&'?'));
        assert!(ambiguous.contains(&'_'));
        assert!(!ambiguous.contains(&'/'));
        assert!(!ambiguous.contains(&'\\'));
    }
}
