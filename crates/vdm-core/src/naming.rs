//! Filesystem-safe naming for download directories (one per channel).

/// Fallback when sanitizing leaves nothing usable.
const DEFAULT_COMPONENT: &str = "unknown";

/// Sanitize a channel or playlist name for use as a single path component:
/// drop `<>:"/\|?*` and control characters, trim leading/trailing dots and
/// spaces, and never return an empty string.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| {
            !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
                && !c.is_control()
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c == ' ');
    if trimmed.is_empty() {
        DEFAULT_COMPONENT.to_string()
    } else {
        trimmed.to_string()
    }
}
