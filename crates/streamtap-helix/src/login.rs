/// Normalizes a display name into a login suitable for a name lookup.
///
/// Lowercases, turns spaces into `_` and drops every character outside
/// `[a-z0-9_]`.
pub fn normalize_login(name: &str) -> String {
    name.chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}
