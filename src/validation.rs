use lazy_regex::regex_is_match;

/// Course key components (org, course number, and run) are non-empty and
/// limited to letters, digits, underscores, dots, and dashes.
pub fn key_component(component: &str) -> bool {
    regex_is_match!(r"^[A-Za-z0-9_.\-]+$", component)
}

/// Role names arriving over the API are lowercase snake case.
pub fn role_name(name: &str) -> bool {
    name.len() < 64 && regex_is_match!(r"^[a-z][a-z_]*$", name)
}
