/// Get environment variable with GATEHOUSE_ prefix, falling back to unprefixed version
///
/// Checks `GATEHOUSE_{key}` first, then `{key}`.
///
/// # Examples
///
/// ```rust
/// use gatehouse::utils::get_env_with_prefix;
///
/// // Checks GATEHOUSE_AUTO_WATCH_NEW_REPOS first, then AUTO_WATCH_NEW_REPOS
/// let auto_watch = get_env_with_prefix("AUTO_WATCH_NEW_REPOS");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("GATEHOUSE_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Parse an environment value as a boolean, accepting `1`/`0` and `yes`/`no`.
pub fn parse_env_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
