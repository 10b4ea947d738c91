use std::sync::OnceLock;

static HOLDER_PREFIX: OnceLock<String> = OnceLock::new();

/// Host identity prepended to lock holder tokens.
///
/// Falls back to a random id when the hostname is unavailable or not valid UTF-8.
pub fn holder_prefix() -> &'static str {
    HOLDER_PREFIX.get_or_init(|| {
        if let Ok(hostname) = hostname::get()
            && let Some(name) = hostname.to_str()
            && !name.is_empty()
        {
            return name.to_string();
        }
        uuid::Uuid::new_v4().to_string()
    })
}
