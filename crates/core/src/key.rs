//! Request-derived cache key generation.

/// Build a cache key from the full identity of a request.
///
/// Format is `namespace:METHOD path?query`, with the query pairs sorted so
/// `?a=1&b=2` and `?b=2&a=1` share an entry. An empty namespace or query is
/// omitted.
pub fn request_key(namespace: &str, method: &str, path: &str, query: &str) -> String {
    let mut pairs: Vec<&str> = query.trim_start_matches('?').split('&').filter(|p| !p.is_empty()).collect();
    pairs.sort_unstable();

    let mut key = String::with_capacity(namespace.len() + method.len() + path.len() + query.len() + 3);
    if !namespace.is_empty() {
        key.push_str(namespace);
        key.push(':');
    }
    key.push_str(&method.to_ascii_uppercase());
    key.push(' ');
    key.push_str(path);
    if !pairs.is_empty() {
        key.push('?');
        key.push_str(&pairs.join("&"));
    }
    key
}

/// Glob matching every key under `namespace`.
pub fn namespace_pattern(namespace: &str) -> String {
    format!("{namespace}:*")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_stability() {
        let key1 = request_key("matches", "GET", "/matches/upcoming", "league=lec&limit=10");
        let key2 = request_key("matches", "GET", "/matches/upcoming", "league=lec&limit=10");
        assert_eq!(key1, key2);
        assert_eq!(key1, "matches:GET /matches/upcoming?league=lec&limit=10");
    }

    #[test]
    fn test_query_order_does_not_matter() {
        let key1 = request_key("posts", "GET", "/posts", "?page=2&tag=lol");
        let key2 = request_key("posts", "get", "/posts", "tag=lol&page=2");
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_different_query_values() {
        let key1 = request_key("posts", "GET", "/posts", "page=1");
        let key2 = request_key("posts", "GET", "/posts", "page=2");
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_key_without_query_or_namespace() {
        assert_eq!(request_key("", "GET", "/teams", ""), "GET /teams");
        assert_eq!(request_key("teams", "GET", "/teams", "?"), "teams:GET /teams");
    }

    #[test]
    fn test_namespace_pattern_matches_keys() {
        let pattern = namespace_pattern("posts");
        assert_eq!(pattern, "posts:*");
        assert!(request_key("posts", "GET", "/posts", "").starts_with(pattern.trim_end_matches('*')));
    }
}
