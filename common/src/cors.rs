//! Cross-origin allow-list resolution
//!
//! Both backend services answer probes from browser contexts, so every
//! response carries an `access-control-allow-origin` header. The policy is
//! deliberately permissive (this is a public probe endpoint, not a security
//! boundary): a wildcarded allow-list echoes whatever origin asked, a
//! non-wildcard list echoes listed origins and otherwise falls back to the
//! first configured entry.

/// Parsed comma-separated CORS allow-list.
#[derive(Debug, Clone)]
pub struct AllowList {
    origins: Vec<String>,
}

impl AllowList {
    /// Parse a comma-separated origin list. An empty or blank string
    /// yields the wildcard list.
    pub fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if origins.is_empty() {
            Self { origins: vec!["*".to_string()] }
        } else {
            Self { origins }
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.origins.iter().any(|o| o == "*")
    }

    /// Check membership of an exact origin string.
    pub fn contains(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == origin)
    }

    /// First configured entry, the fallback for unlisted requesters.
    pub fn first(&self) -> &str {
        &self.origins[0]
    }

    /// Resolve the `access-control-allow-origin` value for a request.
    ///
    /// Wildcard list: echo the requester's origin, or `*` when absent.
    /// Otherwise: echo a listed origin, or fall back to the first entry.
    pub fn resolve(&self, request_origin: Option<&str>) -> String {
        match request_origin {
            Some(origin) if self.is_wildcard() || self.contains(origin) => {
                origin.to_string()
            }
            None if self.is_wildcard() => "*".to_string(),
            _ => self.first().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_echoes_requester_origin() {
        let list = AllowList::parse("*");
        assert_eq!(list.resolve(Some("https://example.com")), "https://example.com");
        assert_eq!(list.resolve(None), "*");
    }

    #[test]
    fn listed_origin_is_echoed() {
        let list = AllowList::parse("https://a.example,https://b.example");
        assert_eq!(list.resolve(Some("https://b.example")), "https://b.example");
    }

    #[test]
    fn unlisted_origin_falls_back_to_first_entry() {
        let list = AllowList::parse("https://a.example,https://b.example");
        assert_eq!(list.resolve(Some("https://evil.example")), "https://a.example");
        assert_eq!(list.resolve(None), "https://a.example");
    }

    #[test]
    fn empty_list_defaults_to_wildcard() {
        let list = AllowList::parse("");
        assert!(list.is_wildcard());
        assert_eq!(list.resolve(None), "*");
    }

    #[test]
    fn whitespace_around_entries_is_trimmed() {
        let list = AllowList::parse(" https://a.example , https://b.example ");
        assert!(list.contains("https://a.example"));
        assert!(list.contains("https://b.example"));
    }
}
