use rustc_hash::FxHashMap;

/// Search-engine hosts mapped to their enforced-safe variants. The answer
/// for the original name is substituted with the safe host's addresses; the
/// query itself is never rewritten.
pub struct SafeSearch {
    map: FxHashMap<&'static str, &'static str>,
}

/// (engine host, safe host). Subdomain `www.` variants are listed
/// explicitly where the engines distinguish them.
static SAFE_HOSTS: &[(&str, &str)] = &[
    ("www.google.com", "forcesafesearch.google.com"),
    ("google.com", "forcesafesearch.google.com"),
    ("www.bing.com", "strict.bing.com"),
    ("bing.com", "strict.bing.com"),
    ("duckduckgo.com", "safe.duckduckgo.com"),
    ("www.duckduckgo.com", "safe.duckduckgo.com"),
    ("www.youtube.com", "restrictmoderate.youtube.com"),
    ("youtube.com", "restrictmoderate.youtube.com"),
    ("m.youtube.com", "restrictmoderate.youtube.com"),
    ("youtubei.googleapis.com", "restrictmoderate.youtube.com"),
    ("yandex.ru", "familysearch.yandex.ru"),
    ("yandex.com", "familysearch.yandex.ru"),
    ("pixabay.com", "safesearch.pixabay.com"),
];

impl SafeSearch {
    pub fn build() -> Self {
        Self {
            map: SAFE_HOSTS.iter().copied().collect(),
        }
    }

    /// The safe host whose addresses should replace the answer, if any.
    pub fn safe_host(&self, name: &str) -> Option<&'static str> {
        self.map.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_google_maps_to_forcesafesearch() {
        let s = SafeSearch::build();
        assert_eq!(
            s.safe_host("www.google.com"),
            Some("forcesafesearch.google.com")
        );
    }

    #[test]
    fn test_unlisted_host_passes() {
        let s = SafeSearch::build();
        assert!(s.safe_host("www.example.com").is_none());
    }
}
