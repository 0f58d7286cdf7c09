//! URL recognition and host-based match rules.
//!
//! Hosts are extracted with the RFC 3986 Appendix B regex (scheme optional;
//! a default `http://` is prepended before parsing). [`UrlMatcher`] applies
//! the blacklist/whitelist rule: a URL is actionable only when the blacklist
//! is empty or contains its host, and the whitelist does not.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

fn authority_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // RFC 3986 Appendix B; group 2 is the authority.
        Regex::new(
            r"(?x)
            ^(?:([A-Za-z][A-Za-z0-9+.-]*):)?  # scheme
            (?://([^/?\#]*))?                 # authority
            ([^?\#]*)                         # path
            (?:\?([^\#]*))?                   # query
            (?:\#(.*))?                       # fragment
            ",
        )
        .expect("authority regex is valid")
    })
}

fn linkish_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?ix)
            \b(
                https?://[^\s<>()]+
              | www\.[^\s<>()]+
              | [a-z0-9][a-z0-9-]*(?:\.[a-z0-9-]+)*\.[a-z]{2,}(?:/[^\s<>()]*)?
            )",
        )
        .expect("link regex is valid")
    })
}

fn mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@[A-Za-z0-9_]+").expect("mention regex is valid"))
}

/// A URL-like or mention substring found in plain text, addressed by byte
/// range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMatch {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Finds URL-like substrings in plain text, including bare domains without a
/// scheme. Trailing sentence punctuation is not considered part of a match.
pub fn scan_linkish(text: &str) -> Vec<LinkMatch> {
    linkish_regex()
        .find_iter(text)
        .filter_map(|found| {
            let trimmed = found.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', '\'']);
            if trimmed.is_empty() {
                return None;
            }
            Some(LinkMatch {
                start: found.start(),
                end: found.start() + trimmed.len(),
                text: trimmed.to_string(),
            })
        })
        .collect()
}

/// Finds `@handle` mentions written out in plain text.
pub fn scan_mentions(text: &str) -> Vec<LinkMatch> {
    mention_regex()
        .find_iter(text)
        .map(|found| LinkMatch {
            start: found.start(),
            end: found.end(),
            text: found.as_str().to_string(),
        })
        .collect()
}

/// Blacklist/whitelist host rule for URL redaction and gating.
#[derive(Debug, Clone, Default)]
pub struct UrlMatcher {
    blacklist: BTreeSet<String>,
    whitelist: BTreeSet<String>,
}

impl UrlMatcher {
    pub fn new<I, J>(blacklist: I, whitelist: J) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        Self {
            blacklist: blacklist.into_iter().map(|h| h.to_ascii_lowercase()).collect(),
            whitelist: whitelist.into_iter().map(|h| h.to_ascii_lowercase()).collect(),
        }
    }

    /// True when `url` should be acted on: its host is resolvable, the
    /// blacklist (when non-empty) contains it, and the whitelist does not.
    pub fn matches(&self, url: &str) -> bool {
        let Some(host) = extract_host(url) else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        if !self.blacklist.is_empty() && !self.blacklist.contains(&host) {
            return false;
        }
        !self.whitelist.contains(&host)
    }
}

/// Host of `url`, with any userinfo and numeric port stripped. A scheme-less
/// input is parsed as if `http://` were prepended.
pub fn extract_host(url: &str) -> Option<String> {
    let with_scheme;
    let candidate = if url.contains("://") {
        url
    } else {
        with_scheme = format!("http://{url}");
        &with_scheme
    };

    let captures = authority_regex().captures(candidate)?;
    let authority = captures.get(2)?.as_str();
    if authority.is_empty() {
        return None;
    }

    let hostinfo = authority.rsplit_once('@').map_or(authority, |(_, rest)| rest);
    if hostinfo.is_empty() || hostinfo.chars().any(char::is_whitespace) {
        return None;
    }
    match hostinfo.rsplit_once(':') {
        // A non-numeric "port" means the colon was part of the host info.
        Some((host, port)) if port.chars().all(|ch| ch.is_ascii_digit()) && !host.is_empty() => {
            Some(host.to_string())
        }
        _ => Some(hostinfo.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_extract_host_strips_scheme_port_and_userinfo() {
        assert_eq!(extract_host("https://user@x.test:8080/path"), Some("x.test".to_string()));
        assert_eq!(extract_host("x.test/path"), Some("x.test".to_string()));
        assert_eq!(extract_host("no spaces here"), None);
    }

    #[test]
    fn unit_matcher_without_lists_matches_every_host() {
        let matcher = UrlMatcher::default();
        assert!(matcher.matches("https://a.test/x"));
        assert!(matcher.matches("b.test"));
    }

    #[test]
    fn unit_matcher_blacklist_restricts_matches_to_listed_hosts() {
        let matcher = UrlMatcher::new(vec!["bad.test".to_string()], Vec::new());
        assert!(matcher.matches("https://bad.test/promo"));
        assert!(!matcher.matches("https://fine.test/"));
    }

    #[test]
    fn unit_matcher_whitelist_exempts_listed_hosts() {
        let matcher = UrlMatcher::new(Vec::new(), vec!["ours.test".to_string()]);
        assert!(!matcher.matches("https://ours.test/post/1"));
        assert!(matcher.matches("https://other.test/"));
    }

    #[test]
    fn functional_scan_linkish_finds_schemed_and_bare_urls() {
        let matches = scan_linkish("see https://a.test/x and b.test/y now");
        let texts: Vec<&str> = matches.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["https://a.test/x", "b.test/y"]);
    }

    #[test]
    fn functional_scan_linkish_trims_trailing_punctuation() {
        let matches = scan_linkish("go to www.site.test.");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].text, "www.site.test");
        assert_eq!(&"go to www.site.test."[matches[0].start..matches[0].end], "www.site.test");
    }

    #[test]
    fn functional_scan_mentions_finds_handles() {
        let matches = scan_mentions("ping @alice and @bob_99");
        let texts: Vec<&str> = matches.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["@alice", "@bob_99"]);
    }

    #[test]
    fn regression_plain_words_are_not_links() {
        assert!(scan_linkish("just words, nothing else").is_empty());
    }
}
