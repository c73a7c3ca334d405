// # Traefik Router Source
//
// Implements `RouterSource` (§4.4) by polling Traefik's HTTP API for router rules
// and extracting hostnames from `Host(`...`)` / `HostRegexp(`...`)` terms.
//
// ## Endpoints
//
// - `GET /api/http/routers` (basic auth optional)
//
// Only the `rule`, `provider`, and `name` fields of each router entry are consumed.
// Routers whose `provider` is `internal` are skipped (these are Traefik's own
// dashboard/API/ping routers, never something an operator wants a DNS record for).

use async_trait::async_trait;
use dnscompanion_core::error::Result;
use dnscompanion_core::RouterSource;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

fn host_rule_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Host\(`([^`]+)`\)").expect("static regex is valid"))
}

fn host_regexp_rule_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"HostRegexp\(`([^`]+)`\)").expect("static regex is valid"))
}

/// A conservative strict-FQDN check: labels of alphanumerics/hyphens, no leading/trailing
/// hyphen, at least one dot, total length under 254. Rejects anything still carrying
/// regex/template syntax.
fn is_strict_fqdn(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.len() > 253 || !candidate.contains('.') {
        return false;
    }
    if candidate.contains(['{', '}', '(', ')', '^', '$', '*', '\\']) {
        return false;
    }
    candidate.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Strips the trailing regex anchors/classes Traefik's `HostRegexp` rule commonly carries
/// (`{.+}`, `{*}`, `^`, `$`), and unescapes `\.`, to recover a base-domain literal worth
/// checking against [`is_strict_fqdn`].
fn strip_regexp_decoration(raw: &str) -> String {
    let mut s = raw.trim_start_matches('^').trim_end_matches('$').to_string();
    while let Some(pos) = s.rfind('{') {
        if s[pos..].ends_with('}') {
            s.truncate(pos);
        } else {
            break;
        }
    }
    s.replace("\\.", ".")
}

/// Extracts the validated hostname set from a single router's `rule` string.
/// A rule may combine multiple terms with `,` or `||`.
fn extract_hostnames(rule: &str) -> Vec<String> {
    let mut out = Vec::new();

    for term in rule.split(|c| c == ',' || c == '|') {
        let term = term.trim();
        if term.is_empty() {
            continue;
        }

        if let Some(caps) = host_rule_re().captures(term) {
            let candidate = caps[1].trim().to_ascii_lowercase();
            if is_strict_fqdn(&candidate) {
                out.push(candidate);
            }
        }

        if let Some(caps) = host_regexp_rule_re().captures(term) {
            let candidate = strip_regexp_decoration(&caps[1]).to_ascii_lowercase();
            if is_strict_fqdn(&candidate) {
                out.push(candidate);
            }
        }
    }

    out
}

/// Polls Traefik's `/api/http/routers` endpoint on the configured interval (owned by
/// the `Scheduler`; this type only implements the single `poll()` call).
pub struct TraefikRouterSource {
    api_url: String,
    username: Option<String>,
    password: Option<String>,
    client: reqwest::Client,
}

impl TraefikRouterSource {
    pub fn new(api_url: String, username: Option<String>, password: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            username,
            password,
            client,
        }
    }
}

#[async_trait]
impl RouterSource for TraefikRouterSource {
    async fn poll(&self) -> Result<HashSet<String>> {
        let url = format!("{}/api/http/routers", self.api_url);
        let mut request = self.client.get(&url);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| dnscompanion_core::Error::transport(format!("traefik API request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(dnscompanion_core::Error::transport(format!(
                "traefik API returned {}",
                response.status()
            )));
        }

        let routers: Vec<RouterEntry> = response
            .json()
            .await
            .map_err(|e| dnscompanion_core::Error::Http(format!("failed to parse traefik routers: {e}")))?;

        let mut hostnames = HashSet::new();
        for router in routers {
            if router.provider.as_deref() == Some("internal") {
                continue;
            }
            let Some(rule) = &router.rule else { continue };
            for hostname in extract_hostnames(rule) {
                hostnames.insert(hostname);
            }
        }

        Ok(hostnames)
    }
}

#[derive(Debug, serde::Deserialize)]
struct RouterEntry {
    #[serde(default)]
    rule: Option<String>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_host_rule() {
        let hosts = extract_hostnames("Host(`a.example.com`)");
        assert_eq!(hosts, vec!["a.example.com"]);
    }

    #[test]
    fn extracts_multiple_hosts_joined_by_or() {
        let hosts = extract_hostnames("Host(`a.example.com`) || Host(`b.example.com`)");
        assert_eq!(hosts, vec!["a.example.com", "b.example.com"]);
    }

    #[test]
    fn discards_non_fqdn_host_literal() {
        assert!(extract_hostnames("Host(`localhost`)").is_empty());
    }

    #[test]
    fn host_regexp_strips_trailing_regex_class() {
        let hosts = extract_hostnames(r"HostRegexp(`a\.example\.com{.+}`)");
        assert_eq!(hosts, vec!["a.example.com"]);
    }

    #[test]
    fn host_regexp_discards_unresolvable_pattern() {
        assert!(extract_hostnames(r"HostRegexp(`^.*$`)").is_empty());
    }

    #[test]
    fn strict_fqdn_rejects_template_syntax() {
        assert!(!is_strict_fqdn("{subdomain:.+}.example.com"));
    }
}
