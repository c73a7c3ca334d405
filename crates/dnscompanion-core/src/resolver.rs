//! Hostname resolver (§4.5).
//!
//! Merges router-discovered hostnames, container-label hostnames, and operator-declared
//! managed hostnames into the desired-record set the `Reconciler` will act on.

use crate::config::ResolverDefaults;
use crate::model::{DesiredRecord, DesiredSource, ManagedHostname, RecordExtras, RecordType};
use crate::traits::public_ip::PublicIpSource;
use std::collections::{HashMap, HashSet};

/// Stateless merge step; holds only the defaults it needs to apply.
pub struct HostnameResolver {
    defaults: ResolverDefaults,
    /// Target hostname CNAMEs resolve to when no explicit content is given.
    default_cname_target: Option<String>,
}

impl HostnameResolver {
    pub fn new(defaults: ResolverDefaults, default_cname_target: Option<String>) -> Self {
        Self {
            defaults,
            default_cname_target,
        }
    }

    /// Builds the desired-record set.
    ///
    /// `router_hostnames` — from `RouterSource::poll` (traefik mode only; empty in direct mode).
    /// `label_hostnames` — from `ContainerSource::labels_by_hostname`.
    /// `managed` — operator-declared hostnames that must always exist.
    ///
    /// Deduplication: a `(type, name)` key appearing more than once keeps the first
    /// occurrence; later ones are dropped with a warning. Managed hostnames are the
    /// exception — their precedence against labels is resolved by merging rather than
    /// by dedup (see `build_managed_record`), so a hostname is routed to exactly one
    /// builder even when it appears in both `managed` and `label_hostnames`.
    pub fn resolve(
        &self,
        router_hostnames: &HashSet<String>,
        label_hostnames: &HashMap<String, HashMap<String, String>>,
        managed: &[ManagedHostname],
        public_ip: &dyn PublicIpSource,
    ) -> Vec<DesiredRecord> {
        let mut seen: HashSet<(RecordType, String)> = HashSet::new();
        let mut out = Vec::new();
        let managed_names: HashSet<&str> = managed.iter().map(|m| m.name.as_str()).collect();

        for hostname in router_hostnames {
            if managed_names.contains(hostname.as_str()) {
                continue;
            }
            let labels = label_hostnames.get(hostname).cloned().unwrap_or_default();
            if let Some(record) = self.build_record(hostname, &labels, DesiredSource::Traefik, public_ip) {
                self.push_dedup(&mut out, &mut seen, record);
            }
        }

        for (hostname, labels) in label_hostnames {
            if router_hostnames.contains(hostname) || managed_names.contains(hostname.as_str()) {
                continue;
            }
            if let Some(record) = self.build_record(hostname, labels, DesiredSource::Direct, public_ip) {
                self.push_dedup(&mut out, &mut seen, record);
            }
        }

        for m in managed {
            let labels = label_hostnames.get(&m.name);
            let record = self.build_managed_record(m, labels, public_ip);
            self.push_dedup(&mut out, &mut seen, record);
        }

        out
    }

    /// Merges global defaults, a managed hostname's explicit fields, and (if the
    /// hostname also belongs to a container) that container's labels, in ascending
    /// precedence (§4.5): defaults → managed fields → labels.
    fn build_managed_record(
        &self,
        m: &ManagedHostname,
        labels: Option<&HashMap<String, String>>,
        public_ip: &dyn PublicIpSource,
    ) -> DesiredRecord {
        let empty = HashMap::new();
        let labels = labels.unwrap_or(&empty);
        let prefix = format!("{}.{}.", self.defaults.dns_label_prefix, m.name);

        let record_type = labels
            .get(&format!("{prefix}type"))
            .and_then(|v| parse_record_type(v))
            .unwrap_or(m.record_type);

        let ttl = labels
            .get(&format!("{prefix}ttl"))
            .and_then(|v| v.parse().ok())
            .or(m.ttl)
            .unwrap_or(self.defaults.ttl);

        let proxied = labels.get(&format!("{prefix}proxied")).and_then(|v| v.parse().ok());

        let label_content = labels.get(&format!("{prefix}content")).cloned();

        let (content, needs_v4, needs_v6) = match label_content {
            Some(c) => (c, false, false),
            None if record_type == m.record_type => (m.content.clone(), false, false),
            None => match record_type {
                RecordType::A => match public_ip.current_v4() {
                    Some(ip) => (ip.to_string(), false, false),
                    None => (String::new(), true, false),
                },
                RecordType::Aaaa => match public_ip.current_v6() {
                    Some(ip) => (ip.to_string(), false, false),
                    None => (String::new(), false, true),
                },
                RecordType::Cname => (self.default_cname_target.clone().unwrap_or_default(), false, false),
                _ => (m.content.clone(), false, false),
            },
        };

        DesiredRecord {
            provider_id: String::new(),
            record_type,
            name: m.name.clone(),
            content,
            ttl,
            extras: m.extras.clone(),
            proxied,
            source: DesiredSource::Managed,
            needs_public_ipv4: needs_v4,
            needs_public_ipv6: needs_v6,
        }
    }

    fn push_dedup(
        &self,
        out: &mut Vec<DesiredRecord>,
        seen: &mut HashSet<(RecordType, String)>,
        record: DesiredRecord,
    ) {
        let key = record.key();
        if !seen.insert(key.clone()) {
            tracing::warn!(record_type = %key.0, name = %key.1, "duplicate (type, name) in desired set; keeping first occurrence");
            return;
        }
        out.push(record);
    }

    fn build_record(
        &self,
        hostname: &str,
        labels: &HashMap<String, String>,
        source: DesiredSource,
        public_ip: &dyn PublicIpSource,
    ) -> Option<DesiredRecord> {
        let prefix = format!("{}.{}.", self.defaults.dns_label_prefix, hostname);

        if labels
            .get(&format!("{prefix}manage"))
            .is_some_and(|v| v == "false")
        {
            return None;
        }

        let record_type = labels
            .get(&format!("{prefix}type"))
            .and_then(|v| parse_record_type(v))
            .unwrap_or(self.defaults.record_type);

        let ttl = labels
            .get(&format!("{prefix}ttl"))
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.defaults.ttl);

        let proxied = labels
            .get(&format!("{prefix}proxied"))
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.defaults.proxied);

        let explicit_content = labels.get(&format!("{prefix}content")).cloned();

        let (content, needs_v4, needs_v6) = match (&explicit_content, record_type) {
            (Some(c), _) => (c.clone(), false, false),
            (None, RecordType::A) => match public_ip.current_v4() {
                Some(ip) => (ip.to_string(), false, false),
                None => (String::new(), true, false),
            },
            (None, RecordType::Aaaa) => match public_ip.current_v6() {
                Some(ip) => (ip.to_string(), false, false),
                None => (String::new(), false, true),
            },
            (None, RecordType::Cname) => (
                self.default_cname_target.clone().unwrap_or_default(),
                false,
                false,
            ),
            (None, _) => {
                tracing::warn!(%hostname, %record_type, "no explicit content given and no inference rule for this record type");
                return None;
            }
        };

        Some(DesiredRecord {
            provider_id: String::new(),
            record_type,
            name: hostname.to_string(),
            content,
            ttl,
            extras: RecordExtras::default(),
            proxied: Some(proxied),
            source,
            needs_public_ipv4: needs_v4,
            needs_public_ipv6: needs_v6,
        })
    }
}

fn parse_record_type(v: &str) -> Option<RecordType> {
    match v.to_ascii_uppercase().as_str() {
        "A" => Some(RecordType::A),
        "AAAA" => Some(RecordType::Aaaa),
        "CNAME" => Some(RecordType::Cname),
        "MX" => Some(RecordType::Mx),
        "TXT" => Some(RecordType::Txt),
        "SRV" => Some(RecordType::Srv),
        "CAA" => Some(RecordType::Caa),
        "NS" => Some(RecordType::Ns),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    struct FixedIp(Option<IpAddr>);
    impl PublicIpSource for FixedIp {
        fn current_v4(&self) -> Option<IpAddr> {
            self.0
        }
        fn current_v6(&self) -> Option<IpAddr> {
            None
        }
    }

    #[test]
    fn infers_a_record_content_from_public_ip() {
        let resolver = HostnameResolver::new(ResolverDefaults::default(), None);
        let ip = FixedIp(Some(IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9))));
        let mut hostnames = HashSet::new();
        hostnames.insert("a.example.com".to_string());
        let out = resolver.resolve(&hostnames, &HashMap::new(), &[], &ip);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "9.9.9.9");
        assert!(!out[0].needs_public_ipv4);
    }

    #[test]
    fn pending_lookup_flag_set_when_ip_unknown() {
        let resolver = HostnameResolver::new(ResolverDefaults::default(), None);
        let ip = FixedIp(None);
        let mut hostnames = HashSet::new();
        hostnames.insert("a.example.com".to_string());
        let out = resolver.resolve(&hostnames, &HashMap::new(), &[], &ip);
        assert!(out[0].needs_public_ipv4);
    }

    #[test]
    fn manage_false_label_opts_out() {
        let resolver = HostnameResolver::new(ResolverDefaults::default(), None);
        let ip = FixedIp(Some(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))));
        let mut labels = HashMap::new();
        labels.insert("dns.a.example.com.manage".to_string(), "false".to_string());
        let mut label_hostnames = HashMap::new();
        label_hostnames.insert("a.example.com".to_string(), labels);
        let out = resolver.resolve(&HashSet::new(), &label_hostnames, &[], &ip);
        assert!(out.is_empty());
    }

    #[test]
    fn duplicate_type_name_keeps_first() {
        let resolver = HostnameResolver::new(ResolverDefaults::default(), None);
        let ip = FixedIp(Some(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))));
        let mut hostnames = HashSet::new();
        hostnames.insert("a.example.com".to_string());
        let managed = vec![ManagedHostname {
            name: "a.example.com".to_string(),
            record_type: RecordType::A,
            content: "2.2.2.2".to_string(),
            ttl: None,
            extras: RecordExtras::default(),
        }];
        let out = resolver.resolve(&hostnames, &HashMap::new(), &managed, &ip);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "1.1.1.1");
    }

    #[test]
    fn managed_hostname_ttl_survives_when_no_label_overrides_it() {
        let resolver = HostnameResolver::new(ResolverDefaults::default(), None);
        let ip = FixedIp(None);
        let mut labels = HashMap::new();
        labels.insert("dns.a.example.com.proxied".to_string(), "true".to_string());
        let mut label_hostnames = HashMap::new();
        label_hostnames.insert("a.example.com".to_string(), labels);

        let managed = vec![ManagedHostname {
            name: "a.example.com".to_string(),
            record_type: RecordType::A,
            content: "2.2.2.2".to_string(),
            ttl: Some(60),
            extras: RecordExtras::default(),
        }];

        let out = resolver.resolve(&HashSet::new(), &label_hostnames, &managed, &ip);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].ttl, 60, "managed hostname's explicit ttl must survive the merge");
        assert_eq!(out[0].content, "2.2.2.2");
        assert_eq!(out[0].proxied, Some(true), "label override must layer on top");
    }

    #[test]
    fn label_content_override_takes_precedence_over_managed_content() {
        let resolver = HostnameResolver::new(ResolverDefaults::default(), None);
        let ip = FixedIp(None);
        let mut labels = HashMap::new();
        labels.insert("dns.a.example.com.content".to_string(), "9.9.9.9".to_string());
        let mut label_hostnames = HashMap::new();
        label_hostnames.insert("a.example.com".to_string(), labels);

        let managed = vec![ManagedHostname {
            name: "a.example.com".to_string(),
            record_type: RecordType::A,
            content: "2.2.2.2".to_string(),
            ttl: None,
            extras: RecordExtras::default(),
        }];

        let out = resolver.resolve(&HashSet::new(), &label_hostnames, &managed, &ip);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "9.9.9.9");
    }
}
