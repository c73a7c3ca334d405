//! Provider router (§4.6).
//!
//! Chooses which configured provider owns a given hostname by longest-zone-suffix match,
//! with a default-provider fallback. This is a distinct concept from a plugin/factory
//! registry that instantiates provider implementations — this component only does
//! hostname-to-provider routing.

use crate::model::{normalize_name, ProviderRegistration};

/// Routes hostnames to the provider registration whose zone is the longest matching suffix.
pub struct ProviderRouter {
    /// Kept in registration (insertion) order so suffix-length ties break deterministically.
    registrations: Vec<ProviderRegistration>,
}

impl ProviderRouter {
    pub fn new(registrations: Vec<ProviderRegistration>) -> Self {
        Self { registrations }
    }

    /// Returns the registration that should own `hostname`, or `None` if there are no
    /// providers configured at all (scenario S1).
    pub fn route(&self, hostname: &str) -> Option<&ProviderRegistration> {
        let hostname = normalize_name(hostname);
        let mut best: Option<&ProviderRegistration> = None;

        for reg in &self.registrations {
            let zone = normalize_name(&reg.zone);
            let is_suffix = hostname == zone || hostname.ends_with(&format!(".{zone}"));
            if !is_suffix {
                continue;
            }
            match best {
                None => best = Some(reg),
                Some(current) if zone.len() > normalize_name(&current.zone).len() => {
                    best = Some(reg);
                }
                _ => {}
            }
        }

        best.or_else(|| self.registrations.iter().find(|r| r.default))
    }
}
