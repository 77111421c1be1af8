//! Capability table: which domain/service pairs may be dispatched
//!
//! Two sets live here. The known-domain set is a syntactic pre-filter used by
//! the extractor; the capability table is the single authority on whether a
//! directive may reach the automation backend. Both are built once and shared
//! read-only behind an `Arc`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Built-in allow-list of services per domain
const BUILTIN_SERVICES: &[(&str, &[&str])] = &[
    ("light", &["turn_on", "turn_off", "toggle"]),
    ("switch", &["turn_on", "turn_off", "toggle"]),
    ("automation", &["trigger"]),
    ("button", &["press"]),
    ("scene", &["turn_on"]),
    ("script", &["turn_on", "turn_off", "toggle"]),
    ("lock", &["lock", "unlock"]),
    (
        "cover",
        &["open_cover", "close_cover", "stop_cover", "toggle"],
    ),
    ("fan", &["turn_on", "turn_off", "toggle", "set_percentage"]),
    (
        "climate",
        &["set_temperature", "set_hvac_mode", "turn_on", "turn_off"],
    ),
    (
        "media_player",
        &[
            "turn_on",
            "turn_off",
            "media_play",
            "media_pause",
            "media_stop",
            "volume_set",
            "volume_up",
            "volume_down",
        ],
    ),
    ("input_boolean", &["turn_on", "turn_off", "toggle"]),
    ("shopping_list", &["add_item", "remove_item", "complete_item"]),
    ("todo", &["add_item", "remove_item", "update_item"]),
];

/// Domains the model may mention that have no dispatchable services
const BUILTIN_RECOGNIZED_ONLY: &[&str] = &[
    "sensor",
    "binary_sensor",
    "weather",
    "person",
    "vacuum",
    "alarm_control_panel",
];

/// Immutable capability configuration shared by the extractor and dispatcher
#[derive(Debug, Clone)]
pub struct Capabilities {
    /// Allowed services per domain
    services: HashMap<String, BTreeSet<String>>,
    /// Domains the extractor will accept
    known_domains: BTreeSet<String>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Capabilities {
    /// Build the compiled-in table
    #[must_use]
    pub fn builtin() -> Self {
        let services: HashMap<String, BTreeSet<String>> = BUILTIN_SERVICES
            .iter()
            .map(|(domain, services)| {
                (
                    (*domain).to_string(),
                    services.iter().map(|s| (*s).to_string()).collect(),
                )
            })
            .collect();

        let known_domains = services
            .keys()
            .cloned()
            .chain(BUILTIN_RECOGNIZED_ONLY.iter().map(|d| (*d).to_string()))
            .collect();

        Self {
            services,
            known_domains,
        }
    }

    /// Extend the built-in table with extra services and recognized domains
    ///
    /// Names are lowercased. A domain gaining services also becomes known.
    #[must_use]
    pub fn with_overlay<'a>(
        mut self,
        extra_services: impl IntoIterator<Item = (&'a str, &'a [String])>,
        extra_domains: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        for (domain, services) in extra_services {
            let domain = domain.trim().to_lowercase();
            if domain.is_empty() {
                continue;
            }
            let entry = self.services.entry(domain.clone()).or_default();
            entry.extend(
                services
                    .iter()
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty()),
            );
            self.known_domains.insert(domain);
        }

        for domain in extra_domains {
            let domain = domain.trim().to_lowercase();
            if !domain.is_empty() {
                self.known_domains.insert(domain);
            }
        }

        self
    }

    /// Whether the extractor should accept directives for this domain
    #[must_use]
    pub fn is_known_domain(&self, domain: &str) -> bool {
        self.known_domains.contains(domain)
    }

    /// Check a domain/service pair against the allow-list
    ///
    /// Case-sensitive; callers pass already-lowercased names.
    #[must_use]
    pub fn is_allowed(&self, domain: &str, service: &str) -> bool {
        self.services
            .get(domain)
            .is_some_and(|allowed| allowed.contains(service))
    }

    /// Known domains in sorted order
    pub fn known_domains(&self) -> impl Iterator<Item = &str> {
        self.known_domains.iter().map(String::as_str)
    }

    /// Sorted view of the allow-list
    #[must_use]
    pub fn table(&self) -> BTreeMap<&str, Vec<&str>> {
        self.services
            .iter()
            .map(|(domain, services)| {
                (
                    domain.as_str(),
                    services.iter().map(String::as_str).collect(),
                )
            })
            .collect()
    }
}
