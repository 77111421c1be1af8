//! Directives embedded in model output
//!
//! A directive is one action request ("turn on the kitchen light") that the
//! model writes inline in bracketed syntax. This module holds the canonical
//! record, the parameter coercion rules, the recognizer grammars and the
//! extractor that ties them together.

mod extractor;
mod grammar;
mod params;

pub use extractor::DirectiveExtractor;
pub use grammar::{Grammar, GrammarMatch};
pub use params::{ParamValue, parse_params};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::{Error, Result};

/// Shape of an entity identifier: `segment.segment`
static TARGET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+\.[a-z0-9_]+$").expect("valid regex"));

/// Check whether a string is a well-formed entity identifier
#[must_use]
pub fn is_valid_target(candidate: &str) -> bool {
    TARGET_REGEX.is_match(candidate)
}

/// One action to perform against the automation backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Directive {
    /// Lowercase domain, e.g. `light`
    pub domain: String,
    /// Lowercase service, e.g. `turn_on`
    pub service: String,
    /// Entity the service acts on, absent for targetless services
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Extra service data
    pub parameters: BTreeMap<String, ParamValue>,
}

impl Directive {
    /// Build a directive, normalizing names to lowercase
    ///
    /// # Errors
    ///
    /// Returns error if domain or service is empty, or if the target is not
    /// shaped like `segment.segment`
    pub fn new(
        domain: &str,
        service: &str,
        target: Option<&str>,
        parameters: BTreeMap<String, ParamValue>,
    ) -> Result<Self> {
        let domain = domain.trim().to_lowercase();
        let service = service.trim().to_lowercase();

        if domain.is_empty() || service.is_empty() {
            return Err(Error::Directive(
                "domain and service must be non-empty".to_string(),
            ));
        }

        let target = match target.map(|t| t.trim().to_lowercase()) {
            Some(t) if !is_valid_target(&t) => {
                return Err(Error::Directive(format!("invalid entity id: {t}")));
            }
            other => other,
        };

        Ok(Self {
            domain,
            service,
            target,
            parameters,
        })
    }

    /// Parse a `domain.service` pair
    ///
    /// # Errors
    ///
    /// Returns error if the string is not exactly two dot-separated names
    pub fn split_service(full: &str) -> Result<(&str, &str)> {
        match full.split_once('.') {
            Some((domain, service))
                if !domain.is_empty() && !service.is_empty() && !service.contains('.') =>
            {
                Ok((domain, service))
            }
            _ => Err(Error::Directive(format!("invalid service format: {full}"))),
        }
    }

    /// Key used to collapse directives matched by several grammars
    #[must_use]
    pub fn dedup_key(&self) -> DedupKey {
        let discriminator = self.target.clone().unwrap_or_else(|| {
            self.parameters
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("|")
        });

        DedupKey {
            domain: self.domain.to_lowercase(),
            service: self.service.to_lowercase(),
            discriminator: discriminator.to_lowercase(),
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.service)?;
        if let Some(target) = &self.target {
            write!(f, " -> {target}")?;
        }
        Ok(())
    }
}

/// Identity of a directive for deduplication
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    domain: String,
    service: String,
    /// Target, or a sorted parameter fingerprint when there is none
    discriminator: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_lowercases_names() {
        let d = Directive::new("Light", "TURN_ON", Some("Light.Kitchen"), BTreeMap::new())
            .unwrap();
        assert_eq!(d.domain, "light");
        assert_eq!(d.service, "turn_on");
        assert_eq!(d.target.as_deref(), Some("light.kitchen"));
    }

    #[test]
    fn test_new_rejects_bad_input() {
        assert!(Directive::new("", "turn_on", None, BTreeMap::new()).is_err());
        assert!(Directive::new("light", " ", None, BTreeMap::new()).is_err());
        assert!(Directive::new("light", "turn_on", Some("kitchen"), BTreeMap::new()).is_err());
        assert!(
            Directive::new("light", "turn_on", Some("light.a.b"), BTreeMap::new()).is_err()
        );
    }

    #[test]
    fn test_split_service() {
        assert_eq!(
            Directive::split_service("light.turn_on").unwrap(),
            ("light", "turn_on")
        );
        assert!(Directive::split_service("light").is_err());
        assert!(Directive::split_service("light.turn.on").is_err());
        assert!(Directive::split_service(".turn_on").is_err());
    }

    #[test]
    fn test_dedup_key_uses_target() {
        let a = Directive::new("light", "turn_on", Some("light.a"), parse_params("brightness=5"))
            .unwrap();
        let b = Directive::new("LIGHT", "turn_on", Some("light.A"), BTreeMap::new()).unwrap();
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_dedup_key_falls_back_to_parameters() {
        let milk = Directive::new("shopping_list", "add_item", None, parse_params("name=milk"))
            .unwrap();
        let eggs = Directive::new("shopping_list", "add_item", None, parse_params("name=eggs"))
            .unwrap();
        let milk_again =
            Directive::new("shopping_list", "add_item", None, parse_params("name=Milk")).unwrap();

        assert_ne!(milk.dedup_key(), eggs.dedup_key());
        assert_eq!(milk.dedup_key(), milk_again.dedup_key());
    }

    #[test]
    fn test_display() {
        let d = Directive::new("light", "turn_on", Some("light.kitchen"), BTreeMap::new())
            .unwrap();
        assert_eq!(d.to_string(), "light.turn_on -> light.kitchen");
    }
}
