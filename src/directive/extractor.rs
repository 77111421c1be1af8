//! Directive extraction from complete model output

use std::collections::{BTreeMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

use super::grammar::{Grammar, GrammarMatch};
use super::params::{ParamValue, parse_params};
use super::{Directive, is_valid_target};
use crate::capabilities::Capabilities;

/// Parameter name that doubles as the target marker
const TARGET_KEY: &str = "entity_id";

/// Runs every grammar over a text buffer and collects unique directives
#[derive(Debug, Clone)]
pub struct DirectiveExtractor {
    capabilities: Arc<Capabilities>,
}

impl DirectiveExtractor {
    /// Create an extractor filtering on the given known-domain set
    #[must_use]
    pub const fn new(capabilities: Arc<Capabilities>) -> Self {
        Self { capabilities }
    }

    /// Extract directives from a complete text
    ///
    /// Grammars run in priority order; within a grammar, matches are taken in
    /// text order. A directive is kept only on its first appearance and only
    /// if its domain is known. Text already claimed by a stricter grammar is
    /// not read again by a looser one.
    #[must_use]
    pub fn extract(&self, text: &str) -> Vec<Directive> {
        let mut seen = HashSet::new();
        let mut claimed: Vec<Range<usize>> = Vec::new();
        let mut directives = Vec::new();

        for grammar in Grammar::PRIORITY {
            for found in grammar.find_iter(text) {
                if claimed.iter().any(|span| overlaps(span, &found.span)) {
                    tracing::trace!(?grammar, span = ?found.span, "span already claimed");
                    continue;
                }

                let Some(directive) = normalize(&found) else {
                    continue;
                };

                if !self.capabilities.is_known_domain(&directive.domain) {
                    tracing::debug!(
                        domain = %directive.domain,
                        service = %directive.service,
                        ?grammar,
                        "dropping directive for unknown domain"
                    );
                    continue;
                }

                claimed.push(found.span.clone());
                if seen.insert(directive.dedup_key()) {
                    tracing::trace!(%directive, ?grammar, "extracted directive");
                    directives.push(directive);
                }
            }
        }

        directives
    }
}

const fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Turn raw captures into a canonical directive
fn normalize(found: &GrammarMatch<'_>) -> Option<Directive> {
    let mut parameters = BTreeMap::new();
    for segment in &found.params {
        parameters.extend(parse_params(segment));
    }

    // A targetless match may still carry its target as a parameter
    let promoted = match found.target {
        Some(_) => None,
        None => promote_target(&mut parameters),
    };
    let target = found.target.map(str::to_lowercase).or(promoted);

    match Directive::new(found.domain, found.service, target.as_deref(), parameters) {
        Ok(directive) => Some(directive),
        Err(e) => {
            tracing::debug!(grammar = ?found.grammar, error = %e, "discarding malformed match");
            None
        }
    }
}

/// Move a well-formed `entity_id` parameter out of the parameter map
fn promote_target(parameters: &mut BTreeMap<String, ParamValue>) -> Option<String> {
    let ParamValue::Text(value) = parameters.get(TARGET_KEY)? else {
        return None;
    };

    let candidate = value.to_lowercase();
    if !is_valid_target(&candidate) {
        return None;
    }

    parameters.remove(TARGET_KEY);
    Some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> DirectiveExtractor {
        DirectiveExtractor::new(Arc::new(Capabilities::builtin()))
    }

    #[test]
    fn test_canonical_directive() {
        let directives = extractor().extract(
            "Sure! [ACTION: light.turn_on | entity_id=light.kitchen | brightness_pct=80]",
        );

        assert_eq!(directives.len(), 1);
        let d = &directives[0];
        assert_eq!(d.domain, "light");
        assert_eq!(d.service, "turn_on");
        assert_eq!(d.target.as_deref(), Some("light.kitchen"));
        assert_eq!(d.parameters.len(), 1);
        assert_eq!(d.parameters["brightness_pct"], ParamValue::Int(80));
    }

    #[test]
    fn test_unknown_domain_is_dropped() {
        let directives = extractor().extract("[ACTION: rocket.launch | entity_id=rocket.1]");
        assert!(directives.is_empty());
    }

    #[test]
    fn test_cross_grammar_duplicates_collapse() {
        let directives = extractor()
            .extract("[ACTION: light.turn_on | entity_id=light.a] [light:turn_on] entity_id=light.a");
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].target.as_deref(), Some("light.a"));
    }

    #[test]
    fn test_priority_order_then_text_order() {
        let directives = extractor().extract(
            "[switch:toggle] entity_id=switch.fan and [ACTION: light.turn_off | entity_id=light.b] \
             then [ACTION: light.turn_on | entity_id=light.a]",
        );

        let targets: Vec<_> = directives
            .iter()
            .map(|d| d.target.as_deref().unwrap())
            .collect();
        assert_eq!(targets, vec!["light.b", "light.a", "switch.fan"]);
    }

    #[test]
    fn test_case_is_normalized_before_dedup() {
        let directives = extractor().extract(
            "[ACTION: LIGHT.TURN_ON | entity_id=light.A] [light.turn_on | entity_id=Light.a]",
        );
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].domain, "light");
        assert_eq!(directives[0].target.as_deref(), Some("light.a"));
    }

    #[test]
    fn test_targetless_directive() {
        let directives =
            extractor().extract("Added. [ACTION: shopping_list.add_item | name=oat milk]");

        assert_eq!(directives.len(), 1);
        let d = &directives[0];
        assert_eq!(d.domain, "shopping_list");
        assert_eq!(d.target, None);
        assert_eq!(d.parameters["name"], ParamValue::Text("oat milk".into()));
    }

    #[test]
    fn test_targetless_directives_dedup_on_parameters() {
        let directives = extractor().extract(
            "[ACTION: shopping_list.add_item | name=milk] [ACTION: shopping_list.add_item | name=eggs] \
             [ACTION: shopping_list.add_item | name=milk]",
        );
        assert_eq!(directives.len(), 2);
    }

    #[test]
    fn test_generic_form_promotes_target() {
        let directives =
            extractor().extract("[ACTION: scene.turn_on | transition=2 | entity_id=scene.Movie]");

        assert_eq!(directives.len(), 1);
        let d = &directives[0];
        assert_eq!(d.target.as_deref(), Some("scene.movie"));
        assert!(!d.parameters.contains_key("entity_id"));
        assert_eq!(d.parameters["transition"], ParamValue::Int(2));
    }

    #[test]
    fn test_malformed_target_parameter_is_not_promoted() {
        let directives = extractor().extract("[ACTION: todo.add_item | entity_id=groceries]");

        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].target, None);
        assert_eq!(
            directives[0].parameters["entity_id"],
            ParamValue::Text("groceries".into())
        );
    }

    #[test]
    fn test_known_but_unauthorized_domain_is_extracted() {
        let directives = extractor().extract("[ACTION: sensor.refresh | entity_id=sensor.temp]");
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].domain, "sensor");
    }

    #[test]
    fn test_marker_after_bracket_yields_one_directive() {
        let directives =
            extractor().extract("[ACTION: light.turn_on | brightness=80] entity_id=light.a");

        assert_eq!(directives.len(), 1);
        let d = &directives[0];
        assert_eq!(d.target.as_deref(), Some("light.a"));
        assert_eq!(d.parameters.len(), 1);
        assert_eq!(d.parameters["brightness"], ParamValue::Int(80));
    }

    #[test]
    fn test_closed_aside_is_not_a_directive() {
        let directives = extractor().extract(
            "Sure [see note] the porch light is already bright, I set entity_id=light.porch earlier.",
        );
        assert!(directives.is_empty());
    }

    #[test]
    fn test_unclosed_directive_takes_no_trailing_prose() {
        let directives =
            extractor().extract("[light turn_on entity_id=light.a | brightness=5 and then I left");

        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].target.as_deref(), Some("light.a"));
        assert!(directives[0].parameters.is_empty());
    }

    #[test]
    fn test_no_directives() {
        assert!(extractor().extract("Just chatting today.").is_empty());
        assert!(extractor().extract("").is_empty());
    }
}
