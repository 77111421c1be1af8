//! Removal of directive syntax before speech synthesis
//!
//! Everything the grammars can recognize is stripped whether or not the
//! directive was known or authorized, together with tool-call blocks, bare
//! entity ids and stray target markers. The result is normalized so that
//! sanitizing twice gives the same text as sanitizing once.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::capabilities::Capabilities;
use crate::directive::Grammar;
use crate::{Error, Result};

/// Leftover tool-call blocks
static TOOLS_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tools>.*?</tools>").expect("valid regex"));

/// Target markers left behind by partially matched directives
static STRAY_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bentity_id\s*[:=]\s*(?:[a-z0-9_]+\.[a-z0-9_]+)?").expect("valid regex")
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([.,!?;:])").expect("valid regex"));

/// Punctuation marks whose repeated runs collapse to one
const PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':'];

/// Strips directive syntax from model output
#[derive(Debug, Clone)]
pub struct Sanitizer {
    /// Bare `domain.object_id` tokens for known domains
    entity_token: Regex,
    /// Domains whose loose catch-all matches are stripped
    known_domains: HashSet<String>,
}

impl Sanitizer {
    /// Build a sanitizer for the known domains in `capabilities`
    ///
    /// # Errors
    ///
    /// Returns error if the known-domain set is too large to compile into a
    /// single entity-token pattern
    pub fn new(capabilities: &Capabilities) -> Result<Self> {
        let domains = capabilities
            .known_domains()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("|");

        let pattern = format!(r"(?i)\b(?:{domains})\.[a-z0-9_]+\b");
        let entity_token = Regex::new(&pattern)
            .map_err(|e| Error::Config(format!("cannot build entity-token pattern: {e}")))?;

        Ok(Self {
            entity_token,
            known_domains: capabilities.known_domains().map(String::from).collect(),
        })
    }

    /// Remove directive syntax and normalize spacing
    ///
    /// Repeats until the text stops changing, so removals that bring two
    /// fragments together cannot leave a new directive behind.
    #[must_use]
    pub fn sanitize(&self, text: &str) -> String {
        let mut current = self.pass(text);
        loop {
            let next = self.pass(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    fn pass(&self, text: &str) -> String {
        let mut cleaned = text.to_string();

        for grammar in Grammar::PRIORITY {
            cleaned = match grammar {
                Grammar::CatchAll => self.strip_catch_all(&cleaned),
                _ => grammar.regex().replace_all(&cleaned, "").into_owned(),
            };
        }

        cleaned = TOOLS_BLOCK.replace_all(&cleaned, "").into_owned();
        cleaned = self.entity_token.replace_all(&cleaned, "").into_owned();
        cleaned = STRAY_MARKER.replace_all(&cleaned, "").into_owned();

        normalize_spacing(&cleaned)
    }

    /// Remove catch-all spans, but only for known domains
    ///
    /// The catch-all form is loose enough to match a bracketed aside followed
    /// by a stray marker; removing those would delete real prose.
    fn strip_catch_all(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for found in Grammar::CatchAll.find_iter(text) {
            if !self.known_domains.contains(&found.domain.to_lowercase()) {
                continue;
            }
            out.push_str(&text[last..found.span.start]);
            last = found.span.end;
        }

        out.push_str(&text[last..]);
        out
    }
}

/// Collapse whitespace and tidy punctuation
///
/// Runs of whitespace become one space, a space before punctuation is
/// dropped, and repeats of the same punctuation mark collapse to one.
#[must_use]
pub fn normalize_spacing(text: &str) -> String {
    let collapsed = WHITESPACE.replace_all(text, " ");
    let attached = SPACE_BEFORE_PUNCT.replace_all(&collapsed, "$1");

    let mut out = String::with_capacity(attached.len());
    let mut previous = None;
    for c in attached.chars() {
        if PUNCTUATION.contains(&c) && previous == Some(c) {
            continue;
        }
        out.push(c);
        previous = Some(c);
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer() -> Sanitizer {
        Sanitizer::new(&Capabilities::builtin()).unwrap()
    }

    #[test]
    fn test_canonical_directive_removed() {
        let text = "Sure! [ACTION: light.turn_on | entity_id=light.kitchen | brightness_pct=80]";
        assert_eq!(sanitizer().sanitize(text), "Sure!");
    }

    #[test]
    fn test_unknown_domain_syntax_removed() {
        let text = "Launching. [ACTION: rocket.launch | entity_id=rocket.1]";
        assert_eq!(sanitizer().sanitize(text), "Launching.");
    }

    #[test]
    fn test_every_grammar_removed() {
        let s = sanitizer();
        assert_eq!(
            s.sanitize("One [light:turn_on] entity_id=light.a two"),
            "One two"
        );
        assert_eq!(
            s.sanitize("One [fan.toggle | entity_id=fan.b | x=1] two"),
            "One two"
        );
        assert_eq!(
            s.sanitize("One [cover close_cover] entity_id: cover.garage two"),
            "One two"
        );
        assert_eq!(
            s.sanitize("One [ACTION: shopping_list.add_item | name=milk] two"),
            "One two"
        );
    }

    #[test]
    fn test_tools_block_removed() {
        let text = "Done.<tools>\n{\"name\": \"light.turn_on\"}\n</tools> Anything else?";
        assert_eq!(sanitizer().sanitize(text), "Done. Anything else?");
    }

    #[test]
    fn test_bare_entity_ids_removed() {
        let text = "I turned on light.kitchen_main and Switch.Porch for you";
        assert_eq!(sanitizer().sanitize(text), "I turned on and for you");
    }

    #[test]
    fn test_unknown_domain_dotted_words_kept() {
        let text = "Visit example.com or read chapter.two";
        assert_eq!(sanitizer().sanitize(text), text);
    }

    #[test]
    fn test_stray_marker_removed() {
        assert_eq!(
            sanitizer().sanitize("Okay entity_id = done now"),
            "Okay done now"
        );
    }

    #[test]
    fn test_punctuation_cleanup() {
        assert_eq!(
            sanitizer().sanitize("Sure , done !! [ACTION: light.turn_off | entity_id=light.a] !"),
            "Sure, done!"
        );
    }

    #[test]
    fn test_plain_text_is_only_normalized() {
        let text = "  Hello   there,\n\nhow are you?  ";
        assert_eq!(sanitizer().sanitize(text), normalize_spacing(text));
        assert_eq!(sanitizer().sanitize(text), "Hello there, how are you?");
    }

    #[test]
    fn test_bracketed_aside_keeps_surrounding_prose() {
        let text =
            "Sure [see note] the porch light is already bright, I set entity_id=light.porch earlier.";
        assert_eq!(
            sanitizer().sanitize(text),
            "Sure [see note] the porch light is already bright, I set earlier."
        );
    }

    #[test]
    fn test_marker_after_closed_directive_removed() {
        assert_eq!(
            sanitizer().sanitize("Done [ACTION: light.turn_on | brightness=80] entity_id=light.a for you"),
            "Done for you"
        );
    }

    #[test]
    fn test_unclosed_directive_keeps_trailing_prose() {
        assert_eq!(
            sanitizer().sanitize("On it [light turn_on entity_id=light.a and then I left"),
            "On it and then I left"
        );
    }

    #[test]
    fn test_oversized_domain_set_is_an_error() {
        let huge = "k".repeat(500_000);
        let caps = Capabilities::builtin().with_overlay(std::iter::empty(), [huge.as_str()]);

        let err = Sanitizer::new(&caps).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_idempotent() {
        let s = sanitizer();
        let samples = [
            "Sure! [ACTION: light.turn_on | entity_id=light.kitchen | brightness_pct=80]",
            "[light..turn_on entity_id=light.a",
            "a ! ! b ... c",
            "[ACTION: light.turn_on <tools>x</tools>| entity_id=light.a] ok",
            "entity_id entity_id: light.a entity_id=",
            "",
            "   ",
        ];
        for sample in samples {
            let once = s.sanitize(sample);
            assert_eq!(s.sanitize(&once), once, "not idempotent for {sample:?}");
        }
    }
}
