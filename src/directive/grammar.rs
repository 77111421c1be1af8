//! Recognizer grammars for directive syntax
//!
//! The model does not write directives consistently, so several grammars are
//! tried in a fixed order. Earlier grammars are stricter; later ones exist
//! only to recover from malformed output and must never win over a stricter
//! match of the same directive.

use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// `[ACTION: light.turn_on | entity_id=light.kitchen | brightness=80]`
static CANONICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\[ACTION:\s*(?P<domain>[a-z_]+)\.(?P<service>[a-z_]+)\s*\|\s*entity_id=(?P<target>[a-z0-9_]+\.[a-z0-9_]+)(?:\s*\|\s*(?P<params>[^\]]*))?\]",
    )
    .expect("valid regex")
});

/// `[light:turn_on] entity_id=light.kitchen`
static COLON_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\[(?P<domain>[a-z_]+):(?P<service>[a-z_]+)\]\s*entity_id=(?P<target>[a-z0-9_]+\.[a-z0-9_]+)",
    )
    .expect("valid regex")
});

/// `[light.turn_on | entity_id=light.kitchen | brightness=80]`
static UNTAGGED_DOTTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\[(?P<domain>[a-z_]+)\.(?P<service>[a-z_]+)\s*\|\s*entity_id=(?P<target>[a-z0-9_]+\.[a-z0-9_]+)(?:\s*\|\s*(?P<params>[^\]]*))?\]",
    )
    .expect("valid regex")
});

/// `[light turn_on] please entity_id: light.kitchen`, and similar
///
/// The marker sits either inside the bracket or in the prose right after its
/// `]`. Text after the `]` is never read as parameters, and trailing
/// parameters only count when a `]` closes them.
static CATCH_ALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\[\s*(?:ACTION\s*:\s*)?(?P<domain>[a-z_]+)\s*[.:,\s]\s*(?P<service>[a-z_]+)(?P<lead>[^\[\]]*?)(?P<close>\][^\[\]]*?)?entity_id\s*[:=]\s*(?P<target>[a-z0-9_]+\.[a-z0-9_]+)(?:\s*\|\s*(?P<params>[^\[\]]*)\]|\])?",
    )
    .expect("valid regex")
});

/// `[ACTION: shopping_list.add_item | name=milk]`
static GENERIC_TAGGED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\[ACTION:\s*(?P<domain>[a-z_]+)\.(?P<service>[a-z_]+)\s*(?:\|(?P<params>[^\]]*))?\]",
    )
    .expect("valid regex")
});

/// One directive recognizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    /// Tagged form with explicit target marker
    Canonical,
    /// Bracketed `domain:service` followed by a target marker
    ColonPair,
    /// Bracketed `domain.service` with canonical separators but no tag
    UntaggedDotted,
    /// Any bracketed domain/service pair with a target marker before the next bracket
    CatchAll,
    /// Tagged form with arbitrary parameters and no mandatory target
    GenericTagged,
}

impl Grammar {
    /// All grammars, strictest first
    pub const PRIORITY: [Self; 5] = [
        Self::Canonical,
        Self::ColonPair,
        Self::UntaggedDotted,
        Self::CatchAll,
        Self::GenericTagged,
    ];

    /// Matcher for this grammar's surface form
    #[must_use]
    pub fn regex(self) -> &'static Regex {
        match self {
            Self::Canonical => &CANONICAL,
            Self::ColonPair => &COLON_PAIR,
            Self::UntaggedDotted => &UNTAGGED_DOTTED,
            Self::CatchAll => &CATCH_ALL,
            Self::GenericTagged => &GENERIC_TAGGED,
        }
    }

    /// Whether a match may omit the target
    #[must_use]
    pub const fn allows_targetless(self) -> bool {
        matches!(self, Self::GenericTagged)
    }

    /// Find every non-overlapping match of this grammar in `text`
    pub fn find_iter(self, text: &str) -> impl Iterator<Item = GrammarMatch<'_>> {
        self.regex()
            .captures_iter(text)
            .filter_map(move |caps| GrammarMatch::from_captures(self, &caps))
    }
}

/// Raw fields captured from one matched span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarMatch<'t> {
    /// Grammar that produced the match
    pub grammar: Grammar,
    /// Byte range of the whole match
    pub span: Range<usize>,
    /// Domain as written
    pub domain: &'t str,
    /// Service as written
    pub service: &'t str,
    /// Target as written
    pub target: Option<&'t str>,
    /// Unparsed `key=value|...` segments, in text order
    pub params: Vec<&'t str>,
}

impl<'t> GrammarMatch<'t> {
    fn from_captures(grammar: Grammar, caps: &Captures<'t>) -> Option<Self> {
        let whole = caps.get(0)?;
        let domain = caps.name("domain")?.as_str();
        let service = caps.name("service")?.as_str();
        let target = caps.name("target");

        if target.is_none() && !grammar.allows_targetless() {
            return None;
        }

        // Marker found after the bracket closed: the directive ends at the
        // target and anything the pattern read beyond it is not ours
        let closed_early = caps.name("close").is_some();
        let end = match target {
            Some(t) if closed_early => t.end(),
            _ => whole.end(),
        };

        // Text between the service and the marker only counts as parameters
        // when it continues the `|` separator convention
        let lead = caps
            .name("lead")
            .and_then(|m| m.as_str().trim().strip_prefix('|'));
        let params = lead
            .into_iter()
            .chain(
                caps.name("params")
                    .filter(|_| !closed_early)
                    .map(|m| m.as_str()),
            )
            .map(|p| p.trim().trim_end_matches('|').trim())
            .filter(|p| !p.is_empty())
            .collect();

        Some(Self {
            grammar,
            span: whole.start()..end,
            domain,
            service,
            target: target.map(|m| m.as_str()),
            params,
        })
    }
}
