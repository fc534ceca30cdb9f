//! Signature link handling: which links a signature template promises, how
//! a verification code is attached to them, and how scraped links compare.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static TEMPLATE_TERMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\[\]]").expect("valid template split regex"));

static HTTP_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s\[\]"'<>]+"#).expect("valid http link regex"));

const VCODE_PARAM: &str = "vcode=";

/// The set of links a BBCode signature template points at.
///
/// Every `[url=...]` tag contributes the text after `url=` when it is
/// non-empty. Duplicate links collapse.
#[must_use]
pub fn expected_links(template: &str) -> BTreeSet<String> {
    TEMPLATE_TERMS
        .split(template)
        .filter_map(|term| term.split_once("url=").map(|(_, link)| link.trim()))
        .filter(|link| !link.is_empty())
        .map(str::to_string)
        .collect()
}

/// The signature text a user pastes into their forum profile: the template
/// with `?vcode=<code>` appended to every http(s) link.
///
/// Templates without an absolute link but with a bare `link` placeholder get
/// the parameter appended at the end. Anything else is returned unchanged.
#[must_use]
pub fn inject_verification_code(template: &str, code: &str) -> String {
    if template.contains("http") {
        HTTP_LINK
            .replace_all(template, |caps: &regex::Captures<'_>| {
                format!("{}?{VCODE_PARAM}{code}", &caps[0])
            })
            .into_owned()
    } else if template.contains("link") {
        format!("{template}?{VCODE_PARAM}{code}")
    } else {
        template.to_string()
    }
}

/// A scraped link split into its bare form and embedded verification code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrippedLink {
    pub link: String,
    pub code: Option<String>,
}

/// Split `https://a.com?vcode=X&y=1` into `https://a.com` and `X`.
#[must_use]
pub fn strip_verification_code(raw: &str) -> StrippedLink {
    let raw = raw.trim();
    match raw.split_once(VCODE_PARAM) {
        Some((prefix, rest)) => {
            let code = rest.split('&').next().unwrap_or_default().trim();
            StrippedLink {
                link: prefix.trim_end_matches(['?', '&']).to_string(),
                code: (!code.is_empty()).then(|| code.to_string()),
            }
        }
        None => StrippedLink {
            link: raw.to_string(),
            code: None,
        },
    }
}

/// Outcome of comparing the links scraped from a signature with the links
/// its template expects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkCheck {
    pub matched: bool,
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
    /// Verification codes found on the scraped links, in page order.
    pub codes: Vec<String>,
}

impl LinkCheck {
    /// Compare scraped links to the expected set.
    ///
    /// Only links carrying a `vcode` parameter take part in the comparison;
    /// the set of their bare forms must equal `expected` exactly.
    #[must_use]
    pub fn compare(scraped: &[String], expected: &BTreeSet<String>) -> Self {
        let mut found = BTreeSet::new();
        let mut codes = Vec::new();

        for raw in scraped {
            let stripped = strip_verification_code(raw);
            if let Some(code) = stripped.code {
                found.insert(stripped.link);
                codes.push(code);
            }
        }

        let missing: Vec<String> = expected.difference(&found).cloned().collect();
        let unexpected: Vec<String> = found.difference(expected).cloned().collect();

        Self {
            matched: !scraped.is_empty() && !found.is_empty() && found == *expected,
            missing,
            unexpected,
            codes,
        }
    }

    /// Human-readable description of a mismatch, `None` when matched.
    #[must_use]
    pub fn mismatch_reason(&self) -> Option<String> {
        if self.matched {
            return None;
        }
        if self.codes.is_empty() {
            return Some("no signature link carries a verification code".to_string());
        }
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing links: {}", self.missing.join(", ")));
        }
        if !self.unexpected.is_empty() {
            parts.push(format!("unexpected links: {}", self.unexpected.join(", ")));
        }
        Some(format!("signature links do not match ({})", parts.join("; ")))
    }
}
