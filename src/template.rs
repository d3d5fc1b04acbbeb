//! Invitation rendering and per-language template lookup.

use std::collections::HashMap;

use url::Url;

use crate::{error::Error, message::CorrelationKey};

/// Placeholder an invitation text may use to position the deep link inline.
pub const LINK_PLACEHOLDER: &str = "{{link}}";

/// Renders invitation bodies around recipient-specific deep links.
#[derive(Debug, Clone)]
pub struct Renderer {
    base: Url,
}

impl Renderer {
    pub fn new(base: Url) -> Result<Self, Error> {
        if base.cannot_be_a_base() {
            return Err(Error::invalid_parameter(format!(
                "survey url {base} cannot carry path segments"
            )));
        }
        Ok(Self { base })
    }

    pub fn parse(base: &str) -> Result<Self, Error> {
        Self::new(Url::parse(base)?)
    }

    /// `{base}/{survey}/{key}`, with each segment percent-encoded.
    pub fn link(&self, survey: &str, key: &CorrelationKey) -> Url {
        let mut link = self.base.clone();
        if let Ok(mut segments) = link.path_segments_mut() {
            segments.pop_if_empty().push(survey).push(key.as_str());
        }
        link
    }

    /// Produces the final message body. The invitation text is inserted
    /// as-is.
    pub fn render(&self, invitation: &str, survey: &str, key: &CorrelationKey) -> String {
        let link = self.link(survey, key);
        let text = invitation.replace(LINK_PLACEHOLDER, link.as_str());

        format!(
            "<html><body>\
             <div>{text}</div>\
             <p><a href=\"{link}\">Open the survey</a></p>\
             <p style=\"font-size:small\">If the button does not work, copy this address into your browser: {link}</p>\
             </body></html>"
        )
    }
}

/// Normalizes a language key: surrounding whitespace and quote characters
/// are dropped and the result is lowercased.
pub fn normalize_language(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '"' | '\'' | '`'))
        .collect::<String>()
        .trim()
        .to_lowercase()
}

/// Invitation texts of one survey, keyed by normalized language.
#[derive(Debug, Default, Clone)]
pub struct Templates {
    by_language: HashMap<String, String>,
}

impl Templates {
    pub fn is_empty(&self) -> bool {
        self.by_language.is_empty()
    }

    /// The template for `language`, falling back to `default_language`.
    pub fn lookup(&self, language: &str, default_language: &str) -> Option<&str> {
        self.by_language
            .get(&normalize_language(language))
            .or_else(|| self.by_language.get(&normalize_language(default_language)))
            .map(String::as_str)
    }
}

impl<L, B> FromIterator<(L, B)> for Templates
where
    L: AsRef<str>,
    B: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (L, B)>>(iter: T) -> Self {
        Self {
            by_language: iter
                .into_iter()
                .map(|(language, body)| (normalize_language(language.as_ref()), body.into()))
                .collect(),
        }
    }
}
