//! Common types and utilities shared across Sturdy crates.
//!
//! This crate defines the element locator model, the error taxonomy of the
//! interaction engine and the observability helpers used throughout the
//! Sturdy workspace. It stays dependency‑light so configuration, drivers and
//! page objects can all depend on it.
//!
//! # Overview
//!
//! - [`Locator`] and [`Strategy`]: how to find an element
//! - [`LocatorChain`]: an ordered list of fallback locators
//! - [`observability`]: Centralised tracing/logging initialisation
//! - [`DriverError`], [`InteractionError`], [`SturdyError`] and [`Result`]
//!
//! # Examples
//!
//! ```rust
//! use sturdy_common::{Locator, Strategy};
//!
//! let search = Locator::id("busca-campo");
//! assert_eq!(search.strategy, Strategy::Id);
//! assert_eq!(search.to_string(), "id=busca-campo");
//! ```
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod error;
pub mod observability;

pub use error::{DriverError, InteractionError, Result, SturdyError};

/// How the driver should interpret a [`Locator`] value.
///
/// The engine never interprets these itself; they are handed to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Id,
    Css,
    #[serde(rename = "xpath")]
    XPath,
    TagName,
    LinkText,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Id => "id",
            Strategy::Css => "css",
            Strategy::XPath => "xpath",
            Strategy::TagName => "tag_name",
            Strategy::LinkText => "link_text",
        };
        f.write_str(name)
    }
}

/// Description of how to find an element: a strategy plus its value.
///
/// Locators are owned by page objects (usually loaded from configuration)
/// and only borrowed by the engine for the duration of one call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub strategy: Strategy,
    pub value: String,
}

impl Locator {
    pub fn new(strategy: Strategy, value: impl Into<String>) -> Self {
        Self {
            strategy,
            value: value.into(),
        }
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self::new(Strategy::Id, value)
    }

    pub fn css(value: impl Into<String>) -> Self {
        Self::new(Strategy::Css, value)
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self::new(Strategy::XPath, value)
    }

    pub fn tag_name(value: impl Into<String>) -> Self {
        Self::new(Strategy::TagName, value)
    }

    pub fn link_text(value: impl Into<String>) -> Self {
        Self::new(Strategy::LinkText, value)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy, self.value)
    }
}

/// Ordered, non‑empty list of locators for the same semantic element.
///
/// The first entry is the preferred selector; later entries are fallbacks
/// for older revisions of the target markup. In configuration a chain may be
/// written either as a single locator or as a list.
///
/// ```rust
/// use sturdy_common::{Locator, LocatorChain};
///
/// let chain = LocatorChain::new(vec![
///     Locator::css("h1.content-head__title"),
///     Locator::tag_name("h1"),
/// ])
/// .unwrap();
/// assert_eq!(chain.primary(), &Locator::css("h1.content-head__title"));
/// assert_eq!(chain.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ChainRepr", into = "Vec<Locator>")]
pub struct LocatorChain(Vec<Locator>);

#[derive(Deserialize)]
#[serde(untagged)]
enum ChainRepr {
    Single(Locator),
    Fallbacks(Vec<Locator>),
}

impl TryFrom<ChainRepr> for LocatorChain {
    type Error = String;

    fn try_from(repr: ChainRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            ChainRepr::Single(locator) => Ok(Self(vec![locator])),
            ChainRepr::Fallbacks(list) => {
                Self::new(list).ok_or_else(|| "locator list must not be empty".to_string())
            }
        }
    }
}

impl From<LocatorChain> for Vec<Locator> {
    fn from(chain: LocatorChain) -> Self {
        chain.0
    }
}

impl From<Locator> for LocatorChain {
    fn from(locator: Locator) -> Self {
        Self(vec![locator])
    }
}

impl LocatorChain {
    /// Build a chain; `None` if `locators` is empty.
    pub fn new(locators: Vec<Locator>) -> Option<Self> {
        if locators.is_empty() {
            None
        } else {
            Some(Self(locators))
        }
    }

    pub fn primary(&self) -> &Locator {
        &self.0[0]
    }

    pub fn as_slice(&self) -> &[Locator] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn locator_display_names_strategy() {
        assert_eq!(Locator::css("#missing").to_string(), "css=#missing");
        assert_eq!(
            Locator::xpath("//tbody/tr").to_string(),
            "xpath=//tbody/tr"
        );
    }

    #[test]
    fn chain_accepts_single_locator() {
        let chain: LocatorChain =
            serde_json::from_value(json!({ "strategy": "css", "value": ".bstn-hl-link" }))
                .unwrap();
        assert_eq!(chain.as_slice(), &[Locator::css(".bstn-hl-link")]);
    }

    #[test]
    fn chain_accepts_fallback_list() {
        let chain: LocatorChain = serde_json::from_value(json!([
            { "strategy": "id", "value": "busca-campo" },
            { "strategy": "css", "value": "input[name=q]" }
        ]))
        .unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.primary(), &Locator::id("busca-campo"));
    }

    #[test]
    fn chain_rejects_empty_list() {
        let err = serde_json::from_value::<LocatorChain>(json!([])).unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn strategy_reads_xpath_spelling() {
        let locator: Locator =
            serde_json::from_value(json!({ "strategy": "xpath", "value": "//h1" })).unwrap();
        assert_eq!(locator.strategy, Strategy::XPath);
    }
}
