//! Error types used across the Sturdy system.
//!
//! [`DriverError`] is what a browser driver reports for a single command.
//! [`InteractionError`] is what the interaction engine raises to page objects
//! and tests; it always carries the locator (or condition) and the elapsed
//! wait so a failing scenario can be diagnosed from the message alone.
use std::time::Duration;

use crate::Locator;

/// Classified failure of one driver command.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// No element currently matches the locator.
    #[error("no such element")]
    NoSuchElement,

    /// The element handle no longer refers to the live DOM.
    #[error("stale element reference")]
    StaleElement,

    /// The element exists but the browser refused the interaction.
    #[error("element not interactable: {0}")]
    NotInteractable(String),

    /// A script executed in the page threw.
    #[error("script error: {0}")]
    Script(String),

    /// The session or transport failed.
    #[error("session error: {0}")]
    Session(String),
}

impl DriverError {
    /// Errors that mean "not there yet" while polling for an element.
    pub fn is_transient(&self) -> bool {
        matches!(self, DriverError::NoSuchElement | DriverError::StaleElement)
    }
}

/// Failures raised by the interaction engine.
///
/// An absent optional element is not an error; see
/// `InteractionEngine::try_optional_action`.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InteractionError {
    /// The element never appeared in the DOM within the wait budget.
    #[error("element {locator} was not located within {elapsed:?}")]
    LocateTimeout { locator: Locator, elapsed: Duration },

    /// The element appeared but never became visible within the wait budget.
    #[error("element {locator} was located but not visible within {elapsed:?}")]
    VisibilityTimeout { locator: Locator, elapsed: Duration },

    /// The element is present and visible, but the action was rejected.
    #[error("element {locator} is not interactable: {reason}")]
    NotInteractable { locator: Locator, reason: String },

    /// The element kept going stale after re-locating it.
    #[error("element {locator} went stale {attempts} times in a row")]
    StaleReference { locator: Locator, attempts: u32 },

    /// A page-level condition never held within the wait budget.
    #[error("condition `{condition}` not met within {elapsed:?}")]
    ConditionTimeout { condition: String, elapsed: Duration },

    /// Row counting never reached a plausible value.
    #[error("found {found} rows for {rows} after {attempts} attempts, expected at least {minimum}")]
    ImplausibleCount {
        rows: Locator,
        found: usize,
        minimum: usize,
        attempts: u32,
    },

    /// The driver failed in a way the engine does not retry.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}

/// Error type for page objects and suite helpers.
#[derive(thiserror::Error, Debug)]
pub enum SturdyError {
    /// An engine operation failed.
    #[error(transparent)]
    Interaction(#[from] InteractionError),

    /// A page object needs a locator that is not configured.
    #[error("page `{page}` has no locator named `{name}`")]
    MissingLocator { page: String, name: String },

    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Starting or stopping a browser session failed.
    #[error("Session error: {0}")]
    Session(#[from] anyhow::Error),
}

/// Convenient alias for results that use [`SturdyError`].
pub type Result<T> = std::result::Result<T, SturdyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_timeout_message_names_locator_and_wait() {
        let err = InteractionError::LocateTimeout {
            locator: Locator::css("#missing"),
            elapsed: Duration::from_millis(500),
        };
        assert_eq!(
            err.to_string(),
            "element css=#missing was not located within 500ms"
        );
    }

    #[test]
    fn only_lookup_misses_are_transient() {
        assert!(DriverError::NoSuchElement.is_transient());
        assert!(DriverError::StaleElement.is_transient());
        assert!(!DriverError::NotInteractable("covered".into()).is_transient());
        assert!(!DriverError::Session("gone".into()).is_transient());
    }
}
