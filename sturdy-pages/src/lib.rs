//! Page objects for the target news site.
//!
//! A page borrows an [`InteractionEngine`](sturdy_drivers::browser::engine::InteractionEngine)
//! and the [`PageSpec`] loaded from configuration. Selectors are looked up by
//! semantic name in that table; the page code never spells a CSS selector.
pub mod home;
pub mod standings;
pub mod text;

pub use home::HomePage;
pub use standings::StandingsPage;

use sturdy_common::{LocatorChain, SturdyError};
use sturdy_config::PageSpec;

/// Look up a locator the page cannot work without.
pub(crate) fn required<'s>(
    spec: &'s PageSpec,
    page: &str,
    name: &str,
) -> Result<&'s LocatorChain, SturdyError> {
    spec.locator(name).ok_or_else(|| SturdyError::MissingLocator {
        page: page.to_string(),
        name: name.to_string(),
    })
}
