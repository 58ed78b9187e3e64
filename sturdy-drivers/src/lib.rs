//! Driver layer for resilient browser interaction.
//!
//! This crate exposes the driver capability set, the WebDriver session that
//! implements it, and the interaction engine that page objects use to find
//! and act on elements of a lazily rendering page.
//!
//! - [`browser::driver::Driver`]: capability set the engine depends on
//! - [`browser::driver::WebDriverSession`]: `fantoccini` WebDriver client wrapper
//! - [`browser::wait::WaitPolicy`]: timeout + poll interval values
//! - [`browser::engine::InteractionEngine`]: locate/act/read with waits and stale retries
//! - [`browser::rows::RowCountPlan`]: convergent counting of progressively loaded rows
//! - [`browser::session`]: sessions that are always quit, whatever the outcome
pub mod browser;

#[cfg(any(test, feature = "fixture"))]
pub mod fixture;
