//! Scripts and key codes the engine sends through [`Driver::execute_script`]
//! and [`Driver::send_keys`].
//!
//! [`Driver::execute_script`]: crate::browser::driver::Driver::execute_script
//! [`Driver::send_keys`]: crate::browser::driver::Driver::send_keys

/// Dispatch a DOM click on `arguments[0]`, skipping hit-testing.
pub const FORCE_CLICK: &str = "arguments[0].click();";

/// Center `arguments[0]` in the viewport so visibility observers fire.
pub const SCROLL_INTO_VIEW: &str =
    "arguments[0].scrollIntoView({block: 'center', inline: 'center'});";

/// WebDriver code point for the Enter key.
pub const ENTER_KEY: &str = "\u{e007}";
