use anyhow::Result;
use async_trait::async_trait;
use fantoccini::error::{CmdError, ErrorStatus};
use fantoccini::{elements::Element, Client, ClientBuilder};
use serde_json::{json, Value};
use std::collections::HashMap;
use sturdy_common::{DriverError, Locator, Strategy};
use sturdy_config::BrowserSettings;
use tracing::{debug, info};
use webdriver::capabilities::Capabilities;

/// Capability set the interaction engine needs from a browser driver.
///
/// Element handles are only meaningful for the call that produced them;
/// implementations report handles invalidated by a re-render as
/// [`DriverError::StaleElement`].
#[async_trait]
pub trait Driver: Send + Sync {
    type Element: Send + Sync;

    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    async fn find_element(&self, locator: &Locator) -> Result<Self::Element, DriverError>;

    async fn find_elements(&self, locator: &Locator) -> Result<Vec<Self::Element>, DriverError>;

    async fn is_displayed(&self, element: &Self::Element) -> Result<bool, DriverError>;

    /// Native click, subject to the browser's interactability checks.
    async fn click(&self, element: &Self::Element) -> Result<(), DriverError>;

    async fn clear(&self, element: &Self::Element) -> Result<(), DriverError>;

    async fn send_keys(&self, element: &Self::Element, text: &str) -> Result<(), DriverError>;

    async fn text(&self, element: &Self::Element) -> Result<String, DriverError>;

    async fn attribute(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    /// Run `script` in the page with `element` (if any) as `arguments[0]`.
    async fn execute_script(
        &self,
        script: &str,
        element: Option<&Self::Element>,
    ) -> Result<Value, DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    async fn title(&self) -> Result<String, DriverError>;

    /// End the browser session.
    async fn quit(&self) -> Result<(), DriverError>;
}

/// Thin wrapper around a `fantoccini` WebDriver client.
pub struct WebDriverSession {
    client: Client,
}

impl WebDriverSession {
    /// Connect to the WebDriver service named in `settings`.
    ///
    /// Chrome is started with `settings.args`; headless runs add
    /// `--headless` and `--disable-gpu`.
    pub async fn connect(settings: &BrowserSettings) -> Result<Self> {
        let mut caps = Capabilities::new();
        let mut chrome_opts = HashMap::new();

        let mut args = settings.args.clone();
        if settings.headless {
            args.push("--headless".to_string());
            args.push("--disable-gpu".to_string());
        }
        chrome_opts.insert("args".to_string(), json!(args));
        caps.insert("goog:chromeOptions".to_string(), json!(chrome_opts));

        info!(
            target: "browser.driver",
            url = %settings.webdriver_url,
            headless = settings.headless,
            "connecting to WebDriver"
        );
        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&settings.webdriver_url)
            .await?;

        Ok(Self { client })
    }

    /// Wrap an already connected client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn to_fantoccini(locator: &Locator) -> fantoccini::Locator<'_> {
    match locator.strategy {
        Strategy::Id => fantoccini::Locator::Id(&locator.value),
        Strategy::Css => fantoccini::Locator::Css(&locator.value),
        Strategy::XPath => fantoccini::Locator::XPath(&locator.value),
        // A bare tag name is a valid CSS type selector.
        Strategy::TagName => fantoccini::Locator::Css(&locator.value),
        Strategy::LinkText => fantoccini::Locator::LinkText(&locator.value),
    }
}

fn classify(err: CmdError) -> DriverError {
    match err {
        CmdError::Standard(wd) => match wd.error {
            ErrorStatus::NoSuchElement => DriverError::NoSuchElement,
            ErrorStatus::StaleElementReference => DriverError::StaleElement,
            ErrorStatus::ElementClickIntercepted
            | ErrorStatus::ElementNotInteractable
            | ErrorStatus::InvalidElementState => {
                DriverError::NotInteractable(wd.message.to_string())
            }
            ErrorStatus::JavascriptError => DriverError::Script(wd.message.to_string()),
            _ => DriverError::Session(wd.message.to_string()),
        },
        other => DriverError::Session(other.to_string()),
    }
}

#[async_trait]
impl Driver for WebDriverSession {
    type Element = Element;

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        debug!(target: "browser.driver", %url, "navigate");
        self.client.goto(url).await.map_err(classify)
    }

    async fn find_element(&self, locator: &Locator) -> Result<Element, DriverError> {
        self.client
            .find(to_fantoccini(locator))
            .await
            .map_err(classify)
    }

    async fn find_elements(&self, locator: &Locator) -> Result<Vec<Element>, DriverError> {
        self.client
            .find_all(to_fantoccini(locator))
            .await
            .map_err(classify)
    }

    async fn is_displayed(&self, element: &Element) -> Result<bool, DriverError> {
        element.is_displayed().await.map_err(classify)
    }

    async fn click(&self, element: &Element) -> Result<(), DriverError> {
        element.click().await.map_err(classify)
    }

    async fn clear(&self, element: &Element) -> Result<(), DriverError> {
        element.clear().await.map_err(classify)
    }

    async fn send_keys(&self, element: &Element, text: &str) -> Result<(), DriverError> {
        element.send_keys(text).await.map_err(classify)
    }

    async fn text(&self, element: &Element) -> Result<String, DriverError> {
        element.text().await.map_err(classify)
    }

    async fn attribute(&self, element: &Element, name: &str) -> Result<Option<String>, DriverError> {
        element.attr(name).await.map_err(classify)
    }

    async fn execute_script(
        &self,
        script: &str,
        element: Option<&Element>,
    ) -> Result<Value, DriverError> {
        let args = match element {
            Some(el) => vec![serde_json::to_value(el)
                .map_err(|e| DriverError::Script(format!("cannot pass element to script: {e}")))?],
            None => vec![],
        };
        self.client.execute(script, args).await.map_err(classify)
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        self.client
            .current_url()
            .await
            .map(|url| url.to_string())
            .map_err(classify)
    }

    async fn title(&self) -> Result<String, DriverError> {
        self.client.title().await.map_err(classify)
    }

    async fn quit(&self) -> Result<(), DriverError> {
        self.client.clone().close().await.map_err(classify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_names_are_sent_as_css() {
        let locator = Locator::tag_name("h1");
        assert!(matches!(
            to_fantoccini(&locator),
            fantoccini::Locator::Css("h1")
        ));
    }

    fn standard(status: ErrorStatus, message: &'static str) -> CmdError {
        CmdError::Standard(fantoccini::error::WebDriver::new(status, message))
    }

    #[test]
    fn missing_and_stale_elements_are_transient() {
        let missing = classify(standard(ErrorStatus::NoSuchElement, "no such element"));
        let stale = classify(standard(
            ErrorStatus::StaleElementReference,
            "stale element reference: element is not attached to the page document",
        ));

        assert_eq!(missing, DriverError::NoSuchElement);
        assert_eq!(stale, DriverError::StaleElement);
        assert!(missing.is_transient() && stale.is_transient());
    }

    #[test]
    fn intercepted_click_keeps_browser_reason() {
        let err = classify(standard(
            ErrorStatus::ElementClickIntercepted,
            "element click intercepted: Other element would receive the click",
        ));
        match err {
            DriverError::NotInteractable(reason) => assert!(reason.contains("intercepted")),
            other => panic!("expected NotInteractable, got {other:?}"),
        }
    }

    #[test]
    fn script_and_session_failures_are_not_transient() {
        let script = classify(standard(
            ErrorStatus::JavascriptError,
            "javascript error: arguments[0] is undefined",
        ));
        assert_eq!(
            script,
            DriverError::Script("javascript error: arguments[0] is undefined".into())
        );

        let session = classify(standard(ErrorStatus::InvalidSessionId, "invalid session id"));
        assert!(matches!(session, DriverError::Session(_)));
        assert!(!session.is_transient());
    }

    #[test]
    fn xpath_is_passed_through() {
        let locator = Locator::xpath("//table//tr");
        assert!(matches!(
            to_fantoccini(&locator),
            fantoccini::Locator::XPath("//table//tr")
        ));
    }
}
