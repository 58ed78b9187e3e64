use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use sturdy_common::{DriverError, InteractionError, Locator, LocatorChain};
use sturdy_config::SturdyConfig;
use tracing::{debug, info, warn};

use crate::browser::driver::Driver;
use crate::browser::scripts;
use crate::browser::wait::{poll_until, Condition, PollError, SettlePolicy, WaitPolicy};

pub const DEFAULT_STALE_RETRIES: u32 = 2;
pub const DEFAULT_ROW_ATTEMPTS: u32 = 3;

/// Whether typing keeps or replaces the current field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeMode {
    #[default]
    Append,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeOptions {
    pub mode: TypeMode,
    /// Press Enter after the text.
    pub submit: bool,
}

impl TypeOptions {
    pub fn replace() -> Self {
        Self {
            mode: TypeMode::Replace,
            submit: false,
        }
    }

    pub fn and_submit(mut self) -> Self {
        self.submit = true;
        self
    }
}

/// What to do with an optional element once it shows up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Click,
    ForceClick,
    ScrollIntoView,
}

/// Budgets an engine runs with, validated from configuration.
///
/// Built before any browser is started, so a bad configuration never leaves
/// a session behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTuning {
    pub wait: WaitPolicy,
    pub settle: SettlePolicy,
    pub stale_retries: u32,
    pub row_attempts: u32,
}

impl TryFrom<&SturdyConfig> for EngineTuning {
    type Error = sturdy_common::SturdyError;

    fn try_from(config: &SturdyConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            wait: WaitPolicy::try_from(config.wait)?,
            settle: config.settle.into(),
            stale_retries: config.stale_retries,
            row_attempts: config.row_count.attempts,
        })
    }
}

/// Finds elements under a wait policy and acts on them.
///
/// The engine owns the driver for one browser session and keeps no element
/// handles between calls: every operation locates afresh. Each call takes an
/// optional [`WaitPolicy`]; `None` means the engine default.
pub struct InteractionEngine<D: Driver> {
    driver: D,
    wait: WaitPolicy,
    settle: SettlePolicy,
    stale_retries: u32,
    row_attempts: u32,
}

impl<D: Driver> InteractionEngine<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            wait: WaitPolicy::default(),
            settle: SettlePolicy::default(),
            stale_retries: DEFAULT_STALE_RETRIES,
            row_attempts: DEFAULT_ROW_ATTEMPTS,
        }
    }

    /// Engine with the wait, settle, stale-retry and row-count budgets of `config`.
    pub fn from_config(driver: D, config: &SturdyConfig) -> sturdy_common::Result<Self> {
        Ok(Self::with_tuning(driver, EngineTuning::try_from(config)?))
    }

    pub fn with_tuning(driver: D, tuning: EngineTuning) -> Self {
        Self::new(driver)
            .with_wait_policy(tuning.wait)
            .with_settle_policy(tuning.settle)
            .with_stale_retries(tuning.stale_retries)
            .with_row_attempts(tuning.row_attempts)
    }

    pub fn with_wait_policy(mut self, policy: WaitPolicy) -> Self {
        self.wait = policy;
        self
    }

    pub fn with_settle_policy(mut self, policy: SettlePolicy) -> Self {
        self.settle = policy;
        self
    }

    pub fn with_stale_retries(mut self, retries: u32) -> Self {
        self.stale_retries = retries;
        self
    }

    pub fn with_row_attempts(mut self, attempts: u32) -> Self {
        self.row_attempts = attempts.max(1);
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        self.wait
    }

    pub fn settle_policy(&self) -> SettlePolicy {
        self.settle
    }

    pub(crate) fn row_attempts(&self) -> u32 {
        self.row_attempts
    }

    fn resolve(&self, policy: Option<WaitPolicy>) -> WaitPolicy {
        policy.unwrap_or(self.wait)
    }

    pub async fn navigate(&self, url: &str) -> Result<(), InteractionError> {
        info!(target: "browser.engine", %url, "navigate");
        Ok(self.driver.navigate(url).await?)
    }

    pub async fn current_url(&self) -> Result<String, InteractionError> {
        Ok(self.driver.current_url().await?)
    }

    pub async fn title(&self) -> Result<String, InteractionError> {
        Ok(self.driver.title().await?)
    }

    /// Wait until an element matching `locator` exists in the DOM.
    ///
    /// A timeout means "not found within budget", not "does not exist": the
    /// page may still be rendering.
    pub async fn locate(
        &self,
        locator: &Locator,
        policy: Option<WaitPolicy>,
    ) -> Result<D::Element, InteractionError> {
        let driver = &self.driver;
        poll_until(self.resolve(policy), move || async move {
            present(driver, locator).await
        })
        .await
        .map_err(|e| match e {
            PollError::Timeout { elapsed } => InteractionError::LocateTimeout {
                locator: locator.clone(),
                elapsed,
            },
            PollError::Probe(e) => e,
        })
    }

    /// Like [`locate`](Self::locate), but the element must also be displayed.
    pub async fn locate_visible(
        &self,
        locator: &Locator,
        policy: Option<WaitPolicy>,
    ) -> Result<D::Element, InteractionError> {
        let driver = &self.driver;
        let seen = AtomicBool::new(false);
        let seen_ref = &seen;
        poll_until(self.resolve(policy), move || async move {
            displayed(driver, locator, seen_ref).await
        })
        .await
        .map_err(|e| match e {
            PollError::Timeout { elapsed } if seen.load(Ordering::Relaxed) => {
                InteractionError::VisibilityTimeout {
                    locator: locator.clone(),
                    elapsed,
                }
            }
            PollError::Timeout { elapsed } => InteractionError::LocateTimeout {
                locator: locator.clone(),
                elapsed,
            },
            PollError::Probe(e) => e,
        })
    }

    /// Wait until any locator of `chain` matches; earlier entries win.
    pub async fn locate_any(
        &self,
        chain: &LocatorChain,
        policy: Option<WaitPolicy>,
    ) -> Result<D::Element, InteractionError> {
        let (_, element) = self.first_match(chain, false, policy).await?;
        Ok(element)
    }

    /// The first locator of `chain` that currently matches an element.
    ///
    /// A single-entry chain is returned as is, leaving the wait to the
    /// operation that follows.
    pub async fn resolve_chain<'c>(
        &self,
        chain: &'c LocatorChain,
        policy: Option<WaitPolicy>,
    ) -> Result<&'c Locator, InteractionError> {
        if chain.len() == 1 {
            return Ok(chain.primary());
        }
        let (locator, _) = self.first_match(chain, false, policy).await?;
        Ok(locator)
    }

    /// Like [`resolve_chain`](Self::resolve_chain), but an entry only counts
    /// once its element is displayed. Use it before clicking or typing, so a
    /// hidden primary does not shadow a visible fallback.
    pub async fn resolve_visible_chain<'c>(
        &self,
        chain: &'c LocatorChain,
        policy: Option<WaitPolicy>,
    ) -> Result<&'c Locator, InteractionError> {
        if chain.len() == 1 {
            return Ok(chain.primary());
        }
        let (locator, _) = self.first_match(chain, true, policy).await?;
        Ok(locator)
    }

    /// Each poll tries every entry of `chain` in order.
    async fn first_match<'c>(
        &self,
        chain: &'c LocatorChain,
        visible: bool,
        policy: Option<WaitPolicy>,
    ) -> Result<(&'c Locator, D::Element), InteractionError> {
        let driver = &self.driver;
        let seen = AtomicBool::new(false);
        let seen_ref = &seen;
        let (index, element) = poll_until(self.resolve(policy), move || async move {
            for (index, locator) in chain.as_slice().iter().enumerate() {
                let found = if visible {
                    displayed(driver, locator, seen_ref).await?
                } else {
                    present(driver, locator).await?
                };
                if let Some(element) = found {
                    return Ok(Some((index, element)));
                }
            }
            Ok::<_, InteractionError>(None)
        })
        .await
        .map_err(|e| match e {
            PollError::Timeout { elapsed } if seen.load(Ordering::Relaxed) => {
                InteractionError::VisibilityTimeout {
                    locator: chain.primary().clone(),
                    elapsed,
                }
            }
            PollError::Timeout { elapsed } => InteractionError::LocateTimeout {
                locator: chain.primary().clone(),
                elapsed,
            },
            PollError::Probe(e) => e,
        })?;

        let locator = &chain.as_slice()[index];
        if index > 0 {
            info!(
                target: "browser.engine",
                primary = %chain.primary(),
                fallback = %locator,
                "primary locator missing; matched fallback"
            );
        }
        Ok((locator, element))
    }

    /// Wait until `condition` holds.
    pub async fn wait_until(
        &self,
        condition: &Condition,
        policy: Option<WaitPolicy>,
    ) -> Result<(), InteractionError> {
        let driver = &self.driver;
        poll_until(self.resolve(policy), move || async move {
            check(driver, condition).await
        })
        .await
        .map_err(|e| match e {
            PollError::Timeout { elapsed } => InteractionError::ConditionTimeout {
                condition: condition.to_string(),
                elapsed,
            },
            PollError::Probe(e) => e,
        })
    }

    /// Number of elements matching `locator` right now; no waiting.
    pub async fn count(&self, locator: &Locator) -> Result<usize, InteractionError> {
        Ok(self.driver.find_elements(locator).await?.len())
    }

    /// Count of the first entry of `chain` that matches anything right now,
    /// or zero.
    pub async fn count_any(&self, chain: &LocatorChain) -> Result<usize, InteractionError> {
        for locator in chain.as_slice() {
            let found = self.count(locator).await?;
            if found > 0 {
                return Ok(found);
            }
        }
        Ok(0)
    }

    /// Locate a visible element and click it natively.
    ///
    /// Fails with `NotInteractable` when the browser rejects the click, for
    /// example because another element covers the target.
    pub async fn click(
        &self,
        locator: &Locator,
        policy: Option<WaitPolicy>,
    ) -> Result<(), InteractionError> {
        debug!(target: "browser.engine", %locator, "click");
        self.act(locator, policy, NativeClick).await
    }

    /// Locate a visible element and click it by injecting a DOM click event.
    ///
    /// This skips the browser's hit-testing, so it succeeds when a banner or
    /// sticky header overlaps the target. A real user could not click an
    /// occluded element, so use it only for known, harmless overlays. The
    /// element must still be displayed, and every forced click is logged at
    /// `info` so a real layout regression remains visible in the run log.
    pub async fn force_click(
        &self,
        locator: &Locator,
        policy: Option<WaitPolicy>,
    ) -> Result<(), InteractionError> {
        info!(
            target: "browser.engine",
            %locator,
            "forced click bypasses native interactability checks"
        );
        self.act(locator, policy, ScriptClick).await
    }

    /// Locate a visible input and type `text` into it.
    pub async fn type_text(
        &self,
        locator: &Locator,
        text: &str,
        options: TypeOptions,
        policy: Option<WaitPolicy>,
    ) -> Result<(), InteractionError> {
        debug!(target: "browser.engine", %locator, submit = options.submit, "type");
        self.act(locator, policy, SendText { text, options }).await
    }

    pub async fn read_text(
        &self,
        locator: &Locator,
        policy: Option<WaitPolicy>,
    ) -> Result<String, InteractionError> {
        self.act(locator, policy, ReadText).await
    }

    pub async fn read_attribute(
        &self,
        locator: &Locator,
        name: &str,
        policy: Option<WaitPolicy>,
    ) -> Result<Option<String>, InteractionError> {
        self.act(locator, policy, ReadAttribute(name)).await
    }

    /// Best-effort scroll that centers `element` in the viewport, to wake
    /// lazy-loading observers. Failures are logged, never raised.
    pub async fn scroll_into_view(&self, element: &D::Element) {
        if let Err(e) = self
            .driver
            .execute_script(scripts::SCROLL_INTO_VIEW, Some(element))
            .await
        {
            debug!(target: "browser.engine", error = %e, "scroll into view failed; continuing");
        }
    }

    /// Perform `action` on an element that may legitimately be missing.
    ///
    /// Returns `Ok(false)` when the element does not show up visible within
    /// the budget, or vanishes before the action lands; the page is then
    /// already in its final state. Returns `Ok(true)` once the action was
    /// performed. Failures of the action itself are errors.
    pub async fn try_optional_action(
        &self,
        locator: &Locator,
        action: Action,
        policy: Option<WaitPolicy>,
    ) -> Result<bool, InteractionError> {
        let policy = self.resolve(policy);
        let element = match self.locate_visible(locator, Some(policy)).await {
            Ok(element) => element,
            Err(e) if is_absence(&e) => {
                debug!(target: "browser.engine", %locator, "optional element absent");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let acted = match action {
            Action::ScrollIntoView => {
                self.scroll_into_view(&element).await;
                true
            }
            Action::Click => self.act_on_optional(locator, policy, element, NativeClick).await?,
            Action::ForceClick => {
                info!(
                    target: "browser.engine",
                    %locator,
                    "forced click bypasses native interactability checks"
                );
                self.act_on_optional(locator, policy, element, ScriptClick).await?
            }
        };
        if acted {
            debug!(target: "browser.engine", %locator, ?action, "optional action performed");
        } else {
            debug!(target: "browser.engine", %locator, ?action, "optional element vanished");
        }
        Ok(acted)
    }

    /// [`try_optional_action`](Self::try_optional_action) over a fallback
    /// chain: the first visible entry is acted on.
    pub async fn try_optional_action_any(
        &self,
        chain: &LocatorChain,
        action: Action,
        policy: Option<WaitPolicy>,
    ) -> Result<bool, InteractionError> {
        let policy = self.resolve(policy);
        match self.resolve_visible_chain(chain, Some(policy)).await {
            Ok(locator) => self.try_optional_action(locator, action, Some(policy)).await,
            Err(e) if is_absence(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Run `op` on the handle that was just located. A stale handle is
    /// re-located; if the element is gone by then, that is `Ok(false)`.
    async fn act_on_optional<O>(
        &self,
        locator: &Locator,
        policy: WaitPolicy,
        element: D::Element,
        op: O,
    ) -> Result<bool, InteractionError>
    where
        O: ElementOp<D>,
    {
        match op.apply(&self.driver, &element).await {
            Ok(_) => Ok(true),
            Err(DriverError::StaleElement) => {
                drop(element);
                match self.act(locator, Some(policy), op).await {
                    Ok(_) => Ok(true),
                    Err(e) if is_absence(&e) => Ok(false),
                    Err(e) => Err(e),
                }
            }
            Err(DriverError::NotInteractable(reason)) => Err(InteractionError::NotInteractable {
                locator: locator.clone(),
                reason,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Locate, then run `op`; a stale handle is re-located up to the
    /// engine's stale-retry budget.
    async fn act<O>(
        &self,
        locator: &Locator,
        policy: Option<WaitPolicy>,
        op: O,
    ) -> Result<O::Output, InteractionError>
    where
        O: ElementOp<D>,
    {
        let policy = self.resolve(policy);
        let mut stale = 0u32;
        loop {
            let element = if op.needs_visibility() {
                self.locate_visible(locator, Some(policy)).await?
            } else {
                self.locate(locator, Some(policy)).await?
            };

            match op.apply(&self.driver, &element).await {
                Ok(output) => return Ok(output),
                Err(DriverError::StaleElement) => {
                    stale += 1;
                    if stale > self.stale_retries {
                        return Err(InteractionError::StaleReference {
                            locator: locator.clone(),
                            attempts: stale,
                        });
                    }
                    warn!(target: "browser.engine", %locator, attempt = stale, "stale element; re-locating");
                }
                Err(DriverError::NotInteractable(reason)) => {
                    return Err(InteractionError::NotInteractable {
                        locator: locator.clone(),
                        reason,
                    })
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn is_absence(err: &InteractionError) -> bool {
    matches!(
        err,
        InteractionError::LocateTimeout { .. } | InteractionError::VisibilityTimeout { .. }
    )
}

async fn present<D: Driver>(
    driver: &D,
    locator: &Locator,
) -> Result<Option<D::Element>, InteractionError> {
    match driver.find_element(locator).await {
        Ok(element) => Ok(Some(element)),
        Err(e) if e.is_transient() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn displayed<D: Driver>(
    driver: &D,
    locator: &Locator,
    seen: &AtomicBool,
) -> Result<Option<D::Element>, InteractionError> {
    let Some(element) = present(driver, locator).await? else {
        return Ok(None);
    };
    seen.store(true, Ordering::Relaxed);
    match driver.is_displayed(&element).await {
        Ok(true) => Ok(Some(element)),
        Ok(false) => Ok(None),
        Err(e) if e.is_transient() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn check<D: Driver>(driver: &D, condition: &Condition) -> Result<Option<()>, InteractionError> {
    let held = match condition {
        Condition::Located(locator) => present(driver, locator).await?.is_some(),
        Condition::Visible(locator) => {
            displayed(driver, locator, &AtomicBool::new(false)).await?.is_some()
        }
        Condition::UrlContains(needle) => driver.current_url().await?.contains(needle.as_str()),
        Condition::TitleContains(needle) => driver.title().await?.contains(needle.as_str()),
    };
    Ok(held.then_some(()))
}

/// One driver interaction on a freshly located element.
#[async_trait]
trait ElementOp<D: Driver>: Send + Sync {
    type Output: Send;

    fn needs_visibility(&self) -> bool {
        true
    }

    async fn apply(&self, driver: &D, element: &D::Element) -> Result<Self::Output, DriverError>;
}

struct NativeClick;
struct ScriptClick;
struct SendText<'a> {
    text: &'a str,
    options: TypeOptions,
}
struct ReadText;
struct ReadAttribute<'a>(&'a str);

#[async_trait]
impl<D: Driver> ElementOp<D> for NativeClick {
    type Output = ();

    async fn apply(&self, driver: &D, element: &D::Element) -> Result<(), DriverError> {
        driver.click(element).await
    }
}

#[async_trait]
impl<D: Driver> ElementOp<D> for ScriptClick {
    type Output = ();

    async fn apply(&self, driver: &D, element: &D::Element) -> Result<(), DriverError> {
        driver
            .execute_script(scripts::FORCE_CLICK, Some(element))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl<'a, D: Driver> ElementOp<D> for SendText<'a> {
    type Output = ();

    async fn apply(&self, driver: &D, element: &D::Element) -> Result<(), DriverError> {
        if self.options.mode == TypeMode::Replace {
            driver.clear(element).await?;
        }
        driver.send_keys(element, self.text).await?;
        if self.options.submit {
            driver.send_keys(element, scripts::ENTER_KEY).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<D: Driver> ElementOp<D> for ReadText {
    type Output = String;

    fn needs_visibility(&self) -> bool {
        false
    }

    async fn apply(&self, driver: &D, element: &D::Element) -> Result<String, DriverError> {
        driver.text(element).await
    }
}

#[async_trait]
impl<'a, D: Driver> ElementOp<D> for ReadAttribute<'a> {
    type Output = Option<String>;

    fn needs_visibility(&self) -> bool {
        false
    }

    async fn apply(
        &self,
        driver: &D,
        element: &D::Element,
    ) -> Result<Option<String>, DriverError> {
        driver.attribute(element, self.0).await
    }
}
