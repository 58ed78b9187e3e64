//! In-memory [`Driver`] with scripted DOM nodes.
//!
//! A [`FixturePage`] holds a list of [`FixtureNode`]s, each matched by one
//! locator and carrying the behaviour a test needs: delayed
//! appearance or visibility, an overlay that intercepts native clicks, rows
//! that only render after a scroll, handles that go stale, and effects run
//! on click or submit. Timing is measured with `tokio::time`, so tests can
//! run on a paused clock.
//!
//! Clones share state: hand one clone to the engine, keep another to
//! inspect [`events`](FixturePage::events) afterwards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sturdy_common::{DriverError, Locator};
use tokio::time::Instant;

use crate::browser::driver::Driver;
use crate::browser::scripts;

/// Something a node does when clicked or submitted.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Append `count` copies of `node` and remove the clicked node.
    Expand { node: Box<FixtureNode>, count: usize },
    /// Change the current URL, invalidating every handle.
    Navigate(String),
}

/// Interactions the page observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureEvent {
    Navigated(String),
    Clicked(Locator),
    ForceClicked(Locator),
    Cleared(Locator),
    Keys(Locator, String),
    Scrolled(Locator),
    Quit,
}

/// A scripted element.
#[derive(Debug, Clone)]
pub struct FixtureNode {
    locator: Locator,
    text: String,
    value: String,
    attributes: HashMap<String, String>,
    appears_after: Duration,
    visible_after: Option<Duration>,
    lazy_after_scroll: Option<Duration>,
    covered: bool,
    stale_for: u32,
    detaches: bool,
    at_url: Option<String>,
    on_click: Option<Effect>,
    on_submit: Option<Effect>,
    removed: bool,
}

impl FixtureNode {
    pub fn new(locator: Locator) -> Self {
        Self {
            locator,
            text: String::new(),
            value: String::new(),
            attributes: HashMap::new(),
            appears_after: Duration::ZERO,
            visible_after: Some(Duration::ZERO),
            lazy_after_scroll: None,
            covered: false,
            stale_for: 0,
            detaches: false,
            at_url: None,
            on_click: None,
            on_submit: None,
            removed: false,
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Current input value.
    pub fn value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    /// Not in the DOM until `delay` after the page was created.
    pub fn appears_after(mut self, delay: Duration) -> Self {
        self.appears_after = delay;
        self
    }

    /// In the DOM but not displayed until `delay` after the page was created.
    pub fn visible_after(mut self, delay: Duration) -> Self {
        self.visible_after = Some(delay);
        self
    }

    /// In the DOM but never displayed.
    pub fn hidden(mut self) -> Self {
        self.visible_after = None;
        self
    }

    /// Only rendered `delay` after the first scroll-into-view on the page.
    pub fn lazy(mut self, delay: Duration) -> Self {
        self.lazy_after_scroll = Some(delay);
        self
    }

    /// Another element sits on top; native clicks are intercepted.
    pub fn covered(mut self) -> Self {
        self.covered = true;
        self
    }

    /// The next `n` interactions with a handle to this node report a stale
    /// reference. Visibility checks do not count.
    pub fn stale_for(mut self, n: u32) -> Self {
        self.stale_for = n;
        self
    }

    /// Leaves the DOM on the first interaction; that interaction reports a
    /// stale reference.
    pub fn detaches(mut self) -> Self {
        self.detaches = true;
        self
    }

    /// Only present while the current URL starts with `prefix`.
    pub fn at_url(mut self, prefix: &str) -> Self {
        self.at_url = Some(prefix.to_string());
        self
    }

    pub fn on_click(mut self, effect: Effect) -> Self {
        self.on_click = Some(effect);
        self
    }

    /// Run `effect` when Enter is sent to this node.
    pub fn on_submit(mut self, effect: Effect) -> Self {
        self.on_submit = Some(effect);
        self
    }

    fn name(&self) -> Locator {
        self.locator.clone()
    }
}

/// Handle to a node, valid for one render epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureElement {
    index: usize,
    epoch: u64,
}

#[derive(Debug)]
struct FixtureState {
    nodes: Vec<FixtureNode>,
    url: String,
    title: String,
    epoch: u64,
    scrolled_at: Option<Instant>,
    connected: bool,
    quits: usize,
    events: Vec<FixtureEvent>,
}

#[derive(Debug, Clone)]
pub struct FixturePage {
    state: Arc<Mutex<FixtureState>>,
    origin: Instant,
}

impl FixturePage {
    pub fn new(url: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(FixtureState {
                nodes: Vec::new(),
                url: url.to_string(),
                title: String::new(),
                epoch: 0,
                scrolled_at: None,
                connected: true,
                quits: 0,
                events: Vec::new(),
            })),
            origin: Instant::now(),
        }
    }

    pub fn with(self, node: FixtureNode) -> Self {
        self.lock().nodes.push(node);
        self
    }

    pub fn with_repeated(self, node: FixtureNode, count: usize) -> Self {
        self.lock()
            .nodes
            .extend(std::iter::repeat(node).take(count));
        self
    }

    pub fn titled(self, title: &str) -> Self {
        self.lock().title = title.to_string();
        self
    }

    /// Make every further command fail as if the session were gone.
    pub fn disconnect(&self) {
        self.lock().connected = false;
    }

    pub fn events(&self) -> Vec<FixtureEvent> {
        self.lock().events.clone()
    }

    pub fn quit_count(&self) -> usize {
        self.lock().quits
    }

    /// Input value of the first node matching `locator`.
    pub fn value_of(&self, locator: &Locator) -> Option<String> {
        self.lock()
            .nodes
            .iter()
            .find(|n| !n.removed && &n.locator == locator)
            .map(|n| n.value.clone())
    }

    fn lock(&self) -> MutexGuard<'_, FixtureState> {
        // A panicking test must not poison the page for its own assertions.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock for a command; fails if the session is gone.
    fn session(&self) -> Result<MutexGuard<'_, FixtureState>, DriverError> {
        let state = self.lock();
        if state.connected {
            Ok(state)
        } else {
            Err(DriverError::Session("fixture session disconnected".into()))
        }
    }

    fn is_present(&self, state: &FixtureState, node: &FixtureNode, now: Instant) -> bool {
        if node.removed || now < self.origin + node.appears_after {
            return false;
        }
        if let Some(prefix) = &node.at_url {
            if !state.url.starts_with(prefix.as_str()) {
                return false;
            }
        }
        match (node.lazy_after_scroll, state.scrolled_at) {
            (None, _) => true,
            (Some(delay), Some(at)) => now >= at + delay,
            (Some(_), None) => false,
        }
    }

    fn matching(&self, state: &FixtureState, locator: &Locator) -> Vec<FixtureElement> {
        let now = Instant::now();
        state
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| &n.locator == locator && self.is_present(state, n, now))
            .map(|(index, _)| FixtureElement {
                index,
                epoch: state.epoch,
            })
            .collect()
    }

    /// Resolve a handle for an interaction, honouring staleness.
    fn interact(state: &mut FixtureState, el: &FixtureElement) -> Result<usize, DriverError> {
        if el.epoch != state.epoch {
            return Err(DriverError::StaleElement);
        }
        let node = state
            .nodes
            .get_mut(el.index)
            .filter(|n| !n.removed)
            .ok_or(DriverError::StaleElement)?;
        if node.detaches {
            node.removed = true;
            return Err(DriverError::StaleElement);
        }
        if node.stale_for > 0 {
            node.stale_for -= 1;
            return Err(DriverError::StaleElement);
        }
        Ok(el.index)
    }

    fn displayed(&self, node: &FixtureNode) -> bool {
        node.visible_after
            .is_some_and(|delay| Instant::now() >= self.origin + delay)
    }

    fn apply(state: &mut FixtureState, index: usize, effect: Option<Effect>) {
        match effect {
            Some(Effect::Expand { node, count }) => {
                state.nodes[index].removed = true;
                state.nodes.extend(std::iter::repeat(*node).take(count));
            }
            Some(Effect::Navigate(url)) => {
                state.url = url.clone();
                state.epoch += 1;
                state.events.push(FixtureEvent::Navigated(url));
            }
            None => {}
        }
    }
}

#[async_trait]
impl Driver for FixturePage {
    type Element = FixtureElement;

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.session()?;
        state.url = url.to_string();
        state.epoch += 1;
        state.scrolled_at = None;
        state.events.push(FixtureEvent::Navigated(url.to_string()));
        Ok(())
    }

    async fn find_element(&self, locator: &Locator) -> Result<FixtureElement, DriverError> {
        let state = self.session()?;
        self.matching(&state, locator)
            .into_iter()
            .next()
            .ok_or(DriverError::NoSuchElement)
    }

    async fn find_elements(&self, locator: &Locator) -> Result<Vec<FixtureElement>, DriverError> {
        let state = self.session()?;
        Ok(self.matching(&state, locator))
    }

    async fn is_displayed(&self, element: &FixtureElement) -> Result<bool, DriverError> {
        let state = self.session()?;
        if element.epoch != state.epoch {
            return Err(DriverError::StaleElement);
        }
        match state.nodes.get(element.index) {
            Some(node) if !node.removed => Ok(self.displayed(node)),
            _ => Err(DriverError::StaleElement),
        }
    }

    async fn click(&self, element: &FixtureElement) -> Result<(), DriverError> {
        let mut state = self.session()?;
        let index = Self::interact(&mut state, element)?;
        let node = &state.nodes[index];
        if !self.displayed(node) {
            return Err(DriverError::NotInteractable("element not visible".into()));
        }
        if node.covered {
            return Err(DriverError::NotInteractable(
                "element click intercepted: another element would receive the click".into(),
            ));
        }
        let (name, effect) = (node.name(), node.on_click.clone());
        state.events.push(FixtureEvent::Clicked(name));
        Self::apply(&mut state, index, effect);
        Ok(())
    }

    async fn clear(&self, element: &FixtureElement) -> Result<(), DriverError> {
        let mut state = self.session()?;
        let index = Self::interact(&mut state, element)?;
        state.nodes[index].value.clear();
        let name = state.nodes[index].name();
        state.events.push(FixtureEvent::Cleared(name));
        Ok(())
    }

    async fn send_keys(&self, element: &FixtureElement, text: &str) -> Result<(), DriverError> {
        let mut state = self.session()?;
        let index = Self::interact(&mut state, element)?;
        let name = state.nodes[index].name();
        state.events.push(FixtureEvent::Keys(name, text.to_string()));
        if text == scripts::ENTER_KEY {
            let effect = state.nodes[index].on_submit.clone();
            Self::apply(&mut state, index, effect);
        } else {
            state.nodes[index].value.push_str(text);
        }
        Ok(())
    }

    async fn text(&self, element: &FixtureElement) -> Result<String, DriverError> {
        let mut state = self.session()?;
        let index = Self::interact(&mut state, element)?;
        Ok(state.nodes[index].text.clone())
    }

    async fn attribute(
        &self,
        element: &FixtureElement,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let mut state = self.session()?;
        let index = Self::interact(&mut state, element)?;
        Ok(state.nodes[index].attributes.get(name).cloned())
    }

    async fn execute_script(
        &self,
        script: &str,
        element: Option<&FixtureElement>,
    ) -> Result<Value, DriverError> {
        let mut state = self.session()?;
        let element =
            element.ok_or_else(|| DriverError::Script("fixture scripts need an element".into()))?;
        let index = Self::interact(&mut state, element)?;
        let name = state.nodes[index].name();

        match script {
            scripts::FORCE_CLICK => {
                let effect = state.nodes[index].on_click.clone();
                state.events.push(FixtureEvent::ForceClicked(name));
                Self::apply(&mut state, index, effect);
            }
            scripts::SCROLL_INTO_VIEW => {
                if state.scrolled_at.is_none() {
                    state.scrolled_at = Some(Instant::now());
                }
                state.events.push(FixtureEvent::Scrolled(name));
            }
            other => return Err(DriverError::Script(format!("unsupported script: {other}"))),
        }
        Ok(Value::Null)
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.session()?.url.clone())
    }

    async fn title(&self) -> Result<String, DriverError> {
        Ok(self.session()?.title.clone())
    }

    async fn quit(&self) -> Result<(), DriverError> {
        let mut state = self.lock();
        state.quits += 1;
        state.events.push(FixtureEvent::Quit);
        if state.connected {
            Ok(())
        } else {
            Err(DriverError::Session("fixture session disconnected".into()))
        }
    }
}
