use sturdy_common::{InteractionError, LocatorChain, Result};
use sturdy_config::PageSpec;
use sturdy_drivers::browser::driver::Driver;
use sturdy_drivers::browser::engine::{Action, InteractionEngine, TypeOptions};
use sturdy_drivers::browser::rows::RowCountPlan;
use tracing::{info, warn};

use crate::required;
use crate::text::normalize_headline;

pub const PAGE: &str = "home";

pub const SEARCH_INPUT: &str = "search_input";
pub const SEARCH_TOGGLE: &str = "search_toggle";
pub const TEAM_SHIELD: &str = "team_shield";
pub const STANDINGS_TABLE: &str = "standings_table";
pub const STANDINGS_ROWS: &str = "standings_rows";
pub const STANDINGS_EXPAND: &str = "standings_expand";
pub const MAIN_HEADLINE: &str = "main_headline";
pub const ARTICLE_TITLE: &str = "article_title";

/// The site's home page, plus the article it links to from its main headline.
///
/// `search_toggle` and `standings_expand` are optional: the search field is
/// sometimes behind a magnifier button, and the standings table is sometimes
/// collapsed. Every other locator must be configured.
pub struct HomePage<'e, D: Driver> {
    engine: &'e InteractionEngine<D>,
    url: &'e str,
    search_input: &'e LocatorChain,
    search_toggle: Option<&'e LocatorChain>,
    team_shield: &'e LocatorChain,
    standings_table: &'e LocatorChain,
    standings_rows: &'e LocatorChain,
    standings_expand: Option<&'e LocatorChain>,
    main_headline: &'e LocatorChain,
    article_title: &'e LocatorChain,
}

impl<'e, D: Driver> HomePage<'e, D> {
    pub fn new(engine: &'e InteractionEngine<D>, spec: &'e PageSpec) -> Result<Self> {
        Ok(Self {
            engine,
            url: &spec.url,
            search_input: required(spec, PAGE, SEARCH_INPUT)?,
            search_toggle: spec.locator(SEARCH_TOGGLE),
            team_shield: required(spec, PAGE, TEAM_SHIELD)?,
            standings_table: required(spec, PAGE, STANDINGS_TABLE)?,
            standings_rows: required(spec, PAGE, STANDINGS_ROWS)?,
            standings_expand: spec.locator(STANDINGS_EXPAND),
            main_headline: required(spec, PAGE, MAIN_HEADLINE)?,
            article_title: required(spec, PAGE, ARTICLE_TITLE)?,
        })
    }

    pub async fn visit(&self) -> Result<()> {
        info!(target: "pages.home", url = self.url, "visiting home page");
        Ok(self.engine.navigate(self.url).await?)
    }

    /// Type `term` into the search field and submit it.
    pub async fn search_for(&self, term: &str) -> Result<()> {
        if let Some(toggle) = self.search_toggle {
            let probe = self.engine.settle_policy().as_wait_policy();
            self.engine
                .try_optional_action_any(toggle, Action::Click, Some(probe))
                .await?;
        }
        let input = self
            .engine
            .resolve_visible_chain(self.search_input, None)
            .await?;
        info!(target: "pages.home", term, "searching");
        self.engine
            .type_text(input, term, TypeOptions::default().and_submit(), None)
            .await?;
        Ok(())
    }

    /// Open the team page through its shield in the clubs mosaic.
    ///
    /// The mosaic sits under the sticky site header on some viewports. When
    /// the native click is intercepted the click is forced instead.
    pub async fn click_team_shield(&self) -> Result<()> {
        let shield = self
            .engine
            .resolve_visible_chain(self.team_shield, None)
            .await?;
        match self.engine.click(shield, None).await {
            Err(InteractionError::NotInteractable { reason, .. }) => {
                warn!(target: "pages.home", %shield, %reason, "shield click intercepted; forcing");
                Ok(self.engine.force_click(shield, None).await?)
            }
            other => Ok(other?),
        }
    }

    /// Number of rows in the standings table once it has fully rendered.
    ///
    /// Counts below `minimum` are retried and finally reported as
    /// [`InteractionError::ImplausibleCount`]. Rows are counted with the
    /// first configured row locator that matches.
    pub async fn table_rows_count(&self, minimum: usize) -> Result<usize> {
        let mut plan =
            RowCountPlan::new(self.standings_table, self.standings_rows).at_least(minimum);
        if let Some(expand) = self.standings_expand {
            plan = plan.expand_with(expand);
        }
        let count = self.engine.count_rows(&plan, None).await?;
        info!(target: "pages.home", count, "standings rows");
        Ok(count)
    }

    /// Text of the top headline, whitespace-normalized.
    pub async fn main_headline_text(&self) -> Result<String> {
        let headline = self.engine.resolve_chain(self.main_headline, None).await?;
        let text = self.engine.read_text(headline, None).await?;
        Ok(normalize_headline(&text))
    }

    pub async fn click_main_headline(&self) -> Result<()> {
        let headline = self
            .engine
            .resolve_visible_chain(self.main_headline, None)
            .await?;
        Ok(self.engine.click(headline, None).await?)
    }

    /// Title of the article currently open, whitespace-normalized.
    pub async fn article_title(&self) -> Result<String> {
        let title = self.engine.resolve_chain(self.article_title, None).await?;
        let text = self.engine.read_text(title, None).await?;
        Ok(normalize_headline(&text))
    }
}
