//! Counting rows of a table that renders progressively.
//!
//! Tables on the target pages render their rows only once scrolled into
//! view, and some show only the first entries until an "expand" control is
//! clicked. Counting them is a convergence procedure:
//!
//! 1. locate the container and scroll it into view,
//! 2. let the row count settle,
//! 3. click the expand control if it is there,
//! 4. let the row count settle again,
//! 5. count.
//!
//! The whole procedure is repeated while the count is below the plan's
//! minimum, up to the engine's attempt budget.
//!
//! Container, rows and expand control are fallback chains. Rows are counted
//! with the first entry of their chain that matches anything.

use std::time::Duration;

use sturdy_common::{InteractionError, LocatorChain};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::browser::driver::Driver;
use crate::browser::engine::{Action, InteractionEngine};
use crate::browser::wait::WaitPolicy;

/// What to count and what counts as plausible.
#[derive(Debug, Clone, Copy)]
pub struct RowCountPlan<'a> {
    pub container: &'a LocatorChain,
    pub rows: &'a LocatorChain,
    /// Control that reveals the remaining rows, when the table has one.
    pub expand: Option<&'a LocatorChain>,
    /// Counts below this are retried, then reported as implausible.
    pub minimum: usize,
    /// Overrides the engine's attempt budget.
    pub attempts: Option<u32>,
}

impl<'a> RowCountPlan<'a> {
    pub fn new(container: &'a LocatorChain, rows: &'a LocatorChain) -> Self {
        Self {
            container,
            rows,
            expand: None,
            minimum: 0,
            attempts: None,
        }
    }

    pub fn expand_with(mut self, control: &'a LocatorChain) -> Self {
        self.expand = Some(control);
        self
    }

    pub fn at_least(mut self, minimum: usize) -> Self {
        self.minimum = minimum;
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts.max(1));
        self
    }
}

impl<D: Driver> InteractionEngine<D> {
    /// Count the rows described by `plan`, expanding and retrying as needed.
    ///
    /// `policy` bounds locating the container. Running this again on an
    /// already expanded table returns the same count: the expand control is
    /// gone, so that step is a no-op.
    pub async fn count_rows(
        &self,
        plan: &RowCountPlan<'_>,
        policy: Option<WaitPolicy>,
    ) -> Result<usize, InteractionError> {
        let attempts = plan.attempts.unwrap_or_else(|| self.row_attempts());
        let mut found = 0;

        for attempt in 1..=attempts {
            found = self.count_rows_once(plan, policy).await?;
            if found >= plan.minimum {
                info!(target: "browser.engine", rows = %plan.rows.primary(), found, attempt, "rows counted");
                return Ok(found);
            }
            warn!(
                target: "browser.engine",
                rows = %plan.rows.primary(),
                found,
                minimum = plan.minimum,
                attempt,
                "row count below minimum; repeating the whole procedure"
            );
        }

        Err(InteractionError::ImplausibleCount {
            rows: plan.rows.primary().clone(),
            found,
            minimum: plan.minimum,
            attempts,
        })
    }

    async fn count_rows_once(
        &self,
        plan: &RowCountPlan<'_>,
        policy: Option<WaitPolicy>,
    ) -> Result<usize, InteractionError> {
        let container = self.locate_any(plan.container, policy).await?;
        self.scroll_into_view(&container).await;
        drop(container);

        let before = self.settle_rows(plan.rows, None).await?;

        if let Some(expand) = plan.expand {
            let probe = self.settle_policy().as_wait_policy();
            if self
                .try_optional_action_any(expand, Action::ForceClick, Some(probe))
                .await?
            {
                self.settle_rows(plan.rows, Some(before)).await?;
            }
        }

        self.count_any(plan.rows).await
    }

    /// Sample the row count until two consecutive samples agree on a
    /// non-zero value that differs from `changed_from`, or the settle budget
    /// runs out. Returns the last sample.
    async fn settle_rows(
        &self,
        rows: &LocatorChain,
        changed_from: Option<usize>,
    ) -> Result<usize, InteractionError> {
        let settle = self.settle_policy();
        let start = Instant::now();
        let mut last = self.count_any(rows).await?;

        loop {
            let elapsed = start.elapsed();
            if elapsed >= settle.max {
                debug!(target: "browser.engine", rows = %rows.primary(), count = last, ?elapsed, "settle budget spent");
                return Ok(last);
            }
            sleep(settle.poll_interval.min(settle.max - elapsed).max(Duration::from_millis(1))).await;

            let current = self.count_any(rows).await?;
            let stable = current == last && current > 0 && changed_from != Some(current);
            if stable {
                return Ok(current);
            }
            last = current;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::wait::SettlePolicy;
    use crate::fixture::{Effect, FixtureEvent, FixtureNode, FixturePage};
    use sturdy_common::Locator;

    fn table() -> Locator {
        Locator::css(".post-tabela-classificacao__table")
    }

    fn rows() -> Locator {
        Locator::css(".post-tabela-classificacao__table tbody tr")
    }

    fn expand() -> Locator {
        Locator::css(".post-tabela-classificacao__ver-mais")
    }

    fn row() -> FixtureNode {
        FixtureNode::new(rows())
    }

    fn chain(locator: Locator) -> LocatorChain {
        LocatorChain::from(locator)
    }

    /// 10 rows up front, 15 more behind the expand control.
    fn collapsed_table() -> FixturePage {
        FixturePage::new("https://fixture.test/")
            .with(FixtureNode::new(table()))
            .with_repeated(row(), 10)
            .with(FixtureNode::new(expand()).on_click(Effect::Expand {
                node: Box::new(row()),
                count: 15,
            }))
    }

    #[tokio::test(start_paused = true)]
    async fn expansion_is_triggered_before_counting() {
        let page = collapsed_table();
        let engine = InteractionEngine::new(page.clone());
        let (table, rows, more) = (chain(table()), chain(rows()), chain(expand()));
        let plan = RowCountPlan::new(&table, &rows).expand_with(&more);

        assert_eq!(engine.count_rows(&plan, None).await.unwrap(), 25);
        assert!(page.events().contains(&FixtureEvent::ForceClicked(expand())));
    }

    #[tokio::test(start_paused = true)]
    async fn counting_twice_is_idempotent() {
        let page = collapsed_table();
        let engine = InteractionEngine::new(page.clone());
        let (table, rows, more) = (chain(table()), chain(rows()), chain(expand()));
        let plan = RowCountPlan::new(&table, &rows).expand_with(&more).at_least(20);

        let first = engine.count_rows(&plan, None).await.unwrap();
        let second = engine.count_rows(&plan, None).await.unwrap();

        assert_eq!(first, 25);
        assert_eq!(second, 25);
        let expansions = page
            .events()
            .into_iter()
            .filter(|e| matches!(e, FixtureEvent::ForceClicked(_)))
            .count();
        assert_eq!(expansions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lazy_rows_are_revealed_by_scrolling() {
        let page = FixturePage::new("https://fixture.test/")
            .with(FixtureNode::new(table()))
            .with_repeated(row().lazy(Duration::from_millis(200)), 20);
        let engine = InteractionEngine::new(page.clone());
        let (table, rows) = (chain(table()), chain(rows()));
        let plan = RowCountPlan::new(&table, &rows).at_least(20);

        assert_eq!(engine.count_rows(&plan, None).await.unwrap(), 20);
        assert!(page
            .events()
            .contains(&FixtureEvent::Scrolled(table.primary().clone())));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_render_is_retried_as_a_whole() {
        let page = FixturePage::new("https://fixture.test/")
            .with(FixtureNode::new(table()))
            .with_repeated(row().lazy(Duration::from_millis(1_500)), 20);
        let engine = InteractionEngine::new(page.clone()).with_settle_policy(SettlePolicy {
            max: Duration::from_millis(1_000),
            poll_interval: Duration::from_millis(100),
        });
        let (table, rows) = (chain(table()), chain(rows()));
        let plan = RowCountPlan::new(&table, &rows).at_least(20).attempts(3);

        assert_eq!(engine.count_rows(&plan, None).await.unwrap(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn implausible_count_is_reported_after_budget() {
        let page = FixturePage::new("https://fixture.test/")
            .with(FixtureNode::new(table()))
            .with_repeated(row(), 12);
        let engine = InteractionEngine::new(page.clone()).with_row_attempts(2);
        let (table, rows) = (chain(table()), chain(rows()));
        let plan = RowCountPlan::new(&table, &rows).at_least(20);

        let err = engine.count_rows(&plan, None).await.unwrap_err();
        assert_eq!(
            err,
            InteractionError::ImplausibleCount {
                rows: rows.primary().clone(),
                found: 12,
                minimum: 20,
                attempts: 2,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rows_are_counted_with_first_matching_fallback() {
        let old_rows = Locator::css(".old-tbl tbody tr");
        let new_rows = Locator::css(".tbl tbody tr");
        let new_expand = Locator::css(".tbl__more");
        let page = FixturePage::new("https://fixture.test/")
            .with(FixtureNode::new(Locator::css(".tbl")))
            .with_repeated(FixtureNode::new(new_rows.clone()), 12)
            .with(FixtureNode::new(new_expand.clone()).on_click(Effect::Expand {
                node: Box::new(FixtureNode::new(new_rows.clone())),
                count: 8,
            }));
        let engine = InteractionEngine::new(page.clone()).with_row_attempts(1);
        let table = LocatorChain::new(vec![Locator::css(".old-tbl"), Locator::css(".tbl")]).unwrap();
        let rows = LocatorChain::new(vec![old_rows, new_rows]).unwrap();
        let expand =
            LocatorChain::new(vec![Locator::css(".old-tbl__more"), new_expand.clone()]).unwrap();
        let plan = RowCountPlan::new(&table, &rows)
            .expand_with(&expand)
            .at_least(20);

        assert_eq!(engine.count_rows(&plan, None).await.unwrap(), 20);
        assert!(page.events().contains(&FixtureEvent::ForceClicked(new_expand)));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_container_is_a_locate_timeout() {
        let page = FixturePage::new("https://fixture.test/");
        let engine = InteractionEngine::new(page);
        let (table, rows) = (chain(table()), chain(rows()));
        let plan = RowCountPlan::new(&table, &rows);

        let err = engine
            .count_rows(&plan, Some(WaitPolicy::from_millis(300, 50).unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, InteractionError::LocateTimeout { .. }));
    }
}
