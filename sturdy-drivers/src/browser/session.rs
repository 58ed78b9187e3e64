//! Scoped browser sessions.
//!
//! A session belongs to exactly one scenario. [`run_scoped`] quits it on
//! every exit path: success, error and panic.

use std::panic::AssertUnwindSafe;

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use sturdy_config::SturdyConfig;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::browser::driver::{Driver, WebDriverSession};
use crate::browser::engine::{EngineTuning, InteractionEngine};

/// Run `scenario` against `engine`, then quit the driver no matter how the
/// scenario ended. Panics are resumed after the driver has been quit.
///
/// A failed quit is returned as the error only when the scenario itself
/// succeeded; otherwise it is logged and the scenario's error wins.
pub async fn run_scoped<D, T, F>(engine: InteractionEngine<D>, scenario: F) -> Result<T>
where
    D: Driver,
    F: for<'e> FnOnce(&'e InteractionEngine<D>) -> BoxFuture<'e, Result<T>>,
{
    let session_id = Uuid::new_v4();
    let span = info_span!(target: "browser.session", "session", %session_id);

    async move {
        info!(target: "browser.session", "session started");
        let outcome = AssertUnwindSafe(scenario(&engine)).catch_unwind().await;
        let quit = engine.driver().quit().await;

        match (outcome, quit) {
            (Ok(result), Ok(())) => {
                info!(target: "browser.session", ok = result.is_ok(), "session closed");
                result
            }
            (Ok(Ok(_)), Err(e)) => Err(anyhow::anyhow!("failed to quit browser session: {e}")),
            (Ok(Err(scenario_err)), Err(e)) => {
                warn!(target: "browser.session", error = %e, "failed to quit browser session");
                Err(scenario_err)
            }
            (Err(panic), quit) => {
                if let Err(e) = quit {
                    warn!(target: "browser.session", error = %e, "failed to quit browser session");
                }
                warn!(target: "browser.session", "scenario panicked; session closed");
                std::panic::resume_unwind(panic)
            }
        }
    }
    .instrument(span)
    .await
}

/// Connect a fresh WebDriver session from `config` and run `scenario` in it.
pub async fn with_webdriver_session<T, F>(config: &SturdyConfig, scenario: F) -> Result<T>
where
    F: for<'e> FnOnce(&'e InteractionEngine<WebDriverSession>) -> BoxFuture<'e, Result<T>>,
{
    let tuning = EngineTuning::try_from(config)?;
    let driver = WebDriverSession::connect(&config.browser).await?;
    run_scoped(InteractionEngine::with_tuning(driver, tuning), scenario).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{FixtureNode, FixturePage};
    use sturdy_common::Locator;
    use sturdy_config::SturdyConfigLoader;

    #[tokio::test(start_paused = true)]
    async fn quits_after_success() {
        let page = FixturePage::new("https://fixture.test/").with(
            FixtureNode::new(Locator::css(".bstn-hl-link")).text("Manchete do dia"),
        );

        let text = run_scoped(InteractionEngine::new(page.clone()), |engine| {
            Box::pin(async move {
                Ok(engine
                    .read_text(&Locator::css(".bstn-hl-link"), None)
                    .await?)
            })
        })
        .await
        .unwrap();

        assert_eq!(text, "Manchete do dia");
        assert_eq!(page.quit_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn quits_after_failure() {
        let page = FixturePage::new("https://fixture.test/");

        let result: Result<()> = run_scoped(InteractionEngine::new(page.clone()), |engine| {
            Box::pin(async move {
                engine.click(&Locator::css("#missing"), None).await?;
                Ok(())
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(page.quit_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn quits_after_panic() {
        let page = FixturePage::new("https://fixture.test/");
        let engine = InteractionEngine::new(page.clone());

        let outcome = AssertUnwindSafe(run_scoped(engine, |_engine| {
            Box::pin(async move {
                let count = 19;
                assert!(count >= 20, "expected at least 20 teams");
                Ok(())
            })
        }))
        .catch_unwind()
        .await;

        assert!(outcome.is_err());
        assert_eq!(page.quit_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn quit_failure_surfaces_after_success() {
        let page = FixturePage::new("https://fixture.test/");
        page.disconnect();

        let result = run_scoped(InteractionEngine::new(page.clone()), |_engine| {
            Box::pin(async move { Ok(()) })
        })
        .await;

        assert!(result.unwrap_err().to_string().contains("failed to quit"));
    }

    #[tokio::test]
    async fn invalid_budgets_are_rejected_before_connecting() {
        let mut config = SturdyConfigLoader::new()
            .with_yaml_str("browser: { webdriver_url: 'http://127.0.0.1:9' }\npages: {}")
            .load()
            .unwrap();
        config.wait.timeout_ms = 0;

        let err = with_webdriver_session(&config, |_engine| Box::pin(async move { Ok(()) }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("wait policy"), "{err}");
    }
}
