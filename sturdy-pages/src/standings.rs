use sturdy_common::{LocatorChain, Result};
use sturdy_config::PageSpec;
use sturdy_drivers::browser::driver::Driver;
use sturdy_drivers::browser::engine::InteractionEngine;
use tracing::info;

use crate::required;

pub const PAGE: &str = "f1_standings";
pub const STANDINGS_TABLE: &str = "standings_table";

/// Championship standings article; the table itself is an embedded widget.
pub struct StandingsPage<'e, D: Driver> {
    engine: &'e InteractionEngine<D>,
    url: &'e str,
    standings_table: &'e LocatorChain,
}

impl<'e, D: Driver> StandingsPage<'e, D> {
    pub fn new(engine: &'e InteractionEngine<D>, spec: &'e PageSpec) -> Result<Self> {
        Ok(Self {
            engine,
            url: &spec.url,
            standings_table: required(spec, PAGE, STANDINGS_TABLE)?,
        })
    }

    pub async fn open(&self) -> Result<()> {
        info!(target: "pages.standings", url = self.url, "opening standings");
        Ok(self.engine.navigate(self.url).await?)
    }

    /// Wait until the standings embed is displayed.
    pub async fn await_standings_table(&self) -> Result<()> {
        let table = self
            .engine
            .resolve_visible_chain(self.standings_table, None)
            .await?;
        self.engine.locate_visible(table, None).await?;
        Ok(())
    }

    /// Source URL of the standings embed, if the widget declares one.
    pub async fn standings_embed_source(&self) -> Result<Option<String>> {
        let table = self.engine.resolve_chain(self.standings_table, None).await?;
        Ok(self.engine.read_attribute(table, "data-src", None).await?)
    }
}
