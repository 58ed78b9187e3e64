//! Loader for suite configuration with YAML + environment overlays.
//!
//! A configuration file describes how to reach the WebDriver endpoint, the
//! default wait/settle budgets of the interaction engine, and one locator
//! table per target page. Selectors live here rather than in page-object
//! code so markup drift on the target site is a configuration change.
//!
//! Precedence: `STURDY__`-prefixed environment variables override file
//! values (`STURDY__WAIT__TIMEOUT_MS=20000`), and `${VAR}` placeholders in
//! any string are expanded after merging.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use sturdy_common::LocatorChain;
use sturdy_common::observability::{LogConfig, LogFormat};
use url::Url;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct SturdyConfig {
    pub version: Option<String>,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub wait: WaitSettings,
    #[serde(default)]
    pub settle: SettleSettings,
    #[serde(default)]
    pub row_count: RowCountSettings,
    /// How many times a stale element is re-located before giving up.
    #[serde(default = "default_stale_retries")]
    pub stale_retries: u32,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub pages: HashMap<String, PageSpec>,
}

impl SturdyConfig {
    /// Look up a page by name.
    pub fn page(&self, name: &str) -> Result<&PageSpec, ConfigError> {
        self.pages
            .get(name)
            .ok_or_else(|| ConfigError::NotFound(format!("pages.{name}")))
    }
}

/// WebDriver endpoint and Chrome launch arguments.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_browser_args")]
    pub args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            headless: false,
            args: default_browser_args(),
        }
    }
}

/// Default wait policy of the engine.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WaitSettings {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Upper bound for waiting on a lazily rendered region to stop changing.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SettleSettings {
    #[serde(default = "default_settle_max_ms")]
    pub max_ms: u64,
    #[serde(default = "default_settle_poll_ms")]
    pub poll_interval_ms: u64,
}

impl Default for SettleSettings {
    fn default() -> Self {
        Self {
            max_ms: default_settle_max_ms(),
            poll_interval_ms: default_settle_poll_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RowCountSettings {
    /// Whole-procedure attempts before an implausible count is reported.
    #[serde(default = "default_row_attempts")]
    pub attempts: u32,
}

impl Default for RowCountSettings {
    fn default() -> Self {
        Self {
            attempts: default_row_attempts(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub emit_stderr: bool,
    #[serde(default)]
    pub filter: Option<String>,
}

impl LoggingSettings {
    /// Map onto the tracing initialiser's configuration.
    pub fn to_log_config(&self, app_name: &str) -> LogConfig {
        let defaults = LogConfig::default();
        LogConfig {
            app_name: app_name.to_string(),
            log_dir: self.dir.clone(),
            emit_stderr: self.emit_stderr,
            format: self.format,
            default_filter: self.filter.clone().unwrap_or(defaults.default_filter),
        }
    }
}

/// One target page: where it lives and how to find its elements.
#[derive(Debug, Clone, Deserialize)]
pub struct PageSpec {
    pub url: String,
    #[serde(default)]
    pub locators: HashMap<String, LocatorChain>,
}

impl PageSpec {
    pub fn locator(&self, name: &str) -> Option<&LocatorChain> {
        self.locators.get(name)
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".into()
}
fn default_browser_args() -> Vec<String> {
    vec![
        "--start-maximized".into(),
        "--disable-notifications".into(),
    ]
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_settle_max_ms() -> u64 {
    1_000
}
fn default_settle_poll_ms() -> u64 {
    100
}
fn default_row_attempts() -> u32 {
    3
}
fn default_stale_retries() -> u32 {
    2
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

fn validate(cfg: &SturdyConfig) -> Result<(), ConfigError> {
    Url::parse(&cfg.browser.webdriver_url).map_err(|e| {
        ConfigError::Message(format!(
            "browser.webdriver_url `{}` is not a URL: {e}",
            cfg.browser.webdriver_url
        ))
    })?;

    let budgets = [
        ("wait.timeout_ms", cfg.wait.timeout_ms),
        ("wait.poll_interval_ms", cfg.wait.poll_interval_ms),
        ("settle.max_ms", cfg.settle.max_ms),
        ("settle.poll_interval_ms", cfg.settle.poll_interval_ms),
    ];
    if let Some((key, _)) = budgets.iter().find(|(_, ms)| *ms == 0) {
        return Err(ConfigError::Message(format!("{key} must be greater than zero")));
    }
    if cfg.row_count.attempts == 0 {
        return Err(ConfigError::Message(
            "row_count.attempts must be greater than zero".into(),
        ));
    }
    Ok(())
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct SturdyConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for SturdyConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SturdyConfigLoader {
    /// Start with `STURDY__` env overrides; add files or snippets on top.
    ///
    /// ```
    /// use sturdy_config::SturdyConfigLoader;
    ///
    /// let config = SturdyConfigLoader::new()
    ///     .with_yaml_str("version: '1'\npages: {}")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.wait.timeout_ms, 10_000);
    /// assert!(config.pages.is_empty());
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent, so runs can rely on env alone.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    ///
    /// ```
    /// use sturdy_common::Locator;
    /// use sturdy_config::SturdyConfigLoader;
    ///
    /// let cfg = SturdyConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// pages:
    ///   home:
    ///     url: "https://ge.globo.com"
    ///     locators:
    ///       search_input: { strategy: id, value: busca-campo }
    ///       article_title:
    ///         - { strategy: css, value: h1.content-head__title }
    ///         - { strategy: tag_name, value: h1 }
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// let home = cfg.page("home").unwrap();
    /// assert_eq!(home.locator("search_input").unwrap().primary(), &Locator::id("busca-campo"));
    /// assert_eq!(home.locator("article_title").unwrap().len(), 2);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into strongly typed config.
    ///
    /// `${VAR}` placeholders are expanded before the typed structs are built,
    /// and budgets/URLs are validated.
    ///
    /// ```
    /// use sturdy_config::SturdyConfigLoader;
    ///
    /// unsafe { std::env::set_var("GRID_URL", "http://selenium:4444"); }
    ///
    /// let config = SturdyConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// browser:
    ///   webdriver_url: "${GRID_URL}"
    ///   headless: true
    /// pages: {}
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(config.browser.webdriver_url, "http://selenium:4444");
    /// assert!(config.browser.headless);
    ///
    /// unsafe { std::env::remove_var("GRID_URL"); }
    /// ```
    pub fn load(self) -> Result<SturdyConfig, ConfigError> {
        // Added last so the environment overrides every file and snippet.
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix("STURDY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: SturdyConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        validate(&typed)?;

        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use temp_env;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("SITE", Some("ge.globo.com"), || {
            let mut v = json!("https://${SITE}/busca");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("https://ge.globo.com/busca"));
        });
    }

    #[test]
    fn expands_in_array_and_object() {
        temp_env::with_vars([("HOST", Some("selenium")), ("PORT", Some("4444"))], || {
            let mut v = json!([
                "--proxy-server=$HOST",
                { "webdriver_url": "http://${HOST}:${PORT}" },
                250,
                false,
                null
            ]);
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!([
                    "--proxy-server=selenium",
                    { "webdriver_url": "http://selenium:4444" },
                    250,
                    false,
                    null
                ])
            );
        });
    }

    #[test]
    fn expands_recursively_across_env_values() {
        temp_env::with_vars(
            [
                ("ROOT", Some("globo.com")),
                ("HOST", Some("ge.${ROOT}")),
                ("HOME_URL", Some("https://${HOST}/")),
            ],
            || {
                let mut v = json!("${HOME_URL}");
                expand_env_in_value(&mut v);
                assert_eq!(v, json!("https://ge.globo.com/"));
            },
        );
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${DOES_NOT_EXIST_STURDY}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${DOES_NOT_EXIST_STURDY}"));
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let err = SturdyConfigLoader::new()
            .with_yaml_str("wait: { timeout_ms: 500, poll_interval_ms: 0 }\npages: {}")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("wait.poll_interval_ms"));
    }

    #[test]
    fn rejects_malformed_webdriver_url() {
        let err = SturdyConfigLoader::new()
            .with_yaml_str("browser: { webdriver_url: 'not a url' }\npages: {}")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("webdriver_url"));
    }

    #[test]
    fn missing_page_is_reported_by_name() {
        let cfg = SturdyConfigLoader::new()
            .with_yaml_str("pages: {}")
            .load()
            .unwrap();
        let err = cfg.page("home").unwrap_err();
        assert!(err.to_string().contains("pages.home"));
    }

    #[test]
    fn logging_settings_fill_default_filter() {
        let settings = LoggingSettings {
            format: LogFormat::Json,
            ..LoggingSettings::default()
        };
        let log = settings.to_log_config("sturdy-suite");
        assert_eq!(log.app_name, "sturdy-suite");
        assert_eq!(log.default_filter, "info");
        assert_eq!(log.format, LogFormat::Json);
    }
}
