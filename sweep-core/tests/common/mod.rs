#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;

use sweep_core::browser::{
    BrowserError, BrowserResult, DiagnosticSink, Driver, LoadCondition, SessionFactory,
};
use sweep_core::sweep::{
    CatalogNavigator, CatalogRoute, Credentials, OutcomeClassifier, PaginationNavigator,
    RecoveryManager, Renavigate, SiteLogin, SweepRunner, TraversalController,
};
use sweep_core::{SweepConfig, SweepError, SweepResult};

pub const CONFIG: &str = r##"
[site]
base_url = "https://casino.test/"

[selectors]
catalog_entry = ["#slots"]
provider_buttons = ".provider"
pagination_buttons = ".page-btn"
pagination_active = ".page-btn.active"
item_launch_buttons = ".play"
item_names = ".game-name"
item_close = ".close"
failure_toast = ".toast"
back_button = ".back"
logged_in_marker = ".logout"
welcome_popup_close = ".popup-close"

[selectors.login]
open_button = ".login-open"
username_input = "#username"
password_input = "#password"
submit_button = ".login-submit"
modal_close = ".login-close"
"##;

pub fn config() -> SweepConfig {
    let config: SweepConfig = toml::from_str(CONFIG).expect("test config parses");
    config.validate().expect("test config is valid");
    config
}

pub fn config_without_active_page() -> SweepConfig {
    let mut config = config();
    config.selectors.pagination_active = None;
    config
}

pub fn credentials() -> Credentials {
    Credentials::new("tester", "secret")
}

/// What a launch click does to the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    /// The item loads and shows its close button.
    Loads,
    /// The failure toast appears.
    Toast,
    /// Nothing ever shows up.
    Hangs,
    /// The click itself errors.
    Crashes,
}

#[derive(Debug, Clone)]
pub struct FakeProvider {
    pub name: String,
    /// Item count per page.
    pub pages: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct World {
    pub providers: Vec<FakeProvider>,
    pub scripts: HashMap<(String, u32, usize), VecDeque<Launch>>,
    pub login_failures: u32,
    pub failing_creations: u32,
    pub failing_gotos: u32,
    /// Applied on the next page load, as if the provider's list changed.
    pub pending_layout: Option<(String, Vec<usize>)>,
    pub hide_back_button: bool,
    pub launches: Vec<(String, u32, usize)>,
    pub page_clicks: Vec<String>,
    pub sessions_created: u32,
    pub sessions_closed: u32,
    pub cookie_clears: u32,
    pub storage_clears: u32,
    pub login_submits: u32,
    pub logins: u32,
    pub screenshots: Vec<PathBuf>,
}

impl World {
    fn provider(&self, index: usize) -> &FakeProvider {
        &self.providers[index]
    }

    fn next_launch(&mut self, key: &(String, u32, usize)) -> Launch {
        self.scripts
            .get_mut(key)
            .and_then(|script| script.pop_front())
            .unwrap_or(Launch::Loads)
    }

    pub fn launches_of(&self, provider: &str, page: u32, index: usize) -> usize {
        self.launches
            .iter()
            .filter(|(p, pg, i)| p == provider && *pg == page && *i == index)
            .count()
    }

    pub fn screenshots_with_prefix(&self, prefix: &str) -> usize {
        self.screenshots
            .iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(prefix))
            })
            .count()
    }
}

/// Scripted in-memory catalog site shared by every fake browser session.
#[derive(Clone, Default)]
pub struct FakeSite {
    world: Rc<RefCell<World>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(self, name: &str, pages: &[usize]) -> Self {
        self.world.borrow_mut().providers.push(FakeProvider {
            name: name.to_string(),
            pages: pages.to_vec(),
        });
        self
    }

    pub fn script(&self, provider: &str, page: u32, index: usize, launches: &[Launch]) {
        self.world
            .borrow_mut()
            .scripts
            .insert((provider.to_string(), page, index), launches.iter().copied().collect());
    }

    pub fn reject_logins(&self, count: u32) {
        self.world.borrow_mut().login_failures = count;
    }

    pub fn fail_session_creations(&self, count: u32) {
        self.world.borrow_mut().failing_creations = count;
    }

    pub fn fail_gotos(&self, count: u32) {
        self.world.borrow_mut().failing_gotos = count;
    }

    /// The next page load serves `provider` with a different page layout.
    pub fn relayout_on_reload(&self, provider: &str, pages: &[usize]) {
        self.world.borrow_mut().pending_layout = Some((provider.to_string(), pages.to_vec()));
    }

    pub fn hide_back_button(&self) {
        self.world.borrow_mut().hide_back_button = true;
    }

    pub fn world(&self) -> std::cell::Ref<'_, World> {
        self.world.borrow()
    }

    /// A fresh browser sitting on the landing page, logged out.
    pub fn driver(&self) -> FakeDriver {
        FakeDriver {
            world: self.world.clone(),
            client: Client::default(),
        }
    }

    pub fn factory(&self) -> Arc<dyn SessionFactory> {
        Arc::new(FakeSessionFactory { site: self.clone() })
    }
}

pub struct FakeSessionFactory {
    site: FakeSite,
}

#[async_trait(?Send)]
impl SessionFactory for FakeSessionFactory {
    async fn create(&self) -> BrowserResult<Box<dyn Driver>> {
        {
            let mut world = self.site.world.borrow_mut();
            if world.failing_creations > 0 {
                world.failing_creations -= 1;
                return Err(BrowserError::Launch("browser binary missing".to_string()));
            }
            world.sessions_created += 1;
        }
        Ok(Box::new(self.site.driver()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum View {
    #[default]
    Home,
    Catalog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Overlay {
    #[default]
    None,
    Loaded,
    Toast,
    Loading,
}

#[derive(Debug, Clone)]
struct Client {
    closed: bool,
    logged_in: bool,
    modal_open: bool,
    popup_open: bool,
    view: View,
    overlay: Overlay,
    provider: Option<usize>,
    page: u32,
}

impl Default for Client {
    fn default() -> Self {
        Self {
            closed: false,
            logged_in: false,
            modal_open: false,
            popup_open: false,
            view: View::Home,
            overlay: Overlay::None,
            provider: None,
            page: 1,
        }
    }
}

impl Client {
    fn in_catalog(&self) -> bool {
        self.view == View::Catalog && self.overlay == Overlay::None
    }

    /// Leaving an item re-renders the list from its first page.
    fn back_to_list(&mut self) {
        self.overlay = Overlay::None;
        self.page = 1;
    }
}

pub struct FakeDriver {
    world: Rc<RefCell<World>>,
    client: Client,
}

impl FakeDriver {
    fn ensure_open(&self) -> BrowserResult<()> {
        if self.client.closed {
            Err(BrowserError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn page_count(&self) -> u32 {
        match self.client.provider {
            Some(index) => self.world.borrow().provider(index).pages.len() as u32,
            None => 0,
        }
    }

    fn items_on_page(&self) -> usize {
        if !self.client.in_catalog() {
            return 0;
        }
        let Some(index) = self.client.provider else {
            return 0;
        };
        let world = self.world.borrow();
        world
            .provider(index)
            .pages
            .get(self.client.page as usize - 1)
            .copied()
            .unwrap_or(0)
    }

    /// Shows pages `page-2 ..= page+4`, with filler where pages are hidden.
    fn page_labels(&self) -> Vec<String> {
        let total = self.page_count();
        if !self.client.in_catalog() || total <= 1 {
            return Vec::new();
        }
        let page = self.client.page;
        let start = page.saturating_sub(2).max(1);
        let end = (page + 4).min(total);
        let mut labels = Vec::new();
        if start > 1 {
            labels.push("…".to_string());
        }
        labels.extend((start..=end).map(|p| p.to_string()));
        if end < total {
            labels.push("…".to_string());
        }
        labels
    }

    fn provider_name(&self) -> String {
        match self.client.provider {
            Some(index) => self.world.borrow().provider(index).name.clone(),
            None => String::new(),
        }
    }

    fn labels_for(&self, selector: &str) -> Vec<String> {
        let client = &self.client;
        let present = |visible: bool| if visible { vec![String::new()] } else { Vec::new() };
        match selector {
            "#slots" => present(client.overlay == Overlay::None),
            ".provider" => {
                if client.in_catalog() {
                    self.world
                        .borrow()
                        .providers
                        .iter()
                        .map(|provider| provider.name.clone())
                        .collect()
                } else {
                    Vec::new()
                }
            }
            ".page-btn" => self.page_labels(),
            ".page-btn.active" => {
                if self.page_labels().is_empty() {
                    Vec::new()
                } else {
                    vec![client.page.to_string()]
                }
            }
            ".play" => vec!["Play Now".to_string(); self.items_on_page()],
            ".game-name" => {
                let provider = self.provider_name();
                (0..self.items_on_page())
                    .map(|index| format!("{provider} Game {}-{index}", client.page))
                    .collect()
            }
            ".close" => present(client.overlay == Overlay::Loaded),
            ".toast" => present(client.overlay == Overlay::Toast),
            ".back" => present(
                client.overlay == Overlay::Toast && !self.world.borrow().hide_back_button,
            ),
            ".login-open" => present(
                !client.logged_in && !client.modal_open && client.overlay == Overlay::None,
            ),
            "#username" | "#password" | ".login-submit" | ".login-close" => {
                present(client.modal_open)
            }
            ".logout" => present(client.logged_in),
            ".popup-close" => present(client.popup_open),
            _ => Vec::new(),
        }
    }

    fn require(&self, selector: &str, index: usize) -> BrowserResult<()> {
        if index < self.labels_for(selector).len() {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound {
                selector: selector.to_string(),
                index,
            })
        }
    }

    fn press(&mut self, selector: &str, index: usize) -> BrowserResult<()> {
        match selector {
            "#slots" => {
                self.client.view = View::Catalog;
                self.client.provider = None;
                self.client.page = 1;
            }
            ".provider" => {
                self.client.provider = Some(index);
                self.client.page = 1;
            }
            ".page-btn" => {
                let label = self.page_labels()[index].clone();
                self.world.borrow_mut().page_clicks.push(label.clone());
                if let Ok(page) = label.parse() {
                    self.client.page = page;
                }
            }
            ".play" => {
                let key = (self.provider_name(), self.client.page, index);
                let launch = {
                    let mut world = self.world.borrow_mut();
                    world.launches.push(key.clone());
                    world.next_launch(&key)
                };
                match launch {
                    Launch::Loads => self.client.overlay = Overlay::Loaded,
                    Launch::Toast => self.client.overlay = Overlay::Toast,
                    Launch::Hangs => self.client.overlay = Overlay::Loading,
                    Launch::Crashes => {
                        return Err(BrowserError::Unexpected("item frame crashed".to_string()))
                    }
                }
            }
            ".close" | ".back" => self.client.back_to_list(),
            ".login-open" => self.client.modal_open = true,
            ".login-submit" => {
                let mut world = self.world.borrow_mut();
                world.login_submits += 1;
                if world.login_failures > 0 {
                    world.login_failures -= 1;
                } else {
                    world.logins += 1;
                    self.client.logged_in = true;
                    self.client.modal_open = false;
                    self.client.popup_open = true;
                }
            }
            ".login-close" => self.client.modal_open = false,
            ".popup-close" => self.client.popup_open = false,
            _ => {}
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl Driver for FakeDriver {
    async fn count(&mut self, selector: &str) -> BrowserResult<usize> {
        self.ensure_open()?;
        Ok(self.labels_for(selector).len())
    }

    async fn texts(&mut self, selector: &str) -> BrowserResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.labels_for(selector))
    }

    async fn text_at(&mut self, selector: &str, index: usize) -> BrowserResult<Option<String>> {
        self.ensure_open()?;
        Ok(self.labels_for(selector).get(index).cloned())
    }

    async fn is_visible(&mut self, selector: &str) -> BrowserResult<bool> {
        self.ensure_open()?;
        Ok(!self.labels_for(selector).is_empty())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        self.ensure_open()?;
        if self.labels_for(selector).is_empty() {
            tokio::time::sleep(timeout).await;
            return Err(BrowserError::Timeout(selector.to_string()));
        }
        Ok(())
    }

    async fn click_at(&mut self, selector: &str, index: usize) -> BrowserResult<()> {
        self.ensure_open()?;
        self.require(selector, index)?;
        self.press(selector, index)
    }

    async fn hover_at(&mut self, selector: &str, index: usize) -> BrowserResult<()> {
        self.ensure_open()?;
        self.require(selector, index)
    }

    async fn scroll_into_view_at(&mut self, selector: &str, index: usize) -> BrowserResult<()> {
        self.ensure_open()?;
        self.require(selector, index)
    }

    async fn fill(&mut self, selector: &str, _value: &str) -> BrowserResult<()> {
        self.ensure_open()?;
        self.require(selector, 0)
    }

    async fn evaluate(&mut self, script: &str) -> BrowserResult<Value> {
        self.ensure_open()?;
        if script.contains("localStorage") {
            self.world.borrow_mut().storage_clears += 1;
        }
        Ok(Value::Bool(true))
    }

    async fn clear_cookies(&mut self) -> BrowserResult<()> {
        self.ensure_open()?;
        self.world.borrow_mut().cookie_clears += 1;
        self.client.logged_in = false;
        Ok(())
    }

    async fn goto(
        &mut self,
        _url: &str,
        _condition: LoadCondition,
        _timeout: Duration,
    ) -> BrowserResult<()> {
        self.ensure_open()?;
        {
            let mut world = self.world.borrow_mut();
            if world.failing_gotos > 0 {
                world.failing_gotos -= 1;
                return Err(BrowserError::Timeout("navigation to landing page".to_string()));
            }
            if let Some((name, pages)) = world.pending_layout.take() {
                if let Some(provider) = world.providers.iter_mut().find(|p| p.name == name) {
                    provider.pages = pages;
                }
            }
        }
        let logged_in = self.client.logged_in;
        self.client = Client {
            logged_in,
            ..Client::default()
        };
        Ok(())
    }

    async fn go_back(&mut self) -> BrowserResult<()> {
        self.ensure_open()?;
        self.client.back_to_list();
        Ok(())
    }

    async fn screenshot(&mut self, path: &Path, _full_page: bool) -> BrowserResult<()> {
        self.ensure_open()?;
        std::fs::write(path, b"\x89PNG")?;
        self.world.borrow_mut().screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn close(&mut self) -> BrowserResult<()> {
        if !self.client.closed {
            self.client.closed = true;
            self.world.borrow_mut().sessions_closed += 1;
        }
        Ok(())
    }
}

/// Catalog route whose first `failures` walks give up on the page.
pub struct FlakyRoute {
    inner: CatalogRoute,
    failures: std::cell::Cell<u32>,
    pub calls: std::cell::Cell<u32>,
}

impl FlakyRoute {
    pub fn new(config: &SweepConfig, failures: u32) -> Self {
        Self {
            inner: CatalogRoute::new(CatalogNavigator::new(config), PaginationNavigator::new(config)),
            failures: std::cell::Cell::new(failures),
            calls: std::cell::Cell::new(0),
        }
    }
}

#[async_trait(?Send)]
impl Renavigate for FlakyRoute {
    async fn renavigate(&self, driver: &mut dyn Driver, provider: &str, page: u32) -> SweepResult<()> {
        self.calls.set(self.calls.get() + 1);
        let remaining = self.failures.get();
        if remaining > 0 {
            self.failures.set(remaining - 1);
            return Err(SweepError::NavigationExhausted { page });
        }
        self.inner.renavigate(driver, provider, page).await
    }
}

/// Wired-up sweep over a fake site with screenshots in a temp dir.
pub struct Harness {
    pub site: FakeSite,
    pub config: SweepConfig,
    pub shots: TempDir,
}

impl Harness {
    pub fn new(site: FakeSite) -> Self {
        Self::with_config(site, config())
    }

    pub fn with_config(site: FakeSite, config: SweepConfig) -> Self {
        Self {
            site,
            config,
            shots: TempDir::new().expect("temp dir"),
        }
    }

    pub fn diagnostics(&self) -> DiagnosticSink {
        DiagnosticSink::new(&self.config.diagnostics).with_dir(self.shots.path())
    }

    pub fn runner(&self) -> SweepRunner {
        SweepRunner::new(
            Arc::new(self.config.clone()),
            self.site.factory(),
            Arc::new(SiteLogin::new(&self.config)),
            credentials(),
        )
        .with_diagnostics(self.diagnostics())
    }

    /// A controller whose session is logged in and sitting on the provider
    /// list, the way the runner hands it over.
    pub async fn controller(&self) -> TraversalController {
        let catalog = CatalogNavigator::new(&self.config);
        let pagination = PaginationNavigator::new(&self.config);
        self.controller_with_route(Arc::new(CatalogRoute::new(catalog, pagination)))
            .await
    }

    pub async fn controller_with_route(&self, route: Arc<dyn Renavigate>) -> TraversalController {
        let session = self.runner().open_session().await.expect("session opens");
        let config = &self.config;
        let catalog = CatalogNavigator::new(config);
        let pagination = PaginationNavigator::new(config);
        let classifier = OutcomeClassifier::new(config, self.diagnostics());
        let recovery = RecoveryManager::new(
            config,
            credentials(),
            self.site.factory(),
            Arc::new(SiteLogin::new(config)),
            route,
            catalog.clone(),
            classifier.clone(),
            self.diagnostics(),
        );
        TraversalController::new(config, session, catalog, pagination, classifier, recovery)
    }

    /// A logged-out driver already showing `provider`'s first page.
    pub async fn driver_on(&self, provider: &str) -> FakeDriver {
        let mut driver = self.site.driver();
        let catalog = CatalogNavigator::new(&self.config);
        catalog.open_catalog(&mut driver).await.expect("catalog opens");
        catalog
            .select_provider(&mut driver, provider)
            .await
            .expect("provider listed");
        driver
    }
}
