//! chromiumoxide-backed renderer.

use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;
use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, SetBypassCspParams};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures_util::stream::{self, Stream, StreamExt};
use snapembed_core::{AppConfig, OEmbedDocument, RenderError};
use tokio::sync::Mutex;

use super::{RenderOptions, Renderer, embed_markup};

/// How to start the browser process.
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    /// Chrome/Chromium binary; auto-detected when `None`.
    pub executable: Option<PathBuf>,

    /// Extra command line flags.
    pub args: Vec<String>,
}

impl From<&AppConfig> for BrowserOptions {
    fn from(config: &AppConfig) -> Self {
        Self { executable: config.chrome_executable.clone(), args: config.browser_args.clone() }
    }
}

/// Headless Chrome/Chromium renderer using chromiumoxide.
///
/// The browser is launched on first use and shared; every render gets its
/// own page, which is closed when the render ends however it ends. A browser
/// whose event loop has ended, or that can no longer open pages, is replaced
/// on the next render.
pub struct HeadlessRenderer {
    browser: BrowserSlot<Browser>,
    launch: BrowserOptions,
    opts: RenderOptions,
}

impl HeadlessRenderer {
    pub fn new(launch: BrowserOptions, opts: RenderOptions) -> Self {
        Self { browser: BrowserSlot::new(), launch, opts }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(BrowserOptions::from(config), RenderOptions::from(config))
    }

    async fn browser(&self) -> Result<Arc<Browser>, RenderError> {
        self.browser.get_or_launch(|| launch_browser(&self.launch)).await
    }

    /// Open a blank page, relaunching the browser once if it cannot.
    async fn open_page(&self) -> Result<Page, RenderError> {
        let browser = self.browser().await?;
        match browser.new_page("about:blank").await {
            Ok(page) => Ok(page),
            Err(e) => {
                tracing::warn!("failed to open page, relaunching browser: {e}");
                self.browser.forget(&browser).await;
                self.browser()
                    .await?
                    .new_page("about:blank")
                    .await
                    .map_err(|e| RenderError::LaunchFailed(e.to_string()))
            }
        }
    }
}

/// Launch a headless browser and drive its DevTools event loop in the background.
///
/// The returned flag is cleared when the event loop ends.
async fn launch_browser(launch: &BrowserOptions) -> Result<(Browser, Arc<AtomicBool>), RenderError> {
    let mut builder = BrowserConfig::builder().args(launch.args.iter().cloned());
    if let Some(executable) = &launch.executable {
        builder = builder.chrome_executable(executable);
    }

    let (browser, mut handler) = Browser::launch(builder.build().map_err(RenderError::LaunchFailed)?)
        .await
        .map_err(|e| RenderError::LaunchFailed(e.to_string()))?;

    let alive = Arc::new(AtomicBool::new(true));
    let handler_alive = Arc::clone(&alive);
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                tracing::debug!("browser handler event error: {e}");
                break;
            }
        }
        handler_alive.store(false, Ordering::Release);
        tracing::warn!("browser event loop ended");
    });

    tracing::info!("launched headless browser");
    Ok((browser, alive))
}

/// Holds the shared browser and launches a new one when it is missing or dead.
struct BrowserSlot<T> {
    current: Mutex<Option<Live<T>>>,
}

struct Live<T> {
    value: Arc<T>,
    alive: Arc<AtomicBool>,
}

impl<T> BrowserSlot<T> {
    fn new() -> Self {
        Self { current: Mutex::new(None) }
    }

    /// The live instance, launching one if needed. Concurrent callers wait
    /// for a single launch; a failed launch leaves the slot empty.
    async fn get_or_launch<F, Fut>(&self, launch: F) -> Result<Arc<T>, RenderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(T, Arc<AtomicBool>), RenderError>>,
    {
        let mut current = self.current.lock().await;
        if let Some(live) = current.as_ref() {
            if live.alive.load(Ordering::Acquire) {
                return Ok(Arc::clone(&live.value));
            }
            tracing::info!("browser is gone, relaunching");
            *current = None;
        }

        let (value, alive) = launch().await?;
        let value = Arc::new(value);
        *current = Some(Live { value: Arc::clone(&value), alive });
        Ok(value)
    }

    /// Drop `value` so the next caller launches a fresh one. A no-op when
    /// the slot already holds a different instance.
    async fn forget(&self, value: &Arc<T>) {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|live| Arc::ptr_eq(&live.value, value)) {
            *current = None;
        }
    }
}

#[async_trait::async_trait]
impl Renderer for HeadlessRenderer {
    async fn render(&self, doc: &OEmbedDocument) -> Result<Bytes, RenderError> {
        let html = embed_markup(doc)?;
        let page = self.open_page().await?;
        let guard = PageGuard(Some(page.clone()));

        let start = Instant::now();
        let result = within(self.opts.timeout_ms, capture(&page, html, &self.opts)).await;

        guard.close().await;

        tracing::debug!(ok = result.is_ok(), render_ms = start.elapsed().as_millis() as u64, "render finished");
        result
    }
}

/// Run `fut` under the render timeout.
async fn within<T>(timeout_ms: u64, fut: impl Future<Output = Result<T, RenderError>>) -> Result<T, RenderError> {
    tokio::time::timeout(Duration::from_millis(timeout_ms), fut)
        .await
        .unwrap_or(Err(RenderError::Timeout(timeout_ms)))
}

/// Steps of a single render on an already opened page.
async fn capture(page: &Page, html: &str, opts: &RenderOptions) -> Result<Bytes, RenderError> {
    let (width, height) = opts.viewport;
    page.execute(SetDeviceMetricsOverrideParams::new(i64::from(width), i64::from(height), 1.0, false))
        .await
        .map_err(|e| RenderError::ContentLoadFailed(format!("viewport: {e}")))?;
    page.execute(SetBypassCspParams::new(true))
        .await
        .map_err(|e| RenderError::ContentLoadFailed(format!("bypass CSP: {e}")))?;

    // Subscribe before loading content so no request goes unseen.
    let listen_err = |e: CdpError| RenderError::ContentLoadFailed(format!("network events: {e}"));
    let sent = page.event_listener::<EventRequestWillBeSent>().await.map_err(listen_err)?;
    let finished = page.event_listener::<EventLoadingFinished>().await.map_err(listen_err)?;
    let failed = page.event_listener::<EventLoadingFailed>().await.map_err(listen_err)?;

    page.set_content(html)
        .await
        .map_err(|e| RenderError::ContentLoadFailed(e.to_string()))?;

    let started = sent.map(|event| event.request_id.clone());
    let settled = stream::select(
        finished.map(|event| event.request_id.clone()),
        failed.map(|event| event.request_id.clone()),
    );
    wait_for_idle(started, settled, opts.network_idle()).await;
    tokio::time::sleep(opts.settle()).await;

    let png = match page.find_element(opts.selector.as_str()).await {
        Ok(element) => {
            tracing::debug!(selector = %opts.selector, "capturing element");
            element.screenshot(CaptureScreenshotFormat::Png).await
        }
        Err(_) => {
            tracing::debug!(selector = %opts.selector, "no element matched; capturing full page");
            let params = ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(true)
                .capture_beyond_viewport(true)
                .build();
            page.screenshot(params).await
        }
    }
    .map_err(|e| RenderError::CaptureFailed(e.to_string()))?;

    if png.is_empty() {
        return Err(RenderError::CaptureFailed("screenshot was empty".into()));
    }

    Ok(Bytes::from(png))
}

/// Resolve once no request has been in flight for `quiet`.
///
/// `started` yields the id of each request as it goes out, `settled` the id
/// of each request that finished or failed. Also resolves when both streams
/// end. Bounded only by the caller's render timeout.
async fn wait_for_idle<Id>(started: impl Stream<Item = Id>, settled: impl Stream<Item = Id>, quiet: Duration)
where
    Id: Eq + Hash,
{
    let mut started = pin!(started);
    let mut settled = pin!(settled);
    let mut pending: HashSet<Id> = HashSet::new();

    loop {
        tokio::select! {
            Some(id) = started.next() => {
                pending.insert(id);
            }
            Some(id) = settled.next() => {
                pending.remove(&id);
            }
            _ = tokio::time::sleep(quiet), if pending.is_empty() => return,
            else => return,
        }
    }
}

/// Closes its page on every exit path.
///
/// `close` is the normal path; if the render future is dropped instead
/// (timeout, cancelled request) the page is closed from a spawned task.
struct PageGuard(Option<Page>);

impl PageGuard {
    async fn close(mut self) {
        if let Some(page) = self.0.take()
            && let Err(e) = page.close().await
        {
            tracing::debug!("failed to close page: {e}");
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(page) = self.0.take()
            && let Ok(runtime) = tokio::runtime::Handle::try_current()
        {
            runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    tracing::debug!("failed to close abandoned page: {e}");
                }
            });
        }
    }
}
