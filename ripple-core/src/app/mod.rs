//! Application Shell
//!
//! Ties the engine together behind one handle: options, the shared runtime
//! (pub/sub and store backends), the session registry, the action gateway,
//! the page table and the background reaper.
//!
//! # How Page Registration Works
//!
//! [`App::page`] runs the page's init function once against a dry session
//! before accepting the route. The dry session has no id, is never
//! registered and never spawns interval tasks, so the pass only proves that
//! the page declares a view and renders. A page that fails here is a
//! programming error and is reported as [`Error::PageConstruction`].
//!
//! Every GET of the route then builds a fresh session, runs the init
//! function for real, renders it into the document shell and registers it.
//!
//! # Example
//!
//! ```rust,ignore
//! let app = App::new(Options::default());
//! app.page("/", |s| {
//!     let count = s.value(0);
//!     let shown = count.clone();
//!     s.view(move || format!("<p>{}</p>", shown.as_i64()));
//! })?;
//! app.run().await?;
//! ```

mod document;
mod routes;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use axum::Router;
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpListener;

use crate::config::Options;
use crate::error::{panic_message, Error, Result};
use crate::gateway::ActionGateway;
use crate::pubsub::PubSub;
use crate::registry::{Reaper, SessionRegistry};
use crate::render::Render;
use crate::runtime::Runtime;
use crate::session::Session;
use crate::store::KvStore;
use crate::telemetry;

use self::document::DocumentShell;

pub use self::routes::{CLOSE_ROUTE, STREAM_ROUTE};

/// A page's init function: declares values, actions and the view.
pub type PageInit = Arc<dyn Fn(&Session) + Send + Sync>;

struct Page {
    route: String,
    init: PageInit,
}

/// Builder for an [`App`] with optional backends.
pub struct AppBuilder {
    options: Options,
    pubsub: Option<Arc<dyn PubSub>>,
    store: Option<Arc<dyn KvStore>>,
}

impl AppBuilder {
    pub fn pubsub(mut self, pubsub: impl PubSub + 'static) -> Self {
        self.pubsub = Some(Arc::new(pubsub));
        self
    }

    pub fn store(mut self, store: impl KvStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn build(self) -> App {
        let runtime = Runtime::new(self.pubsub, self.store, self.options.action_rate_limit);
        let registry = Arc::new(SessionRegistry::new());
        let gateway = ActionGateway::new(Arc::clone(&registry));
        let document = DocumentShell::from_options(&self.options);

        App {
            inner: Arc::new(AppInner {
                options: self.options,
                runtime,
                registry,
                gateway,
                pages: RwLock::new(Vec::new()),
                document: RwLock::new(document),
                reaper: Mutex::new(None),
            }),
        }
    }
}

struct AppInner {
    options: Options,
    runtime: Runtime,
    registry: Arc<SessionRegistry>,
    gateway: ActionGateway,
    pages: RwLock<Vec<Page>>,
    document: RwLock<DocumentShell>,
    reaper: Mutex<Option<Reaper>>,
}

/// The application handle. Cheap to clone.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl App {
    /// An app without pub/sub or store backends.
    pub fn new(options: Options) -> Self {
        Self::builder(options).build()
    }

    pub fn builder(options: Options) -> AppBuilder {
        AppBuilder {
            options,
            pubsub: None,
            store: None,
        }
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.inner.registry
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub fn gateway(&self) -> &ActionGateway {
        &self.inner.gateway
    }

    /// Append raw HTML to the document head.
    pub fn append_to_head(&self, html: impl Into<String>) {
        self.inner.document.write().append_head(html.into());
    }

    /// Append raw HTML to the end of the document body.
    pub fn append_to_foot(&self, html: impl Into<String>) {
        self.inner.document.write().append_foot(html.into());
    }

    /// Register a page at `route`.
    ///
    /// Routes use axum's syntax, so `/users/:id` exposes `id` through
    /// [`Session::path_param`].
    pub fn page<F>(&self, route: impl Into<String>, init: F) -> Result<()>
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        let route = route.into();
        if self.inner.pages.read().iter().any(|page| page.route == route) {
            return Err(Error::PageConstruction {
                route,
                message: "route already registered".to_string(),
            });
        }

        let init: PageInit = Arc::new(init);
        self.dry_run(&route, &init)?;

        tracing::debug!(route = %route, "page registered");
        self.inner.pages.write().push(Page { route, init });
        Ok(())
    }

    fn dry_run(&self, route: &str, init: &PageInit) -> Result<()> {
        let session = Session::dry(route, &self.inner.runtime);
        let failure = |message: String| Error::PageConstruction {
            route: route.to_string(),
            message,
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            init(&session);
            if !session.has_view() {
                return Err("page declares no view".to_string());
            }
            session.render().map(drop).map_err(|error| error.to_string())
        }));
        session.dispose();

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(failure(message)),
            Err(payload) => Err(failure(format!(
                "init panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }

    /// The axum router for every registered page plus the engine routes.
    ///
    /// Pages registered after this call are not part of the router.
    pub fn router(&self) -> Router {
        routes::build(self)
    }

    /// Start the background reaper if a TTL is configured.
    ///
    /// Returns whether a reaper is running afterwards. Must be called from
    /// within a tokio runtime.
    pub fn start_reaper(&self) -> bool {
        let (Some(ttl), Some(interval)) = (
            self.inner.options.session_ttl(),
            self.inner.options.reaper_interval(),
        ) else {
            tracing::info!("session reaper disabled");
            return false;
        };

        let mut reaper = self.inner.reaper.lock();
        if reaper.is_none() {
            tracing::debug!(ttl_secs = ttl.as_secs(), interval_secs = interval.as_secs(), "starting session reaper");
            *reaper = Some(Reaper::spawn(Arc::clone(&self.inner.registry), ttl, interval));
        }
        true
    }

    /// Stop the reaper, dispose every session and close the pub/sub backend.
    pub async fn shutdown(&self) {
        let reaper = self.inner.reaper.lock().take();
        if let Some(reaper) = reaper {
            reaper.stop().await;
        }

        let disposed = self.inner.registry.drain();
        tracing::info!(sessions = disposed, "sessions disposed");

        if let Some(pubsub) = self.inner.runtime.pubsub() {
            if let Err(error) = pubsub.close() {
                tracing::error!(%error, "failed to close pubsub backend");
            }
        }
    }

    /// Serve on `listener` until ctrl-c, then shut down.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.start_reaper();
        let address = listener.local_addr()?;
        tracing::info!(%address, "listening");

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await;

        self.shutdown().await;
        served?;
        Ok(())
    }

    /// Install logging, bind the configured address and serve.
    pub async fn run(&self) -> Result<()> {
        telemetry::init(&self.inner.options.logging());
        let listener = TcpListener::bind(&self.inner.options.server_address).await?;
        self.serve(listener).await
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
