//! Session Nodes
//!
//! A session is the server-side state of one page load: its reactive
//! values, its actions, a mailbox of outgoing patches and a disposal
//! signal. Components are child sessions nested inside a page.
//!
//! # Ownership
//!
//! Everything a page and its components share lives in one [`PageState`].
//! Each session node (the page itself or a component) holds an `Arc` to
//! it plus its own view and children:
//!
//! ```text
//!   SessionNode (page) ──────┐
//!     ├─ view                ├──► PageState
//!     └─ components          │      ├─ values
//!          └─ SessionNode ───┘      ├─ actions
//!               ├─ view             ├─ mailbox
//!               └─ components       └─ disposal
//! ```
//!
//! Components never point back at their parent node, so there are no
//! reference cycles between nodes. Callbacks (actions, intervals,
//! subscriptions) receive the session as an argument and keep only a weak
//! reference to it.
//!
//! # Disposal
//!
//! [`Session::dispose`] fires the shared disposal signal exactly once,
//! detaches every subscription and drops the page's actions and view tree.
//! Registry removal is the caller's job (see the registry module).

use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::gateway::RateLimiter;
use crate::pubsub::Subscription;
use crate::render::{erase_view, Attr, Render, RenderError, ViewFn};
use crate::runtime::Runtime;
use crate::store::StoreHandle;

use super::action::{ActionEntry, ActionFn, ActionHandle, ActionOptions};
use super::disposal::{DisposalListener, DisposalSignal};
use super::id::{csrf_token, short_id, SessionId};
use super::interval::IntervalRoutine;
use super::mailbox::{Mailbox, Patch, PatchBatch, PatchKind};
use super::value::ReactiveValue;

/// State shared by a page and all of its components.
pub(crate) struct PageState {
    pub(crate) id: SessionId,
    pub(crate) route: String,
    pub(crate) created_at: Instant,
    pub(crate) connected: AtomicBool,
    pub(crate) csrf_token: String,

    /// Snapshot taken when the page request arrives.
    pub(crate) route_params: RwLock<HashMap<String, String>>,

    /// Every value of the page, components included, in declaration order.
    pub(crate) values: RwLock<IndexMap<String, ReactiveValue>>,

    pub(crate) actions: RwLock<HashMap<String, ActionEntry>>,
    pub(crate) mailbox: Mailbox,
    pub(crate) disposal: DisposalSignal,
    pub(crate) subscriptions: Mutex<Vec<Arc<dyn Subscription>>>,

    /// Session-wide action limiter, `None` when limiting is disabled.
    pub(crate) limiter: Option<Arc<RateLimiter>>,

    pub(crate) store_scope: RwLock<Option<String>>,
    pub(crate) runtime: Runtime,
}

/// A page or component node.
pub(crate) struct SessionNode {
    pub(crate) id: SessionId,
    pub(crate) page: Arc<PageState>,
    pub(crate) view: RwLock<Option<ViewFn>>,
    pub(crate) components: RwLock<IndexMap<SessionId, Session>>,
    pub(crate) is_component: bool,
}

/// Handle to a session. Cloning is cheap.
#[derive(Clone)]
pub struct Session(pub(crate) Arc<SessionNode>);

impl Session {
    /// Create a page session for `route` with a fresh identifier.
    ///
    /// The session is not registered; the caller decides when it goes live.
    pub fn new(route: &str, runtime: &Runtime) -> Self {
        Self::with_id(SessionId::for_route(route), route, runtime)
    }

    /// Create the unregistered session used by a dry construction pass.
    pub(crate) fn dry(route: &str, runtime: &Runtime) -> Self {
        Self::with_id(SessionId::unassigned(), route, runtime)
    }

    fn with_id(id: SessionId, route: &str, runtime: &Runtime) -> Self {
        let limiter = RateLimiter::from_config(&runtime.action_rate_limit()).map(Arc::new);
        let page = Arc::new(PageState {
            id: id.clone(),
            route: route.to_string(),
            created_at: Instant::now(),
            connected: AtomicBool::new(false),
            csrf_token: csrf_token(),
            route_params: RwLock::new(HashMap::new()),
            values: RwLock::new(IndexMap::new()),
            actions: RwLock::new(HashMap::new()),
            mailbox: Mailbox::new(),
            disposal: DisposalSignal::new(),
            subscriptions: Mutex::new(Vec::new()),
            limiter,
            store_scope: RwLock::new(None),
            runtime: runtime.clone(),
        });

        Self(Arc::new(SessionNode {
            id,
            page,
            view: RwLock::new(None),
            components: RwLock::new(IndexMap::new()),
            is_component: false,
        }))
    }

    pub(crate) fn page(&self) -> &PageState {
        &self.0.page
    }

    // ------------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------------

    /// This node's identifier. For a component it embeds the page id.
    pub fn id(&self) -> &SessionId {
        &self.0.id
    }

    /// The identifier of the page this node belongs to.
    pub fn page_id(&self) -> &SessionId {
        &self.page().id
    }

    pub fn route(&self) -> &str {
        &self.page().route
    }

    pub fn is_component(&self) -> bool {
        self.0.is_component
    }

    /// Whether this session belongs to a dry construction pass.
    pub fn is_dry(&self) -> bool {
        self.page().id.is_unassigned()
    }

    pub fn csrf_token(&self) -> &str {
        &self.page().csrf_token
    }

    pub fn created_at(&self) -> Instant {
        self.page().created_at
    }

    /// Whether a streaming connection is currently attached.
    pub fn is_connected(&self) -> bool {
        self.page().connected.load(Ordering::SeqCst)
    }

    /// Set by the patch pump. Hosts driving their own transport set it too.
    pub fn set_connected(&self, connected: bool) {
        self.page().connected.store(connected, Ordering::SeqCst);
    }

    pub(crate) fn set_store_scope(&self, scope: Option<String>) {
        *self.page().store_scope.write() = scope;
    }

    pub(crate) fn inject_route_params(&self, params: HashMap<String, String>) {
        *self.page().route_params.write() = params;
    }

    /// A route parameter captured from the page URL, or an empty string.
    pub fn path_param(&self, name: &str) -> String {
        self.page()
            .route_params
            .read()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------------

    /// Set the view rendered for this node.
    pub fn view<F, R>(&self, view: F)
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: Render,
    {
        *self.0.view.write() = Some(erase_view(view));
    }

    pub fn has_view(&self) -> bool {
        self.0.view.read().is_some()
    }

    /// Declare a reactive value.
    ///
    /// Values declared by a component are stored with the page, so the
    /// whole page's state syncs through one map.
    pub fn value(&self, input: impl Serialize) -> ReactiveValue {
        let value = ReactiveValue::declare(short_id(), input);
        if let Some(error) = value.error() {
            tracing::error!(session = %self.0.id, %error, "failed to declare value");
        }
        self.page()
            .values
            .write()
            .insert(value.id().to_string(), value.clone());
        value
    }

    /// Look up a value by identifier.
    pub fn find_value(&self, id: &str) -> Option<ReactiveValue> {
        self.page().values.read().get(id).cloned()
    }

    /// Register an action with the session's default rate limit.
    pub fn action<F>(&self, callback: F) -> ActionHandle
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        self.action_with(callback, ActionOptions::default())
    }

    /// Register an action with its own options.
    pub fn action_with<F>(&self, callback: F, options: ActionOptions) -> ActionHandle
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        let id = short_id();
        let callback: ActionFn = Arc::new(callback);
        let entry = ActionEntry::new(callback, &options, Arc::downgrade(&self.0));
        self.page().actions.write().insert(id.clone(), entry);
        ActionHandle::new(id)
    }

    pub(crate) fn find_action(&self, id: &str) -> Option<ActionEntry> {
        self.page().actions.read().get(id).cloned()
    }

    /// Create a component, run `init` against it and return its view.
    pub fn component<F>(&self, init: F) -> ComponentView
    where
        F: FnOnce(&Session),
    {
        let child = Session(Arc::new(SessionNode {
            id: SessionId::for_component(&self.0.id),
            page: Arc::clone(&self.0.page),
            view: RwLock::new(None),
            components: RwLock::new(IndexMap::new()),
            is_component: true,
        }));
        init(&child);

        self.0
            .components
            .write()
            .insert(child.0.id.clone(), child.clone());
        ComponentView { session: child }
    }

    /// Find a node in this session's subtree by identifier.
    pub fn find(&self, id: &str) -> Option<Session> {
        if self.0.id.as_str() == id {
            return Some(self.clone());
        }
        let components = self.0.components.read();
        if let Some(child) = components.get(id) {
            return Some(child.clone());
        }
        components.values().find_map(|child| child.find(id))
    }

    /// Number of direct children.
    pub fn component_count(&self) -> usize {
        self.0.components.read().len()
    }

    // ------------------------------------------------------------------------
    // Inbound values
    // ------------------------------------------------------------------------

    /// Apply the values a client reported.
    ///
    /// Known values are overwritten and no longer dirty. Unknown ones start
    /// being tracked. A missing map is a caller bug and is ignored.
    pub fn inject_inbound(&self, values: Option<&Map<String, Value>>) {
        let Some(values) = values else {
            tracing::error!(session = %self.0.id, "value injection failed: no values");
            return;
        };

        let mut table = self.page().values.write();
        for (id, value) in values {
            match table.get(id) {
                Some(existing) => existing.inject(value.clone()),
                None => {
                    table.insert(id.clone(), ReactiveValue::from_client(id.clone(), value.clone()));
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Outbound patches
    // ------------------------------------------------------------------------

    /// Queue a patch without blocking. Returns false if it was dropped.
    pub fn send_patch(&self, kind: PatchKind, payload: impl Into<String>) -> bool {
        let sent = self.page().mailbox.send_patch(Patch::new(kind, payload));
        if !sent {
            tracing::trace!(session = %self.0.id, ?kind, "patch dropped");
        }
        sent
    }

    /// Take the pending batch without a connection.
    ///
    /// Hosts that deliver patches themselves drain the mailbox with this.
    pub fn try_take_patches(&self) -> Option<PatchBatch> {
        self.page().mailbox.try_take()
    }

    /// Re-render this node and push it along with every dirty value.
    ///
    /// A render failure aborts the sync and is logged.
    pub fn sync(&self) {
        let elements = match Render::render(self) {
            Ok(html) => html,
            Err(error) => {
                tracing::error!(session = %self.0.id, %error, "sync view failed");
                return;
            }
        };

        let mut batch = PatchBatch::new();
        batch.push(Patch::new(PatchKind::Elements, elements));
        let delivered = self.collect_value_delta(&mut batch);
        self.enqueue(batch, delivered);
    }

    /// Push dirty values only.
    pub fn sync_values(&self) {
        let mut batch = PatchBatch::new();
        let delivered = self.collect_value_delta(&mut batch);
        self.enqueue(batch, delivered);
    }

    /// Push explicit fragments. Each top-level element must carry an id the
    /// client can merge on.
    pub fn sync_elements(&self, fragments: impl Render) {
        match fragments.render() {
            Ok(html) => {
                self.send_patch(PatchKind::Elements, html);
            }
            Err(error) => {
                tracing::warn!(session = %self.0.id, %error, "sync elements failed");
            }
        }
    }

    /// Run a script on the client.
    pub fn exec_script(&self, script: impl Into<String>) {
        let script = script.into();
        if script.is_empty() {
            tracing::warn!(session = %self.0.id, "exec script failed: empty script");
            return;
        }
        self.send_patch(PatchKind::Script, script);
    }

    /// Navigate the client to `url`.
    pub fn redirect(&self, url: impl Into<String>) {
        let url = url.into();
        if url.is_empty() {
            tracing::warn!(session = %self.0.id, "redirect failed: empty url");
            return;
        }
        self.send_patch(PatchKind::Redirect, url);
    }

    /// Replace the client's current URL without navigating.
    pub fn replace_url(&self, url: impl Into<String>) {
        self.send_patch(PatchKind::ReplaceUrl, url);
    }

    /// Append the value delta to `batch`, returning what it contains.
    fn collect_value_delta(&self, batch: &mut PatchBatch) -> Vec<(ReactiveValue, u64)> {
        let mut delta = Map::new();
        let mut included = Vec::new();

        for (id, value) in self.page().values.read().iter() {
            if let Some((revision, text)) = value.pending() {
                delta.insert(id.clone(), Value::String(text));
                included.push((value.clone(), revision));
            }
        }

        if !delta.is_empty() {
            batch.push(Patch::new(PatchKind::Values, Value::Object(delta).to_string()));
        }
        included
    }

    fn enqueue(&self, batch: PatchBatch, delivered: Vec<(ReactiveValue, u64)>) {
        if self.page().mailbox.try_send(batch) {
            for (value, revision) in delivered {
                value.mark_delivered(revision);
            }
        } else {
            tracing::trace!(session = %self.0.id, "sync dropped, mailbox full");
        }
    }

    // ------------------------------------------------------------------------
    // Lifetime
    // ------------------------------------------------------------------------

    /// Tear the session down. Safe to call any number of times.
    pub fn dispose(&self) {
        let page = self.page();
        if !page.disposal.dispose() {
            return;
        }

        let subscriptions = std::mem::take(&mut *page.subscriptions.lock());
        for subscription in subscriptions {
            if let Err(error) = subscription.unsubscribe() {
                tracing::warn!(session = %self.0.id, %error, "unsubscribe failed");
            }
        }

        page.actions.write().clear();
        *self.0.view.write() = None;
        self.0.components.write().clear();

        tracing::debug!(session = %self.0.id, "session disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.page().disposal.is_disposed()
    }

    pub(crate) fn disposal_listener(&self) -> DisposalListener {
        self.page().disposal.listener()
    }

    /// Run `handler` every `period` until stopped or the page is disposed.
    pub fn on_interval<F>(&self, period: Duration, handler: F) -> IntervalRoutine
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        IntervalRoutine::spawn(self, period, handler)
    }

    /// The key/value store scoped to this browser.
    pub fn store(&self) -> StoreHandle {
        let page = self.page();
        StoreHandle::new(page.runtime.store().cloned(), page.store_scope.read().clone())
    }
}

impl Render for Session {
    /// Render the node's view wrapped in an element carrying its id.
    fn render_to(&self, out: &mut String) -> Result<(), RenderError> {
        let view = self
            .0
            .view
            .read()
            .clone()
            .ok_or_else(|| RenderError::Failed(format!("no view declared for '{}'", self.0.id)))?;

        write!(out, "<div {}>", Attr::new("id", self.0.id.as_str()))?;
        view(out)?;
        out.push_str("</div>");
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.0.id)
            .field("route", &self.page().route)
            .field("is_component", &self.0.is_component)
            .field("connected", &self.is_connected())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// The view of a component, placed inside its parent's view.
#[derive(Clone)]
pub struct ComponentView {
    session: Session,
}

impl ComponentView {
    /// The component's own session.
    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl Render for ComponentView {
    fn render_to(&self, out: &mut String) -> Result<(), RenderError> {
        self.session.render_to(out)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
