//! HTTP routes.
//!
//! | Route               | Method | Purpose                          |
//! |---------------------|--------|----------------------------------|
//! | each page route     | GET    | create a session, render a page  |
//! | `/_sse`             | GET    | the page's patch stream          |
//! | `/_action/:id`      | GET    | invoke an action                 |
//! | `/_session/close`   | POST   | dispose a session immediately    |
//!
//! Rejections never carry a body. Forbidden and rate-limited requests get
//! their status code; everything else answers 200.

use std::collections::HashMap;
use std::convert::Infallible;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;

use crate::error::panic_message;
use crate::gateway::{InboundPayload, QUERY_PARAM};
use crate::render::Render;
use crate::session::{random_token, Session, ACTION_ROUTE_PREFIX};
use crate::store::{scope_from_cookie_header, STORE_COOKIE};
use crate::transport::{FrameSink, PatchPump, FRAME_BUFFER, KEEP_ALIVE_INTERVAL, RECONNECT_SENTINEL};

use super::{App, PageInit};

pub const STREAM_ROUTE: &str = "/_sse";
pub const CLOSE_ROUTE: &str = "/_session/close";

pub(crate) fn build(app: &App) -> Router {
    let mut router = Router::new();

    for page in app.inner.pages.read().iter() {
        let route = page.route.clone();
        let init = Arc::clone(&page.init);
        router = router.route(
            &page.route,
            get(
                move |State(app): State<App>,
                      params: Option<Path<HashMap<String, String>>>,
                      headers: HeaderMap| {
                    let route = route.clone();
                    let init = Arc::clone(&init);
                    async move {
                        let params = params.map(|Path(params)| params).unwrap_or_default();
                        serve_page(&app, &route, &init, params, &headers)
                    }
                },
            ),
        );
    }

    router
        .route(STREAM_ROUTE, get(stream))
        .route(&format!("{ACTION_ROUTE_PREFIX}:id"), get(action))
        .route(CLOSE_ROUTE, post(close_session))
        .layer(TraceLayer::new_for_http())
        .with_state(app.clone())
}

// ----------------------------------------------------------------------------
// Handlers
// ----------------------------------------------------------------------------

fn serve_page(
    app: &App,
    route: &str,
    init: &PageInit,
    params: HashMap<String, String>,
    headers: &HeaderMap,
) -> Response {
    let session = Session::new(route, app.runtime());
    session.inject_route_params(params);

    let mut fresh_scope = None;
    if app.runtime().store().is_some() {
        let existing = headers
            .get(COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(scope_from_cookie_header);
        let scope = match existing {
            Some(scope) => scope,
            None => {
                let scope = random_token();
                fresh_scope = Some(scope.clone());
                scope
            }
        };
        session.set_store_scope(Some(scope));
    }

    let rendered = catch_unwind(AssertUnwindSafe(|| {
        init(&session);
        session.render()
    }));
    let body = match rendered {
        Ok(Ok(body)) => body,
        Ok(Err(error)) => {
            tracing::error!(session = %session.id(), %error, "page render failed");
            session.dispose();
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        Err(payload) => {
            tracing::error!(
                session = %session.id(),
                panic = %panic_message(payload.as_ref()),
                "page construction panicked"
            );
            session.dispose();
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    app.registry().register(session.clone());
    let html = app.inner.document.read().render(&session, &body);
    let mut response = Html(html).into_response();

    if let Some(scope) = fresh_scope {
        let cookie = format!("{STORE_COOKIE}={scope}; Path=/; HttpOnly; SameSite=Lax");
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().insert(SET_COOKIE, value);
            }
            Err(error) => tracing::warn!(%error, "invalid store cookie"),
        }
    }
    response
}

async fn stream(
    State(app): State<App>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let session = match InboundPayload::from_query(query.get(QUERY_PARAM).map(String::as_str))
        .and_then(|payload| app.registry().get(&payload.session_id))
    {
        Ok(session) => session,
        Err(error) => {
            tracing::debug!(%error, "stream failed to start");
            return error.into_response();
        }
    };

    let reconnect = headers
        .get("last-event-id")
        .and_then(|value| value.to_str().ok())
        == Some(RECONNECT_SENTINEL);

    let (sink, frames) = FrameSink::channel(FRAME_BUFFER);
    tokio::spawn(PatchPump::new(session, Arc::clone(app.registry()), sink).run(reconnect));

    let events = ReceiverStream::new(frames).map(|frame| Ok::<_, Infallible>(frame.to_event()));
    Sse::new(events)
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
        .into_response()
}

async fn action(
    State(app): State<App>,
    Path(action_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let payload = match InboundPayload::from_query(query.get(QUERY_PARAM).map(String::as_str)) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::debug!(action = %action_id, %error, "action request rejected");
            return error.into_response();
        }
    };

    // Callbacks are synchronous user code.
    let gateway = app.gateway().clone();
    let outcome = tokio::task::spawn_blocking(move || gateway.invoke(&action_id, payload)).await;

    match outcome {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(error)) => error.into_response(),
        Err(error) => {
            tracing::error!(%error, "action task failed");
            StatusCode::OK.into_response()
        }
    }
}

async fn close_session(State(app): State<App>, body: String) -> StatusCode {
    match app.registry().get(body.trim()) {
        Ok(session) => {
            tracing::debug!(session = %session.id(), "session close requested");
            app.registry().evict(&session);
        }
        Err(error) => tracing::debug!(%error, "session close ignored"),
    }
    StatusCode::OK
}
