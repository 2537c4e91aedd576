pub(crate) mod signature;

/// HTTP surface of the bridge.
///
/// Three endpoints: a liveness probe, the WeChat server-ownership challenge,
/// and message delivery. Signature verification happens before any payload
/// work. Delivery failures are encoded in the reply text, never in the
/// transport status, so the platform does not redeliver and duplicate
/// conversation state.
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::codec::{self, InboundMessage};
use crate::config::Config;
use crate::providers::LLMProvider;
use crate::reply;
use crate::session::ConversationStore;

/// Max delivery payload size: 1 MB.
const DELIVERY_MAX_BODY: usize = 1_048_576;

/// Shared state between the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    wechat_token: String,
    provider: Arc<dyn LLMProvider>,
    store: Option<Arc<ConversationStore>>,
}

impl AppState {
    pub fn new(
        wechat_token: String,
        provider: Arc<dyn LLMProvider>,
        store: Option<Arc<ConversationStore>>,
    ) -> Self {
        Self {
            wechat_token,
            provider,
            store,
        }
    }
}

/// Query parameters WeChat appends to every callback. All optional so that
/// missing values reach the handlers, which decide between 400 and 401.
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    signature: Option<String>,
    timestamp: Option<String>,
    nonce: Option<String>,
    echostr: Option<String>,
}

impl CallbackQuery {
    /// Whether the supplied signature authenticates against `token`.
    /// Missing values never verify.
    fn verifies_against(&self, token: &str) -> bool {
        match (&self.signature, &self.timestamp, &self.nonce) {
            (Some(sig), Some(ts), Some(nonce)) => signature::verify(token, ts, nonce, sig),
            _ => false,
        }
    }
}

/// Build the bridge router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/wechat", get(challenge_handler).post(delivery_handler))
        .with_state(state)
}

/// GET / — liveness probe.
async fn health_handler() -> &'static str {
    "ok"
}

/// GET /wechat — server-ownership challenge. Echoes `echostr` byte-exact on
/// a valid signature.
async fn challenge_handler(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if query.signature.is_none()
        || query.timestamp.is_none()
        || query.nonce.is_none()
        || query.echostr.is_none()
    {
        return (StatusCode::BAD_REQUEST, "missing params").into_response();
    }

    if !query.verifies_against(&state.wechat_token) {
        warn!("challenge rejected: bad signature");
        return (StatusCode::UNAUTHORIZED, "bad signature").into_response();
    }

    debug!("challenge verified");
    (StatusCode::OK, query.echostr.unwrap_or_default()).into_response()
}

/// POST /wechat — message delivery. The body is taken as raw text: the
/// platform labels it text/xml, application/xml or text/plain depending on
/// the deployment, so the content type is never inspected.
async fn delivery_handler(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    body: String,
) -> Response {
    // Authenticate before any payload work.
    if !query.verifies_against(&state.wechat_token) {
        warn!("delivery rejected: bad signature");
        return (StatusCode::UNAUTHORIZED, "bad signature").into_response();
    }

    if body.len() > DELIVERY_MAX_BODY {
        warn!("delivery payload too large ({} bytes)", body.len());
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    let inbound = InboundMessage::parse(&body);
    debug!(
        "delivery from {} to {} ({} bytes)",
        inbound.from_user,
        inbound.to_account,
        body.len()
    );

    let outcome = reply::orchestrate(
        state.provider.as_ref(),
        state.store.as_deref(),
        &inbound,
    )
    .await;

    // Roles swap: the inbound sender becomes the reply recipient.
    let document = codec::encode_text_reply(&inbound.from_user, &inbound.to_account, outcome.text());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        document,
    )
        .into_response()
}

/// Start the bridge HTTP server. Runs until the listener fails.
pub async fn start(config: &Config, provider: Arc<dyn LLMProvider>) -> Result<()> {
    let store = config
        .history_enabled
        .then(|| Arc::new(ConversationStore::new()));
    if store.is_some() {
        info!("conversation history enabled (24h window)");
    } else {
        info!("conversation history disabled");
    }
    info!("chat model: {}", provider.default_model());

    let state = AppState::new(config.wechat_token.clone(), provider, store);
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("wxbridge {} listening on {}", crate::VERSION, addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
