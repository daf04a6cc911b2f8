//!
//! advisorhub HTTP server
//! -----------------------
//! Axum-based JSON API over the tenant services.
//!
//! Responsibilities:
//! - Session management with a cookie + CSRF token model.
//! - Login/logout endpoints backed by the configured `IdentityProvider`.
//! - Firm, advisor and contact endpoints delegating to the firm-scoped services.
//! - Administrative provisioning endpoints (refused in production).
//! - Store selection, optional demo seeding and startup logs.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::advisors::AdvisorService;
use crate::config::{AppConfig, Environment, StoreConfig};
use crate::contacts::{ContactFilter, ContactRepository, StatusFilter};
use crate::error::{AppError, AppResult, LOGIN_PATH};
use crate::identity::{IdentityProvider, LocalIdentityProvider, LoginRequest, RequestContext, SessionManager};
use crate::model::{AdvisorPatch, ContactPatch, NewContact, Page};
use crate::provisioning::{ProvisionRequest, Provisioner};
use crate::store::{MemoryStore, Store};

pub const SESSION_COOKIE: &str = "advisorhub_session";
pub const CSRF_HEADER: &str = "x-csrf-token";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub identity: Arc<dyn IdentityProvider>,
    pub sessions: Arc<SessionManager>,
    pub contacts: ContactRepository,
    pub advisors: AdvisorService,
    pub provisioner: Provisioner,
    pub environment: Environment,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, identity: Arc<dyn IdentityProvider>, config: &AppConfig) -> Self {
        Self {
            contacts: ContactRepository::new(store.clone()),
            advisors: AdvisorService::new(store.clone()),
            provisioner: Provisioner::new(store.clone(), identity.clone(), config.environment),
            sessions: Arc::new(SessionManager::new(config.session_ttl)),
            environment: config.environment,
            store,
            identity,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut body = json!({"status": "error", "code": self.code_str(), "error": self.message()});
        if let AppError::Validation { fields, .. } = &self {
            body["fields"] = json!(fields);
        }
        if let Some(link) = self.remediation() {
            let key = if link == LOGIN_PATH { "redirect" } else { "remediation" };
            body[key] = json!(link);
        }
        (status, Json(body)).into_response()
    }
}

/// Build the router over `state`. Exposed separately from [`run`] so tests can serve it on an
/// ephemeral port.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "advisorhub ok" }))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/csrf", get(get_csrf))
        .route("/me", get(me))
        .route("/firms/{id}", get(get_firm))
        .route("/advisors", get(list_advisors))
        .route("/advisors/{id}", get(get_advisor).patch(update_advisor))
        .route("/contacts", get(list_contacts).post(create_contact))
        .route("/contacts/{id}", get(get_contact).patch(update_contact).delete(delete_contact))
        .route("/admin/advisors", post(provision_advisor))
        .route("/admin/test-advisor", post(provision_test_advisor))
        .with_state(state)
}

/// Open the configured store: in-memory when no endpoint is set, PostgreSQL otherwise.
pub async fn open_store(cfg: &StoreConfig) -> anyhow::Result<Arc<dyn Store>> {
    let Some(endpoint) = cfg.endpoint.as_deref() else {
        info!(target: "startup", "no database endpoint configured; using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    };
    #[cfg(feature = "postgres")]
    {
        let store = crate::store::PostgresStore::connect(cfg)
            .await
            .context("While connecting to the PostgreSQL store")?;
        store.migrate().await.context("While applying schema and row policies")?;
        info!(target: "startup", "connected to PostgreSQL store at {}", redact(endpoint));
        Ok(Arc::new(store))
    }
    #[cfg(not(feature = "postgres"))]
    {
        anyhow::bail!("database endpoint '{}' configured but this binary was built without the 'postgres' feature", redact(endpoint))
    }
}

/// Endpoint with any embedded credentials removed, for logs and errors.
fn redact(endpoint: &str) -> String {
    match endpoint.split_once('@') {
        Some((_, host)) => format!("postgres://<redacted>@{}", host),
        None => endpoint.to_string(),
    }
}

fn log_startup(config: &AppConfig) {
    info!(
        target: "startup",
        "advisorhub starting: http_port={}, environment={}, store={}, seed_demo={}, session_ttl_secs={}",
        config.http_port,
        config.environment,
        if config.store.endpoint.is_some() { "postgres" } else { "memory" },
        config.seed_demo,
        config.session_ttl.as_secs()
    );
}

/// Start the HTTP server on the configured port.
///
/// Opens the store, applies the demo seed when asked to (never in production), and mounts all
/// routes.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    log_startup(&config);
    let store = open_store(&config.store).await?;

    if config.seed_demo {
        if config.environment.allows_provisioning() {
            crate::seed::seed_demo_data(store.as_ref()).await.context("While seeding demo data")?;
        } else {
            warn!(target: "startup", "demo seed requested in {}; ignored", config.environment);
        }
    }

    let identity: Arc<dyn IdentityProvider> = Arc::new(LocalIdentityProvider::new());
    let state = AppState::new(store, identity, &config);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!(target: "startup", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("While binding {}", addr))?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let s = headers.get(header::COOKIE)?.to_str().ok()?;
    s.split(';')
        .filter_map(|part| part.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn request_context(state: &AppState, headers: &HeaderMap) -> RequestContext {
    let request_id = header_str(headers, REQUEST_ID_HEADER).map(str::to_string);
    match parse_cookie(headers, SESSION_COOKIE).and_then(|sid| state.sessions.validate(&sid)) {
        Some(session) => RequestContext::from_session(&session, request_id),
        None => RequestContext::anonymous(request_id),
    }
}

/// Signed-in user id, plus the CSRF check when the request changes state.
fn caller(state: &AppState, headers: &HeaderMap, mutating: bool) -> AppResult<Uuid> {
    let ctx = request_context(state, headers);
    let user_id = ctx.current_user()?.user_id;
    if mutating {
        ctx.verify_csrf(header_str(headers, CSRF_HEADER))?;
    }
    debug!(target: "http", "request user={} request_id={:?}", user_id, ctx.request_id);
    Ok(user_id)
}

fn session_cookie(env: Environment, sid: &str) -> AppResult<HeaderValue> {
    let secure = if env.secure_cookies() { "; Secure" } else { "" };
    HeaderValue::from_str(&format!("{}={}; HttpOnly{}; SameSite=Strict; Path=/", SESSION_COOKIE, sid, secure))
        .map_err(|e| AppError::from(anyhow::anyhow!("invalid cookie value: {}", e)))
}

fn clear_session_cookie(env: Environment) -> HeaderValue {
    let secure = if env.secure_cookies() { "; Secure" } else { "" };
    HeaderValue::from_str(&format!(
        "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly{}; SameSite=Strict; Path=/",
        SESSION_COOKIE, secure
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("advisorhub_session=deleted; Path=/"))
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
}

async fn login(State(state): State<AppState>, headers: HeaderMap, Json(payload): Json<LoginPayload>) -> AppResult<Response> {
    let req = LoginRequest {
        email: payload.email,
        password: payload.password,
        ip: header_str(&headers, "x-forwarded-for").map(str::to_string),
    };
    let principal = state.identity.authenticate(&req).await?;
    let session = state.sessions.issue(principal)?;
    let mut h = HeaderMap::new();
    h.insert(header::SET_COOKIE, session_cookie(state.environment, &session.token)?);
    info!(target: "http", "login user={}", session.principal.user_id);
    Ok((StatusCode::OK, h, Json(json!({"status": "ok", "csrf": session.csrf_token, "user": session.principal}))).into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let ctx = request_context(&state, &headers);
    ctx.verify_csrf(header_str(&headers, CSRF_HEADER))?;
    if let Some(token) = &ctx.session_token {
        state.sessions.logout(token);
    }
    let mut h = HeaderMap::new();
    h.insert(header::SET_COOKIE, clear_session_cookie(state.environment));
    Ok((StatusCode::OK, h, Json(json!({"status": "ok"}))).into_response())
}

async fn get_csrf(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<serde_json::Value>> {
    let session = parse_cookie(&headers, SESSION_COOKIE)
        .and_then(|sid| state.sessions.validate(&sid))
        .ok_or_else(|| AppError::unauthenticated("unauthenticated", "Please sign in to continue"))?;
    Ok(Json(json!({"status": "ok", "csrf": session.csrf_token})))
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<serde_json::Value>> {
    let ctx = request_context(&state, &headers);
    let user = ctx.current_user()?;
    let advisor = state.advisors.current_advisor(user.user_id).await?;
    Ok(Json(json!({"status": "ok", "user": user, "advisor": advisor})))
}

async fn get_firm(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>) -> AppResult<Json<serde_json::Value>> {
    let user_id = caller(&state, &headers, false)?;
    let firm = state.advisors.firm(user_id, id).await?;
    Ok(Json(json!({"status": "ok", "firm": firm})))
}

async fn list_advisors(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<serde_json::Value>> {
    let user_id = caller(&state, &headers, false)?;
    let advisors = state.advisors.list_advisors(user_id).await?;
    Ok(Json(json!({"status": "ok", "advisors": advisors})))
}

async fn get_advisor(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>) -> AppResult<Json<serde_json::Value>> {
    let user_id = caller(&state, &headers, false)?;
    let advisor = state.advisors.get_advisor(user_id, id).await?;
    Ok(Json(json!({"status": "ok", "advisor": advisor})))
}

async fn update_advisor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(patch): Json<AdvisorPatch>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = caller(&state, &headers, true)?;
    let advisor = state.advisors.update_profile(user_id, id, patch).await?;
    Ok(Json(json!({"status": "ok", "advisor": advisor})))
}

#[derive(Debug, Default, Deserialize)]
struct ContactQuery {
    q: Option<String>,
    status: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn list_contacts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ContactQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = caller(&state, &headers, false)?;
    let status: StatusFilter = params
        .status
        .as_deref()
        .unwrap_or("all")
        .parse()
        .map_err(|e: String| AppError::invalid_field("status", e))?;
    let filter = ContactFilter::new(params.q.unwrap_or_default(), status);
    let page = state
        .contacts
        .search_contacts(user_id, &filter, Page::from_params(params.limit, params.offset))
        .await?;
    Ok(Json(json!({
        "status": "ok",
        "contacts": page.contacts,
        "matched": page.matched,
        "total": page.total,
        "limit": page.limit,
        "offset": page.offset,
    })))
}

async fn create_contact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewContact>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let user_id = caller(&state, &headers, true)?;
    let contact = state.contacts.create_contact(user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(json!({"status": "ok", "contact": contact}))))
}

async fn get_contact(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>) -> AppResult<Json<serde_json::Value>> {
    let user_id = caller(&state, &headers, false)?;
    let contact = state.contacts.get_contact(user_id, id).await?;
    Ok(Json(json!({"status": "ok", "contact": contact})))
}

async fn update_contact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(patch): Json<ContactPatch>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = caller(&state, &headers, true)?;
    let contact = state.contacts.update_contact(user_id, id, patch).await?;
    Ok(Json(json!({"status": "ok", "contact": contact})))
}

async fn delete_contact(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>) -> AppResult<Json<serde_json::Value>> {
    let user_id = caller(&state, &headers, true)?;
    state.contacts.delete_contact(user_id, id).await?;
    Ok(Json(json!({"status": "ok", "deleted": id})))
}

async fn provision_advisor(State(state): State<AppState>, Json(req): Json<ProvisionRequest>) -> AppResult<Json<serde_json::Value>> {
    let out = state.provisioner.provision_advisor(req).await?;
    if out.moved_from_firm.is_some() {
        // Open sessions were issued for the old firm.
        let revoked = state.sessions.revoke_user(out.advisor.id);
        info!(target: "provisioning", "revoked {} session(s) of moved advisor {}", revoked, out.advisor.id);
    }
    Ok(Json(json!({"status": "ok", "provisioned": out})))
}

async fn provision_test_advisor(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let out = state.provisioner.provision_test_advisor().await?;
    Ok(Json(json!({
        "status": "ok",
        "provisioned": out,
        "credentials": {
            "email": crate::provisioning::TEST_ADVISOR_EMAIL,
            "password": crate::provisioning::TEST_ADVISOR_PASSWORD,
        },
    })))
}
