#![cfg(feature = "web")]

use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::cache::PriceCache;
use crate::config::Settings;
use crate::display::{Layout, QuoteView, RecordView};
use crate::error::PriceError;
use crate::login::{self, Authenticator, CurrentSession, SessionStore};
use crate::mailer::{Mailer, Notifier};
use crate::quote::{QuoteEvent, QuoteSession};
use crate::record::{find_by_row, search};
use crate::store::{CsvSheetStore, SheetStore};

/// Shared state behind every handler.
pub struct AppState {
    pub settings: Settings,
    pub cache: PriceCache,
    pub auth: Authenticator,
    pub sessions: SessionStore,
    /// `None` when no mail sender is configured; password reset is then refused.
    pub notifier: Option<Arc<dyn Notifier>>,
    templates: Handlebars<'static>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        store: Arc<dyn SheetStore>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Result<Self, PriceError> {
        let mut templates = Handlebars::new();
        templates
            .register_template_string("login", include_str!("./static/login.html"))
            .map_err(|e| PriceError::Template(e.to_string()))?;
        templates
            .register_template_string("search", include_str!("./static/search.html"))
            .map_err(|e| PriceError::Template(e.to_string()))?;

        let sheets = &settings.sheets;
        let cache = PriceCache::new(
            Arc::clone(&store),
            &sheets.price_table,
            Duration::from_secs(sheets.refresh_secs),
        );
        let auth = Authenticator::new(store, &sheets.users_table);
        let sessions = SessionStore::new(Duration::from_secs(settings.server.session_hours * 60 * 60));

        Ok(AppState {
            settings,
            cache,
            auth,
            sessions,
            notifier,
            templates,
        })
    }
}

/// Render a registered template, turning failures into a 500 page.
pub fn render_page(state: &AppState, name: &str, data: &serde_json::Value) -> Response {
    match state.templates.render(name, data) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!("Failed to render '{}': {}", name, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
        }
    }
}

impl IntoResponse for PriceError {
    fn into_response(self) -> Response {
        let status = match &self {
            PriceError::PriceOnRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PriceError::NoActiveQuote => StatusCode::CONFLICT,
            PriceError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            PriceError::SessionExpired => StatusCode::UNAUTHORIZED,
            PriceError::TableNotFound(_) | PriceError::Io { .. } | PriceError::Csv { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the router: public login routes plus the session-protected pages and API.
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/", get(serve_search_page))
        .route("/change-password", post(login::handle_change_password))
        .route("/api/records", get(list_records))
        .route("/api/quote", get(get_quote).post(update_quote))
        .route("/api/refresh", post(refresh_records))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), login::require_auth));

    Router::new()
        .route("/login", get(login::serve_login_page).post(login::handle_login))
        .route(
            "/forgot-password",
            get(login::serve_forgot_password_page).post(login::handle_forgot_password),
        )
        .route("/logout", post(login::handle_logout))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<dyn SheetStore> = Arc::new(CsvSheetStore::new(&settings.sheets.data_dir)?);
    let notifier: Option<Arc<dyn Notifier>> = match Mailer::new(&settings.mail) {
        Ok(mailer) => Some(Arc::new(mailer)),
        Err(e) => {
            warn!("Password reset mail disabled: {}", e);
            None
        }
    };

    let address = settings.bind_address();
    let state = Arc::new(AppState::new(settings, store, notifier)?);
    let app = router(state);

    let listener = TcpListener::bind(&address).await?;
    info!("Listening on http://{}", address);
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub layout: Option<String>,
    pub notice: Option<String>,
    pub error: Option<String>,
}

async fn serve_search_page(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Query(params): Query<SearchQuery>,
) -> Response {
    let query = params.q.clone().unwrap_or_default();
    let layout = Layout::from_query(params.layout.as_deref());
    let quote = current.session.quote.state().map(QuoteView::from);

    let mut data = serde_json::json!({
        "name": current.session.name,
        "query": query,
        "query_url": urlencoding::encode(&query),
        "cards": layout.is_cards(),
        "layout": if layout.is_cards() { "cards" } else { "table" },
        "notice": params.notice,
        "error": params.error,
        "quote": quote,
    });

    match state.cache.records() {
        Ok(records) => {
            let views: Vec<RecordView> = search(&records, &query).into_iter().map(RecordView::from).collect();
            data["searched"] = serde_json::json!(!query.trim().is_empty());
            data["count"] = serde_json::json!(views.len());
            data["records"] = serde_json::json!(views);
            data["loaded_at"] = serde_json::json!(
                state
                    .cache
                    .loaded_at()
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            );
        }
        Err(e) => {
            warn!("Price list unavailable: {}", e);
            data["db_error"] = serde_json::json!(true);
        }
    }

    render_page(&state, "search", &data)
}

#[derive(Debug, Serialize)]
struct RecordsResponse {
    count: usize,
    records: Vec<RecordView>,
}

async fn list_records(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<RecordsResponse>, PriceError> {
    let records = state.cache.records()?;
    let views: Vec<RecordView> = search(&records, params.q.as_deref().unwrap_or(""))
        .into_iter()
        .map(RecordView::from)
        .collect();
    Ok(Json(RecordsResponse {
        count: views.len(),
        records: views,
    }))
}

async fn refresh_records(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, PriceError> {
    state.cache.invalidate();
    let records = state.cache.records()?;
    Ok(Json(serde_json::json!({ "count": records.len() })))
}

/// Calculator action posted by the page.
///
/// `select` names a record by its source row; the spec guards against a row
/// index taken from a page rendered before the last reload.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum QuoteRequest {
    Select { row: usize, spec: String },
    EditDiscount { discount_percent: f64 },
    EditPrice { sale_price: f64 },
    Deselect,
}

#[derive(Debug, Serialize)]
struct QuoteResponse {
    quote: Option<QuoteView>,
}

impl From<&QuoteSession> for QuoteResponse {
    fn from(session: &QuoteSession) -> Self {
        QuoteResponse {
            quote: session.state().map(QuoteView::from),
        }
    }
}

async fn get_quote(Extension(current): Extension<CurrentSession>) -> Json<QuoteResponse> {
    Json(QuoteResponse::from(&current.session.quote))
}

/// Apply one calculator action to the session's current quote and store the result.
async fn update_quote(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, Response> {
    let event = match request {
        QuoteRequest::Select { row, spec } => {
            let records = state.cache.records().map_err(IntoResponse::into_response)?;
            let record = find_by_row(&records, row, &spec).ok_or_else(|| {
                (StatusCode::NOT_FOUND, format!("No record '{}' at row {}", spec, row)).into_response()
            })?;
            QuoteEvent::Select(record.clone())
        }
        QuoteRequest::EditDiscount { discount_percent } => QuoteEvent::EditDiscount(discount_percent),
        QuoteRequest::EditPrice { sale_price } => QuoteEvent::EditPrice(sale_price),
        QuoteRequest::Deselect => QuoteEvent::Deselect,
    };

    let next = state
        .sessions
        .update_quote(&current.id, |quote| quote.apply(event))
        .map_err(IntoResponse::into_response)?;
    Ok(Json(QuoteResponse::from(&next)))
}
