/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use taskhub_api::{app::{build_router, AppState}, config::Config};
/// use taskhub_shared::db::pool::create_pool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = create_pool(config.database.pool_config()).await?;
/// let app = build_router(AppState::new(pool, config));
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use taskhub_shared::{auth::jwt::TokenSettings, pagination::PaginationLimits};
use tower_http::{
    compression::CompressionLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    config::Config,
    middleware::{auth::require_auth, cors::cors_layer, security::SecurityHeadersLayer},
    routes,
};

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    /// Signing settings derived from `config.jwt` once at startup
    pub tokens: Arc<TokenSettings>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        let tokens = Arc::new(config.jwt.token_settings());
        Self {
            db,
            config: Arc::new(config),
            tokens,
        }
    }

    pub fn limits(&self) -> PaginationLimits {
        self.config.pagination.limits()
    }
}

/// Builds the complete router
///
/// ```text
/// /health                          public
/// /uploads/*                       static files
/// /api/diagnostic                  public
/// /api/auth/{register,login,refresh}
///                                  public
/// /api/...                         bearer token required
/// ```
///
/// Layers, outermost first: security headers, CORS, compression, tracing,
/// body limit.
pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/diagnostic", get(routes::health::diagnostic))
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh));

    let protected = Router::new()
        // Auth
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/password", put(routes::auth::change_password))
        .route("/auth/logout", post(routes::auth::logout))
        // Users
        .route("/users", get(routes::users::list_users))
        .route(
            "/users/:id",
            get(routes::users::get_user)
                .put(routes::users::update_user)
                .delete(routes::users::delete_user),
        )
        // Projects
        .route(
            "/projects",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route(
            "/projects/:id",
            get(routes::projects::get_project)
                .put(routes::projects::update_project)
                .delete(routes::projects::delete_project),
        )
        .route(
            "/projects/:id/members",
            get(routes::projects::list_members).post(routes::projects::add_member),
        )
        .route("/projects/:id/members/:user_id", delete(routes::projects::remove_member))
        .route("/projects/:id/tasks", get(routes::projects::project_tasks))
        // Tasks
        .route("/tasks", get(routes::tasks::list_tasks).post(routes::tasks::create_task))
        .route(
            "/tasks/:id",
            get(routes::tasks::get_task)
                .put(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        .route("/tasks/:id/tags", get(routes::tasks::list_task_tags))
        .route(
            "/tasks/:id/tags/:tag_id",
            post(routes::tasks::attach_tag).delete(routes::tasks::detach_tag),
        )
        .route(
            "/tasks/:id/comments",
            get(routes::comments::list_comments).post(routes::comments::create_comment),
        )
        .route(
            "/comments/:id",
            put(routes::comments::update_comment).delete(routes::comments::delete_comment),
        )
        .route(
            "/tasks/:id/attachments",
            get(routes::attachments::list_attachments).post(routes::attachments::upload_attachment),
        )
        .route("/attachments/:id", delete(routes::attachments::delete_attachment))
        // Tags
        .route("/tags", get(routes::tags::list_tags).post(routes::tags::create_tag))
        .route(
            "/tags/:id",
            put(routes::tags::update_tag).delete(routes::tags::delete_tag),
        )
        // Time entries
        .route(
            "/time",
            get(routes::time_entries::list_entries).post(routes::time_entries::create_entry),
        )
        .route(
            "/time/:id",
            put(routes::time_entries::update_entry).delete(routes::time_entries::delete_entry),
        )
        // Timer
        .route("/time-tracking/start", post(routes::time_tracking::start_timer))
        .route("/time-tracking/pause", post(routes::time_tracking::pause_timer))
        .route("/time-tracking/resume", post(routes::time_tracking::resume_timer))
        .route("/time-tracking/stop", post(routes::time_tracking::stop_timer))
        .route("/time-tracking/active", get(routes::time_tracking::active_timer))
        .route("/time-tracking/stats", get(routes::time_tracking::stats))
        // Overviews
        .route("/calendar", get(routes::calendar::calendar))
        .route("/dashboard", get(routes::dashboard::dashboard))
        // Notifications
        .route("/notifications", get(routes::notifications::list_notifications))
        .route("/notifications/read-all", put(routes::notifications::mark_all_read))
        .route("/notifications/:id/read", put(routes::notifications::mark_read))
        // route_layer: unknown paths stay 404 instead of 401
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth));

    let config = state.config.clone();
    let body_limit = config.upload.max_size.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", public.merge(protected))
        .nest_service(routes::attachments::UPLOADS_PREFIX, ServeDir::new(&config.upload.dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors_layer(&config.api))
        .layer(SecurityHeadersLayer::new(config.api.is_production()))
        .with_state(state)
}
