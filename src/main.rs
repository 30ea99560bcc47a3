use axum::{
    extract::{FromRef, State},
    http::{header, HeaderValue, Method},
    routing::{delete, get, post},
    Router,
};
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod config;
mod events;
mod handlers;
mod metrics;
mod models;
mod presence;
mod schema;
mod utils;

use config::Config;
use metrics::Metrics;
use presence::PresenceRegistry;
use utils::auth::JwtKeys;
use utils::ids::IdGenerator;
use utils::media::MediaStore;

/// Matches the original deployment's 10mb JSON/body cap.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<ConnectionManager<PgConnection>>,
    pub presence: Arc<PresenceRegistry>,
    pub id_gen: Arc<IdGenerator>,
    pub jwt: JwtKeys,
    pub media: Arc<MediaStore>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<Config>,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> JwtKeys {
        state.jwt.clone()
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "pixelgram_backend=debug,tower_http=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::from_env().expect("invalid configuration");

    let manager = ConnectionManager::<PgConnection>::new(&cfg.database_url);
    let pool = Pool::builder()
        .build(manager)
        .expect("Failed to create pool");
    {
        let conn = &mut pool.get().expect("Failed to get connection for migrations");
        conn.run_pending_migrations(MIGRATIONS)
            .expect("Failed to run migrations");
    }

    let metrics = Arc::new(Metrics::new().expect("Failed to build metrics"));
    let state = AppState {
        db: pool,
        presence: Arc::new(PresenceRegistry::new(metrics.clone())),
        id_gen: Arc::new(utils::ids::new_generator(cfg.machine_id)),
        jwt: JwtKeys::new(&cfg.jwt_secret),
        media: Arc::new(
            MediaStore::from_env(cfg.media_bucket.clone(), cfg.media_public_url.clone()).await,
        ),
        metrics,
        config: Arc::new(cfg.clone()),
    };

    let origins: Vec<HeaderValue> = cfg
        .allowed_origins()
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/ws", get(handlers::ws::ws_handler))
        .route("/api/v1/user/register", post(handlers::users::register))
        .route("/api/v1/user/login", post(handlers::users::login))
        .route("/api/v1/user/logout", get(handlers::users::logout))
        .route("/api/v1/user/{id}/profile", get(handlers::users::get_profile))
        .route("/api/v1/user/profile/edit", post(handlers::users::edit_profile))
        .route("/api/v1/user/suggested", get(handlers::users::get_suggested_users))
        .route(
            "/api/v1/user/followorunfollow/{id}",
            post(handlers::users::follow_or_unfollow),
        )
        .route("/api/v1/post/addpost", post(handlers::posts::add_post))
        .route("/api/v1/post/all", get(handlers::posts::get_all_posts))
        .route("/api/v1/post/userpost/all", get(handlers::posts::get_user_posts))
        .route("/api/v1/post/{id}/like", get(handlers::posts::like_post))
        .route("/api/v1/post/{id}/dislike", get(handlers::posts::dislike_post))
        .route("/api/v1/post/{id}/comment", post(handlers::posts::add_comment))
        .route("/api/v1/post/{id}/comment/all", get(handlers::posts::get_comments))
        .route("/api/v1/post/delete/{id}", delete(handlers::posts::delete_post))
        .route("/api/v1/post/{id}/bookmark", get(handlers::posts::bookmark_post))
        .route("/api/v1/message/send/{id}", post(handlers::messages::send_message))
        .route("/api/v1/message/all/{id}", get(handlers::messages::get_messages))
        .layer(
            tower::ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
                .layer(cors),
        )
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");
    axum::serve(listener, app).await.expect("Server error");
}

async fn health(State(_state): State<AppState>) -> &'static str {
    "ok"
}
