use axum::{routing::get, Router};
use murmur_rooms::{
    fanout::RoomFanout, gateway::Gateway, presence::PresenceRegistry, rooms, store::MessageStore,
    AppState,
};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "murmur_rooms=info".into()),
        )
        .init();

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(dotenv::var("DATABASE_URL")?.as_str())
        .await?;

    let store = MessageStore::new(db_pool);
    store.migrate().await?;

    let app_state = AppState {
        gateway: Gateway::new(store, PresenceRegistry::new(), RoomFanout::new()),
    };

    let app = Router::new()
        .route("/ws", get(rooms::chat_ws))
        .nest("/rooms", rooms::router())
        .with_state(app_state)
        .layer(CorsLayer::permissive());

    let port: u16 = dotenv::var("PORT").unwrap_or_else(|_| "3000".to_owned()).parse()?;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(%port, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
