mod app;
mod auth;
mod checkin;
mod config;
mod events;
mod feed;
mod notify;
mod state;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "campus_checkin=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;

    if let Some(db) = &app_state.db {
        sqlx::migrate!("./migrations").run(db).await?;
        tracing::info!("migrations applied");
        feed::spawn_attendance_listener(db.clone(), app_state.feed.clone());
    }
    checkin::spawn_reaper(
        app_state.sessions.clone(),
        app_state.config.checkin.session_idle,
    );

    app::serve(app::build_app(app_state)).await
}
