use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router,
    routing::{delete, get, post},
};
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use kakeibo::{config::Config, handlers, state::AppState};

/// 期限切れセッションレコードの掃除間隔
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ログ初期化（JSON形式、環境変数でレベル制御）
    init_tracing();

    tracing::info!("kakeibo auth 起動中...");

    // 設定読み込み
    let config = Config::load().map_err(|e| {
        tracing::error!(error = ?e, "設定の読み込みに失敗");
        anyhow::anyhow!("Failed to load config: {}", e)
    })?;

    tracing::info!(host = %config.host, port = %config.port, "設定読み込み完了");

    // サーバーアドレスを先に構築（config が move される前に）
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| {
            tracing::error!(error = ?e, "アドレスのパースに失敗");
            anyhow::anyhow!("Failed to parse address: {}", e)
        })?;

    // データベース接続プール作成
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(config.database_url.expose_secret())
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "データベース接続に失敗");
            anyhow::anyhow!("Failed to connect to database: {}", e)
        })?;

    tracing::info!("データベース接続完了");

    // AppState 構築
    let state = AppState::new(db_pool, config).map_err(|e| {
        tracing::error!(error = ?e, "AppState の構築に失敗");
        anyhow::anyhow!("Failed to create AppState: {}", e)
    })?;

    // 期限切れレコードの定期掃除（失敗してもサービスは継続）
    spawn_session_cleanup(state.session_service.clone());

    // Router 構築
    let app = create_router(state);

    // サーバー起動
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(error = ?e, addr = %addr, "ポートのバインドに失敗");
        anyhow::anyhow!("Failed to bind to {}: {}", addr, e)
    })?;

    tracing::info!(addr = %addr, "サーバー起動");

    // Graceful shutdown 対応
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "サーバーエラー");
            anyhow::anyhow!("Server error: {}", e)
        })?;

    tracing::info!("サーバー終了");

    Ok(())
}

/// tracing の初期化（JSON形式）
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,kakeibo=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Router の構築
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health_check))
        // 認証フロー
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/login/2fa", post(handlers::login_2fa))
        .route("/auth/login/2fa/backup", post(handlers::login_2fa_backup))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/logout", post(handlers::logout))
        // セッション管理
        .route(
            "/auth/sessions",
            get(handlers::list_sessions).delete(handlers::revoke_all_sessions),
        )
        .route("/auth/sessions/{id}", delete(handlers::revoke_session))
        // 二要素認証
        .route("/auth/2fa/setup", post(handlers::setup_2fa))
        .route("/auth/2fa/verify", post(handlers::verify_2fa))
        .route("/auth/2fa/disable", post(handlers::disable_2fa))
        .route(
            "/auth/2fa/backup-codes",
            post(handlers::regenerate_backup_codes),
        )
        // ソーシャルログイン
        .route("/auth/oauth/google", get(handlers::google_auth))
        .route(
            "/auth/oauth/google/callback",
            get(handlers::google_callback),
        )
        .with_state(state)
}

/// 期限切れ・失効済みセッションレコードの定期削除タスク
///
/// ストレージ回収のみが目的で、遅延してもトークン検証の正確性には
/// 影響しない（有効期限は毎回チェックされる）
fn spawn_session_cleanup(session_service: kakeibo::state::PgSessionService) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        // 起動直後の1回目はスキップ
        interval.tick().await;

        loop {
            interval.tick().await;
            match session_service.cleanup_expired().await {
                Ok(count) if count > 0 => {
                    tracing::info!(count = count, "期限切れセッションレコードを削除");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = ?e, "セッションレコードの掃除に失敗");
                }
            }
        }
    });
}

/// Graceful shutdown シグナル待機
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "Ctrl+C ハンドラーのインストールに失敗");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "SIGTERM ハンドラーのインストールに失敗");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("SIGTERM received, starting graceful shutdown");
        }
    }
}
