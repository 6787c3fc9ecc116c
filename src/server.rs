use std::{sync::Arc, time::Duration};

use axum::{
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post, put},
    Router,
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::routes::{
    accept_invite_handler, add_attendance_handler, add_grade_handler, create_event_handler,
    create_invite_handler, create_user_handler, dashboard_handler, delete_attendance_handler,
    delete_grade_handler, enroll_handler, health_handler, list_attendance_handler,
    list_events_handler, list_grades_handler, overview_handler, predict_handler,
    profile_handler, reports_handler, role_handler, students_handler,
    update_attendance_handler, update_grade_handler,
};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/health", get(health_handler))
        .route("/predict", post(predict_handler))
        .route("/users", post(create_user_handler))
        .route("/users/{id}/role", put(role_handler))
        .route("/users/{id}/profile", put(profile_handler))
        .route("/users/{id}/enrollments", post(enroll_handler))
        .route("/users/{id}/dashboard", get(dashboard_handler))
        .route(
            "/users/{id}/events",
            get(list_events_handler).post(create_event_handler),
        )
        .route(
            "/enrollments/{id}/grades",
            get(list_grades_handler).post(add_grade_handler),
        )
        .route(
            "/grades/{id}",
            put(update_grade_handler).delete(delete_grade_handler),
        )
        .route(
            "/enrollments/{id}/attendance",
            get(list_attendance_handler).post(add_attendance_handler),
        )
        .route(
            "/attendance/{id}",
            put(update_attendance_handler).delete(delete_attendance_handler),
        )
        .route("/instructor/overview", get(overview_handler))
        .route("/instructor/students", get(students_handler))
        .route("/instructor/reports", get(reports_handler))
        .route("/invites", post(create_invite_handler))
        .route("/invites/{token}/accept", post(accept_invite_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn start_server(state: Arc<AppState>) -> anyhow::Result<()> {
    info!("Starting server...");
    let address = format!("0.0.0.0:{}", state.config.port);
    let app = router(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
