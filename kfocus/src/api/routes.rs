use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let chat = Router::new()
        .route(
            "/sessions",
            get(handlers::chat::list_sessions).post(handlers::chat::create_session),
        )
        .route("/sessions/smart", post(handlers::chat::create_smart_session))
        .route(
            "/sessions/{id}",
            get(handlers::chat::get_session)
                .put(handlers::chat::update_session)
                .delete(handlers::chat::delete_session),
        )
        .route(
            "/sessions/{id}/messages",
            get(handlers::chat::get_messages).post(handlers::chat::save_message),
        )
        .route(
            "/sessions/{id}/pinned-files",
            get(handlers::chat::get_pinned_files)
                .post(handlers::chat::pin_file)
                .delete(handlers::chat::unpin_file),
        )
        .route("/sessions/{id}/stats", get(handlers::chat::session_stats))
        .route("/ui-stream", post(handlers::chat::ui_stream));

    let models = Router::new()
        .route(
            "/providers",
            get(handlers::models::list_providers).post(handlers::models::add_provider),
        )
        .route("/providers/{id}", axum::routing::put(handlers::models::update_provider))
        .route(
            "/providers/{id}/discover",
            post(handlers::models::discover_provider_models),
        )
        .route(
            "/providers/{id}/configurations",
            get(handlers::models::list_configurations),
        )
        .route(
            "/configurations/{id}/probe",
            post(handlers::models::probe_configuration),
        )
        .route(
            "/configurations/{id}/capabilities",
            post(handlers::models::add_capability),
        )
        .route(
            "/capabilities/{capability}/assignment",
            axum::routing::put(handlers::models::assign_capability)
                .delete(handlers::models::clear_assignment),
        );

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/config/all", get(handlers::config::config_all))
        .route(
            "/system-config/{key}",
            get(handlers::config::get_system_config).put(handlers::config::put_system_config),
        )
        .route(
            "/directories",
            get(handlers::config::list_directories).post(handlers::config::add_directory),
        )
        .route(
            "/directories/{id}",
            axum::routing::put(handlers::config::update_directory)
                .delete(handlers::config::delete_directory),
        )
        .route(
            "/bundle-extensions",
            get(handlers::config::list_bundle_extensions)
                .post(handlers::config::add_bundle_extension),
        )
        .route(
            "/bundle-extensions/{id}",
            delete(handlers::config::delete_bundle_extension),
        )
        .route("/folders/hierarchy", get(handlers::config::folders_hierarchy))
        .route(
            "/rules",
            get(handlers::config::watcher_rules),
        )
        .route(
            "/rules/filter",
            post(handlers::config::create_filter_rule),
        )
        .route(
            "/rules/filter/{id}",
            axum::routing::put(handlers::config::toggle_filter_rule),
        )
        .route("/screening/result", post(handlers::files::submit_screening))
        .route("/screening/batch", post(handlers::files::submit_screening_batch))
        .route("/pin-file", post(handlers::files::pin_file))
        .route("/task/{id}", get(handlers::files::get_task))
        .route("/search", post(handlers::files::semantic_search))
        .route(
            "/tagging/search-files",
            post(handlers::files::search_files_by_tags),
        )
        .route("/tagging/tag-cloud", get(handlers::files::tag_cloud))
        .route("/tools/response", post(handlers::tools::tool_response))
        .nest("/chat", chat)
        .nest("/models", models)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
