use axum::{
    Router,
    routing::{get, post},
};

use crate::{AppState, middleware::auth_middleware};

pub mod status;

/// 构建业务路由，所有接口都需要认证，并挂载在 `api_base_uri` 下
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/status/online", post(status::update_online_status))
        .route("/status/users/{user_id}", get(status::get_user_status))
        .route("/status/chats/{chat_id}", get(status::get_chat_users_status))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // axum 不允许在根路径 nest
    let base = state.config.api_base_uri.trim_end_matches('/');
    let router = if base.is_empty() {
        Router::new().merge(protected_routes)
    } else {
        Router::new().nest(base, protected_routes)
    };

    router.with_state(state)
}
