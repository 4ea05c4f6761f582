use axum::{
    Extension,
    body::Bytes,
    extract::{Path, State, rejection::PathRejection},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppError,
    presence::{ChatId, UserId},
    utils::{Claims, success_to_api_response},
};

use super::model::UpdateOnlineStatusRequest;

fn current_user(claims: &Claims) -> Result<UserId, AppError> {
    claims.user_id().ok_or(AppError::Unauthorized)
}

/// 更新当前用户的在线状态
///
/// 请求体按 JSON 解析，不检查 Content-Type，浏览器 beacon 常以 text/plain 发送。
#[axum::debug_handler]
pub async fn update_online_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let user_id = current_user(&claims)?;
    let req: UpdateOnlineStatusRequest =
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let status = state
        .repo
        .set_online(user_id, req.is_online)
        .await?
        .ok_or(AppError::UserNotFound)?;

    Ok((StatusCode::OK, success_to_api_response(status)))
}

/// 查询单个用户状态，用户不存在时 `resp_data` 为空
#[axum::debug_handler]
pub async fn get_user_status(
    State(state): State<AppState>,
    user_id: Result<Path<UserId>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(user_id) = user_id.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let status = state.repo.find_by_user(user_id).await?;
    if status.is_none() {
        tracing::debug!("No status row for user {}", user_id);
    }

    Ok((StatusCode::OK, success_to_api_response(status)))
}

/// 查询聊天室全部成员的状态
#[axum::debug_handler]
pub async fn get_chat_users_status(
    State(state): State<AppState>,
    chat_id: Result<Path<ChatId>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(chat_id) = chat_id.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let members = state.repo.find_by_chat(chat_id).await?;

    Ok((StatusCode::OK, success_to_api_response(members)))
}
