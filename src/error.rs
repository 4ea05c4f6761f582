use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::utils::{error_codes, error_to_api_response};

/// 服务端错误，统一转换为 `ApiResponse` 响应
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("未授权访问")]
    Unauthorized,
    #[error("请求参数无效: {0}")]
    BadRequest(String),
    #[error("用户不存在")]
    UserNotFound,
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, i32) {
        match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, error_codes::AUTH_FAILED),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR),
            AppError::UserNotFound => (StatusCode::NOT_FOUND, error_codes::NOT_FOUND),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::INTERNAL_ERROR,
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // 数据库错误细节只写日志，不返回给客户端
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "内部服务器错误".to_string()
            }
            other => other.to_string(),
        };

        (status, error_to_api_response::<()>(code, message)).into_response()
    }
}
