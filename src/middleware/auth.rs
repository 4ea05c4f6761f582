use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};

use crate::{AppState, error::AppError, utils::verify_token};

/// 校验 Bearer 令牌，并把 `Claims` 放入请求扩展
pub async fn auth_middleware(
    State(state): State<AppState>,
    auth: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) = auth.map_err(|e| {
        tracing::debug!("Missing or malformed authorization header: {}", e);
        AppError::Unauthorized
    })?;

    let claims = verify_token(bearer.token(), &state.config).map_err(|e| {
        tracing::debug!("Token verification failed: {}", e);
        AppError::Unauthorized
    })?;

    // 令牌主体必须是数字用户ID
    if claims.user_id().is_none() {
        tracing::debug!("Token subject is not a user id: {}", claims.sub);
        return Err(AppError::Unauthorized);
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
