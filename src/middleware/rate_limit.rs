use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::AsyncCommands;

use crate::{
    config::Config,
    utils::{error_codes, error_to_api_response, verify_token},
};

/// 基于 Redis 的固定窗口限流
///
/// 已登录请求按用户计数，其余按客户端 IP 计数。
/// 在线状态上报（包括退出时的 beacon）不参与限流，
/// 否则被拒绝的离线上报会让用户一直显示在线。
#[derive(Clone)]
pub struct RateLimiter {
    redis: Arc<redis::Client>,
    config: Arc<Config>,
}

impl RateLimiter {
    pub fn new(redis: redis::Client, config: Config) -> Self {
        Self {
            redis: Arc::new(redis),
            config: Arc::new(config),
        }
    }

    /// 是否跳过限流
    fn is_exempt(&self, method: &Method, path: &str) -> bool {
        let base = self.config.api_base_uri.trim_end_matches('/');
        *method == Method::POST && path == format!("{}/status/online", base)
    }

    /// 计数键：令牌有效时使用用户ID，否则使用客户端IP
    fn limit_key(&self, headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
        let user_id = headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .and_then(|token| verify_token(token.trim(), &self.config).ok())
            .and_then(|claims| claims.user_id());

        match user_id {
            Some(id) => format!("rate_limit:user:{}", id),
            None => format!("rate_limit:ip:{}", client_ip(headers, remote)),
        }
    }

    pub async fn check_rate_limit(
        self: Arc<Self>,
        req: Request<Body>,
        next: Next,
    ) -> Result<Response, StatusCode> {
        if self.is_exempt(req.method(), req.uri().path()) {
            return Ok(next.run(req).await);
        }

        let remote = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0);
        let key = self.limit_key(req.headers(), remote);

        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                tracing::error!("Rate limiter failed to connect to Redis: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

        let count: i64 = conn.incr(&key, 1).await.map_err(|e| {
            tracing::error!("Rate limiter failed to increment {}: {}", key, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

        // 窗口内第一次请求时设置过期
        if count == 1 {
            let _: () = conn
                .expire(&key, self.config.rate_limit_window().as_secs() as i64)
                .await
                .map_err(|e| {
                    tracing::error!("Rate limiter failed to set expiry on {}: {}", key, e);
                    StatusCode::INTERNAL_SERVER_ERROR
                })?;
        }

        if count > i64::from(self.config.rate_limit_requests) {
            tracing::info!("Rate limit exceeded for {}", key);
            return Ok(too_many_requests(self.config.rate_limit_window().as_secs()));
        }

        Ok(next.run(req).await)
    }
}

fn too_many_requests(window_secs: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        error_to_api_response::<()>(
            error_codes::RATE_LIMIT,
            format!("请求过于频繁，请在{}秒后重试", window_secs),
        ),
    )
        .into_response()
}

/// 客户端IP：x-real-ip，其次 x-forwarded-for 中第一个非空地址，再次连接地址
fn client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    let header_ip = headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').map(str::trim).find(|ip| !ip.is_empty()))
        });

    match (header_ip, remote) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".into(),
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    limiter.check_rate_limit(req, next).await
}
