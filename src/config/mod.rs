use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// 服务端配置
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            jwt_secret: env::var("JWT_SECRET")?,
            server_host: env::var("SERVER_HOST")?,
            server_port: parse_or_default("SERVER_PORT", env::var("SERVER_PORT").ok(), 3000),
            api_base_uri: env::var("API_BASE_URI").unwrap_or_else(|_| "/api".into()),
            rate_limit_window_secs: parse_or_default(
                "RATE_LIMIT_WINDOW",
                env::var("RATE_LIMIT_WINDOW").ok(),
                60,
            ),
            rate_limit_requests: parse_or_default(
                "RATE_LIMIT_REQUESTS",
                env::var("RATE_LIMIT_REQUESTS").ok(),
                100,
            ),
        })
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

/// 可选数值配置：未设置时使用默认值，无法解析时记录警告后使用默认值
fn parse_or_default<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = raw else {
        return default;
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Invalid {}={:?} ({}), using default {}", key, raw, e, default);
            default
        }
    }
}

/// 客户端（presence-agent）配置
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// 服务端地址，包含 API 前缀，例如 `http://127.0.0.1:3000/api`
    pub api_url: String,
    pub token: String,
    pub watch_user: Option<i64>,
    pub watch_chat: Option<i64>,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        Ok(AgentConfig {
            api_url: env::var("PRESENCE_API_URL")?
                .trim_end_matches('/')
                .to_string(),
            token: env::var("PRESENCE_TOKEN")?,
            watch_user: parse_optional(
                "PRESENCE_WATCH_USER",
                env::var("PRESENCE_WATCH_USER").ok(),
            ),
            watch_chat: parse_optional(
                "PRESENCE_WATCH_CHAT",
                env::var("PRESENCE_WATCH_CHAT").ok(),
            ),
        })
    }
}

/// 可选 ID 配置：无法解析时记录警告并视为未设置
fn parse_optional<T>(key: &str, raw: Option<String>) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = raw?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Invalid {}={:?} ({}), ignoring", key, raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_value_uses_default() {
        assert_eq!(parse_or_default::<u16>("SERVER_PORT", None, 3000), 3000);
    }

    #[test]
    fn valid_value_is_parsed() {
        assert_eq!(
            parse_or_default::<u16>("SERVER_PORT", Some(" 8080 ".into()), 3000),
            8080
        );
        assert_eq!(
            parse_or_default::<u32>("RATE_LIMIT_REQUESTS", Some("5".into()), 100),
            5
        );
    }

    #[test]
    fn garbled_value_falls_back_to_default() {
        assert_eq!(
            parse_or_default::<u16>("SERVER_PORT", Some("30o0".into()), 3000),
            3000
        );
        assert_eq!(
            parse_or_default::<u64>("RATE_LIMIT_WINDOW", Some("-1".into()), 60),
            60
        );
    }

    #[test]
    fn optional_ids_ignore_garbage() {
        assert_eq!(parse_optional::<i64>("PRESENCE_WATCH_USER", None), None);
        assert_eq!(
            parse_optional::<i64>("PRESENCE_WATCH_USER", Some("42".into())),
            Some(42)
        );
        assert_eq!(
            parse_optional::<i64>("PRESENCE_WATCH_CHAT", Some("room-1".into())),
            None
        );
    }
}
