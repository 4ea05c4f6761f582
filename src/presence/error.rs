/// 在线状态读写错误
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// 当前没有有效会话
    #[error("not authenticated")]
    Unauthenticated,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("api error {code}: {message}")]
    Api { code: i32, message: String },
}

impl PresenceError {
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, PresenceError::Unauthenticated)
    }
}
