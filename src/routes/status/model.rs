use serde::Deserialize;

/// 在线状态上报请求，同时作为退出时 beacon 的请求体
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOnlineStatusRequest {
    pub is_online: bool,
}
