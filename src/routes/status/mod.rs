mod handler;
mod model;

pub use handler::{get_chat_users_status, get_user_status, update_online_status};
pub use model::UpdateOnlineStatusRequest;
