use config::Config;
use database::StatusRepository;
use std::sync::Arc;

pub mod config;
pub mod database;
pub mod error;
pub mod middleware;
pub mod presence;
pub mod routes;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn StatusRepository>,
    pub config: Config,
}
