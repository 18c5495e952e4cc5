//! Atalho: short slugs for links, shareable link collections and file
//! sharing by download slug.

pub mod blob;
pub mod collections;
pub mod config;
pub mod db;
pub mod error;
pub mod files;
pub mod handlers;
pub mod links;
pub mod models;
pub mod pages;
pub mod portability;
pub mod routes;
pub mod slug;
pub mod state;
pub mod suggestions;
pub mod sync;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::router;
pub use state::AppState;
