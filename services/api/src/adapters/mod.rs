pub mod auth;
pub mod db;

pub use auth::{AuthNotifier, CookieAuthProvider};
pub use db::DbAdapter;
