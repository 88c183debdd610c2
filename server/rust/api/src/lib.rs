pub mod adapter;
pub mod infrastructure;

pub use adapter::handler::{router, AppState};
pub use infrastructure::config::Config;
