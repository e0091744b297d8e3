mod routes;
mod state;

pub mod handlers;

pub use routes::create_router;
pub use state::AppState;
