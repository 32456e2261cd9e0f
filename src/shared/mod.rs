pub mod error;
pub mod state;

pub use error::CrmError;
pub use state::AppState;
