pub mod config;
pub mod error_codes;
pub mod events;
pub mod state;
pub mod types;
pub mod validation;

pub use config::*;
pub use error_codes::{resolve, ErrorInfo};
pub use events::*;
pub use state::*;
pub use types::*;
pub use validation::*;
