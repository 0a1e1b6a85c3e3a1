pub mod command;
pub mod error;
pub mod runner;
pub mod store;
pub mod types;

pub use command::*;
pub use error::*;
pub use runner::*;
pub use store::*;
pub use types::*;
