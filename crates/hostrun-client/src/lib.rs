pub mod decoder;
pub mod error;
pub mod http;
pub mod reconciler;
pub mod reduce;
pub mod render;
pub mod source;
pub mod state;

pub use decoder::*;
pub use error::*;
pub use http::*;
pub use reconciler::*;
pub use reduce::*;
pub use render::*;
pub use source::*;
pub use state::*;
