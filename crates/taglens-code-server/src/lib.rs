pub mod analyzer;
pub mod binaries;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use analyzer::*;
pub use binaries::*;
pub use error::*;
pub use routes::*;
pub use state::*;
