pub mod connection;
pub mod endpoints;
pub mod router;

pub use connection::{ApiConnectionError, HttpProvider, LlmProvider, LlmRequest};
pub use endpoints::Provider;
pub use router::FallbackRouter;
