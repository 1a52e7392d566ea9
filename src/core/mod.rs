/// Core abstractions: backend handles, the connection router and outcomes
pub mod backend;
pub mod outcome;
pub mod router;

pub use backend::{BackendHandle, LinkState};
pub use outcome::{Outcome, Ttl};
pub use router::ConnectionRouter;
