pub mod host;
pub mod interface;
pub mod link;
pub mod router;
pub mod simulation;

pub use host::Host;
pub use interface::{Interface, SendMode, WireEnd};
pub use link::Link;
pub use router::{AdvertiseScope, Router, RouterStats};
pub use simulation::Simulation;
