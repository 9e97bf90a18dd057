pub mod config;
pub mod error;
pub mod network;
pub mod protocol;

pub use config::SimulationConfig;
pub use error::{ConfigError, FormatError, LinkError, RouterError, TransmitError};
pub use network::{Host, Link, Router, RouterStats, Simulation};
pub use protocol::{Address, Cost, Packet, PacketKind, RoutingTable, UpdatePolicy};
