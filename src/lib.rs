pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod node;
pub mod transport;
pub mod utils;

pub use cli::Cli;
pub use config::Config;
pub use error::{FleetError, TransportError};
pub use executor::{FleetRunner, HostChunk, HostResponse, InvocationReport, Outcome};
pub use node::Node;
pub use transport::{Transport, TransportEvent};
