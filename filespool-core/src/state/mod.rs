pub mod connection;
mod receiver;

pub use connection::ConnectionPhase;
pub use receiver::{EnginePhase, SessionEnd, SessionPhase};
