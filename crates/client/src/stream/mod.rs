//! Push stream: transport seam, state machine, reconnecting connection.

pub mod connection;
pub mod state;
pub mod transport;

pub use connection::StreamConnection;
pub use state::{ConnectionState, ConnectionStatus, InvalidTransition, Transition};
pub use transport::{EventTransport, FrameStream, HttpEventTransport};
