pub mod connection;
pub mod session;

pub use connection::{ConnectionInfo, Connector, TcpConnector};
pub use session::Session;
