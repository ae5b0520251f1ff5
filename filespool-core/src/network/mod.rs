mod addr;
mod transport;

pub use addr::{DEFAULT_PORT, normalize_listen_addr, server_name_from_addr, with_default_port};
pub use transport::{BoxedTransport, Transport};
