//! Address helpers shared by the CLI and the sender.

/// Default TCP port of the receiver.
pub const DEFAULT_PORT: u16 = 5664;

/// Host part of a `host:port` address, used as the TLS server name.
///
/// Strips everything from the last `:` on, then any enclosing
/// brackets of a literal IPv6 address. An address without a `:` is
/// returned unchanged.
///
/// ```
/// use filespool_core::network::server_name_from_addr;
///
/// assert_eq!(server_name_from_addr("host:1234"), "host");
/// assert_eq!(server_name_from_addr("[::1]:1234"), "::1");
/// assert_eq!(server_name_from_addr("host"), "host");
/// ```
pub fn server_name_from_addr(address: &str) -> &str {
    match address.rfind(':') {
        Some(i) => address[..i].trim_matches(|c| c == '[' || c == ']'),
        None => address,
    }
}

/// Appends the default port when `address` has none.
pub fn with_default_port(address: &str) -> String {
    if address.contains(':') {
        address.to_string()
    } else {
        format!("{address}:{DEFAULT_PORT}")
    }
}

/// Turns a `:port` listen address into one that binds all IPv4
/// interfaces. Anything else is returned unchanged.
pub fn normalize_listen_addr(address: &str) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    }
}
