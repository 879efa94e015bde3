use std::net::{Ipv4Addr, TcpListener};

/// A currently free TCP port on the host.
///
/// The port is released before returning, so another process may take it
/// before the caller binds it.
pub fn available_host_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_bindable_port() {
        let port = available_host_port().unwrap();
        assert_ne!(port, 0);
        TcpListener::bind((Ipv4Addr::LOCALHOST, port)).unwrap();
    }
}
