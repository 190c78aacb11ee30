//! UDP source and sink elements.
//!
//! - [`UdpSrc`]: Reads datagrams from a UDP socket
//! - [`UdpSink`]: Writes datagrams to a UDP socket

use crate::buffer::Buffer;
use crate::element::{Produced, Sink, Source};
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// A UDP source that reads datagrams from a socket.
///
/// UDP is connectionless: the source binds to a local address and receives
/// datagrams from any sender. Each datagram becomes one buffer. Configure a
/// read timeout so a silent wire surfaces as backpressure instead of
/// parking the pipeline thread.
pub struct UdpSrc {
    name: String,
    socket: UdpSocket,
    buffer_size: usize,
    bytes_read: u64,
    sequence: u64,
    last_sender: Option<SocketAddr>,
}

impl UdpSrc {
    /// Create a new UDP source bound to the given address.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let socket = UdpSocket::bind(&addr)?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            name: format!("udpsrc-{}", local_addr),
            socket,
            buffer_size: 65535, // Max UDP datagram size
            bytes_read: 0,
            sequence: 0,
            last_sender: None,
        })
    }

    /// Only accept datagrams from a specific remote address.
    pub fn connect<A: ToSocketAddrs>(self, addr: A) -> Result<Self> {
        self.socket.connect(addr)?;
        Ok(self)
    }

    /// Set the buffer size for receiving datagrams.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set a custom name for this source.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the receive timeout. A timed-out receive yields backpressure.
    pub fn with_read_timeout(self, timeout: Duration) -> Result<Self> {
        self.socket.set_read_timeout(Some(timeout))?;
        Ok(self)
    }

    /// Get the number of payload bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Get the local address this socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Get the address of the last sender.
    pub fn last_sender(&self) -> Option<SocketAddr> {
        self.last_sender
    }
}

impl Source for UdpSrc {
    fn produce(&mut self) -> Result<Produced> {
        let mut recv_buf = vec![0u8; self.buffer_size];

        match self.socket.recv_from(&mut recv_buf) {
            Ok((n, sender)) => {
                self.bytes_read += n as u64;
                self.last_sender = Some(sender);
                let seq = self.sequence;
                self.sequence += 1;

                recv_buf.truncate(n);
                Ok(Produced::Buffer(Buffer::from_vec(
                    recv_buf,
                    Metadata::from_sequence(seq),
                )))
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(Produced::WouldBlock)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A UDP sink that sends datagrams to a socket.
///
/// Two modes:
/// - **Connected**: all data goes to one destination (`connect`)
/// - **Unconnected**: destination set per sink (`bind` + `set_destination`)
pub struct UdpSink {
    name: String,
    socket: UdpSocket,
    destination: Option<SocketAddr>,
    connected: bool,
    bytes_written: u64,
}

impl UdpSink {
    /// Create a new UDP sink bound to an ephemeral port.
    ///
    /// Use `set_destination` to specify where to send data.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            name: format!("udpsink-{}", local_addr),
            socket,
            destination: None,
            connected: false,
            bytes_written: 0,
        })
    }

    /// Create a new UDP sink connected to a specific destination.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Config("invalid address".into()))?;

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(addr)?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            name: format!("udpsink-{}->{}", local_addr, addr),
            socket,
            destination: Some(addr),
            connected: true,
            bytes_written: 0,
        })
    }

    /// Set the destination address for unconnected mode.
    pub fn set_destination<A: ToSocketAddrs>(&mut self, addr: A) -> Result<()> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Config("invalid address".into()))?;
        self.destination = Some(addr);
        Ok(())
    }

    /// Set a custom name for this sink.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Get the number of payload bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Get the local address this socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Get the destination address (if set).
    pub fn destination(&self) -> Option<SocketAddr> {
        self.destination
    }
}

impl Sink for UdpSink {
    fn consume(&mut self, buffer: Buffer) -> Result<()> {
        let data = buffer.as_bytes();

        let sent = if self.connected {
            self.socket.send(data)
        } else if let Some(dest) = self.destination {
            self.socket.send_to(data, dest)
        } else {
            return Err(Error::Config("UDP sink has no destination set".into()));
        };

        match sent {
            Ok(_) => {
                self.bytes_written += data.len() as u64;
                Ok(())
            }
            // Nobody listening yet; datagrams are fire-and-forget.
            Err(ref e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                tracing::debug!(node = %self.name, "destination refused datagram");
                Ok(())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_udp_src_creation() {
        let src = UdpSrc::bind("127.0.0.1:0").unwrap();
        assert!(src.name.contains("udpsrc"));
        assert!(src.local_addr().is_ok());
    }

    #[test]
    fn test_udp_sink_connected() {
        let sink = UdpSink::connect("127.0.0.1:9999").unwrap();
        assert!(sink.connected);
        assert_eq!(sink.destination, Some("127.0.0.1:9999".parse().unwrap()));
    }

    #[test]
    fn test_udp_roundtrip() {
        let mut src = UdpSrc::bind("127.0.0.1:0").unwrap();
        let recv_addr = src.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
            socket.send_to(b"hello udp", recv_addr).unwrap();
        });

        match src.produce().unwrap() {
            Produced::Buffer(buffer) => {
                assert_eq!(buffer.as_bytes(), b"hello udp");
                assert!(src.last_sender().is_some());
            }
            other => panic!("expected buffer, got {:?}", other),
        }

        handle.join().unwrap();
    }

    #[test]
    fn test_udp_sink_roundtrip() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let recv_addr = receiver.local_addr().unwrap();

        let mut sink = UdpSink::connect(recv_addr).unwrap();
        let buffer = Buffer::from_vec(b"hello udp".to_vec(), Metadata::default());
        sink.consume(buffer).unwrap();
        assert_eq!(sink.bytes_written(), 9);

        let mut buf = [0u8; 64];
        let (n, _sender) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello udp");
    }

    #[test]
    fn test_udp_sink_no_destination() {
        let mut sink = UdpSink::bind("127.0.0.1:0").unwrap();
        let buffer = Buffer::from_vec(vec![0u8; 4], Metadata::default());
        assert!(sink.consume(buffer).is_err());
    }

    #[test]
    fn test_read_timeout_yields_backpressure() {
        let mut src = UdpSrc::bind("127.0.0.1:0")
            .unwrap()
            .with_read_timeout(Duration::from_millis(10))
            .unwrap();
        assert!(matches!(src.produce().unwrap(), Produced::WouldBlock));
    }
}
