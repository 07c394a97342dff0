//! TCP dialing with connect, read, and write timeouts.
use std::io::{Error, ErrorKind, Read, Result, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Encapsulates how to connect to a server, including the timeouts applied
/// to the dial itself and to every subsequent read and write.
#[derive(Clone, Debug, Default)]
pub struct StreamConnector {
    /// How long a dial may take before failing. `None` blocks indefinitely.
    pub connect_timeout: Option<Duration>,
    /// Applied to every socket read; a stalled server surfaces as an I/O
    /// timeout rather than a hang.
    pub read_timeout: Option<Duration>,
    /// Applied to every socket write.
    pub write_timeout: Option<Duration>,
}

impl StreamConnector {
    pub fn with_timeouts(
        connect_timeout: Option<Duration>,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> StreamConnector {
        StreamConnector {
            connect_timeout: connect_timeout,
            read_timeout: read_timeout,
            write_timeout: write_timeout,
        }
    }

    pub fn connect(&self, host_name: &str, port: u16) -> Result<Stream> {
        let tcp_stream = match self.connect_timeout {
            Some(timeout) => {
                let mut last_err = Error::new(
                    ErrorKind::InvalidInput,
                    format!("could not resolve address for {}:{}", host_name, port),
                );
                let mut connected = None;
                for addr in (host_name, port).to_socket_addrs()? {
                    match TcpStream::connect_timeout(&addr, timeout) {
                        Ok(stream) => {
                            connected = Some(stream);
                            break;
                        }
                        Err(err) => last_err = err,
                    }
                }
                match connected {
                    Some(stream) => stream,
                    None => return Err(last_err),
                }
            }
            None => TcpStream::connect((host_name, port))?,
        };

        tcp_stream.set_read_timeout(self.read_timeout)?;
        tcp_stream.set_write_timeout(self.write_timeout)?;
        Ok(Stream { inner: tcp_stream })
    }
}

/// One connected socket.
pub struct Stream {
    inner: TcpStream,
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}
