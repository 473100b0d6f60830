//! Blocking client for tools and tests.
//!
//! One socket, one request in flight at a time: send a request frame, wait
//! for the single reply frame the service guarantees.

use crate::frame::{read_frame, write_frame};
use crate::request::AcsRequest;
use crate::response::AcsReply;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

pub struct AcsClient {
    stream: TcpStream,
}

impl AcsClient {
    pub fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Bound the wait for a reply. Mount replies can take the library's
    /// full command timeout to arrive.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    /// Send a request and wait for its reply.
    pub fn call(&mut self, request: &AcsRequest) -> io::Result<AcsReply> {
        let frame = request
            .to_frame()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        write_frame(&mut self.stream, &frame)?;

        let reply_frame = read_frame(&mut self.stream)?;
        if !reply_frame.verify() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "reply payload hash verification failed",
            ));
        }
        AcsReply::from_frame(&reply_frame)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }
}
