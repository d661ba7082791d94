//! Newline-delimited JSON over a single TCP connection.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use log::{debug, info};

use crate::error::{ProofreadError, Result};
use crate::protocol::{Channel, Envelope};

/// A connected peer: one envelope per line.
#[derive(Debug)]
pub struct TcpChannel {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    peer: SocketAddr,
}

/// A bound listener waiting for its single peer.
#[derive(Debug)]
pub struct TcpBinding {
    listener: TcpListener,
}

impl TcpBinding {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Block until the peer connects. The listener is consumed, so a second
    /// client is refused.
    pub fn accept(self) -> Result<TcpChannel> {
        let (stream, peer) = self.listener.accept()?;
        info!("accepted peer {peer}");
        TcpChannel::from_stream(stream)
    }
}

impl TcpChannel {
    /// Bind the serving side of a channel.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<TcpBinding> {
        let listener = TcpListener::bind(addr)?;
        info!("listening on {}", listener.local_addr()?);
        Ok(TcpBinding { listener })
    }

    /// Connect to a bound session.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<TcpChannel> {
        let stream = TcpStream::connect(addr)?;
        Self::from_stream(stream)
    }

    fn from_stream(stream: TcpStream) -> Result<TcpChannel> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(TcpChannel {
            reader,
            writer: BufWriter::new(stream),
            peer,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Channel for TcpChannel {
    fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let text = envelope.to_json()?;
        self.writer.write_all(text.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn recv(&mut self) -> Result<Envelope> {
        let mut bytes = Vec::new();
        loop {
            bytes.clear();
            if self.reader.read_until(b'\n', &mut bytes)? == 0 {
                debug!("peer {} closed the connection", self.peer);
                return Err(ProofreadError::ChannelClosed);
            }
            let line = std::str::from_utf8(&bytes)
                .map_err(|e| ProofreadError::protocol(format!("message is not UTF-8: {e}")))?
                .trim();
            if !line.is_empty() {
                return Envelope::from_json(line);
            }
        }
    }
}
