//! Pairs a ring buffer for inbound bytes and one for outbound bytes with a
//! source/sink pair that mediates between them and the kernel (component E).
//!
//! Grounded on the teacher's `src/connection.rs`: `PlainConnection`'s direct
//! `Read`/`Write` over a `TcpStream`, and `TlsConnection`'s
//! `read_tls`/`process_new_packets`/`write_tls` dance around a boxed
//! `rustls::ServerConnection`. Generalized here into two small traits
//! (`DataSource`, `DataSink`) so the connection handler (L) and TCP socket
//! (F) don't need to know which backend they're driving, per spec.md §4.4
//! and §6's "TLS interface (out of scope, consumed)."

use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;

use rustls::ServerConnection;

use crate::buffer::RingBuffer;
use crate::object::Signal;

/// Pulls bytes from the kernel (or a decryption layer) into the channel's
/// inbound buffer.
pub trait DataSource {
    /// Reads as much as is immediately available into `buf`, looping past
    /// `Interrupted` and stopping at `WouldBlock`. Returns `Ok(0)` only on
    /// a clean EOF from the peer.
    fn pull_into(&mut self, buf: &mut RingBuffer) -> io::Result<usize>;
}

/// Pushes bytes from the channel's outbound buffer to the kernel (or an
/// encryption layer).
pub trait DataSink {
    /// Writes as much of `buf`'s unread contents as the kernel will accept
    /// right now, consuming what was written. Returns the number of bytes
    /// consumed from `buf` (not necessarily the number of bytes that left
    /// the process, for backends like TLS that buffer encrypted records
    /// separately).
    fn push_from(&mut self, buf: &mut RingBuffer) -> io::Result<usize>;

    /// True if this backend still has encrypted/framing bytes queued that
    /// haven't reached the kernel yet, even though `buf` itself may be
    /// empty. Plaintext backends always return `false`.
    fn has_pending_output(&self) -> bool {
        false
    }
}

const READ_CHUNK: usize = 16 * 1024;

fn read_until_blocked<R: Read>(reader: &mut R, buf: &mut RingBuffer) -> io::Result<usize> {
    let mut total = 0;
    loop {
        let dst = buf.spare_capacity_mut(READ_CHUNK);
        match reader.read(dst) {
            Ok(0) => return Ok(total),
            Ok(n) => {
                buf.mark_written(n);
                total += n;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                return if total == 0 { Err(e) } else { Ok(total) }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

fn write_until_blocked<W: Write>(writer: &mut W, buf: &mut RingBuffer) -> io::Result<usize> {
    let mut total = 0;
    while !buf.is_empty() {
        match writer.write(buf.peek()) {
            Ok(0) => break,
            Ok(n) => {
                buf.consume(n);
                total += n;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    let _ = writer.flush();
    Ok(total)
}

/// Plaintext source/sink directly over a raw stream (`mio::net::TcpStream`
/// or any test double implementing `Read + Write`).
pub struct Plaintext<S> {
    stream: S,
}

impl<S> Plaintext<S> {
    /// Wraps `stream` as a plaintext backend.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Borrows the wrapped stream (used by the TCP socket to query
    /// peer/local address and socket options).
    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Mutably borrows the wrapped stream.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }
}

impl<S: Read> DataSource for Plaintext<S> {
    fn pull_into(&mut self, buf: &mut RingBuffer) -> io::Result<usize> {
        read_until_blocked(&mut self.stream, buf)
    }
}

impl<S: Write> DataSink for Plaintext<S> {
    fn push_from(&mut self, buf: &mut RingBuffer) -> io::Result<usize> {
        write_until_blocked(&mut self.stream, buf)
    }
}

/// TLS source/sink wrapping a `rustls::ServerConnection`. The crate does
/// not configure TLS itself (certificate/key loading stays the caller's
/// responsibility, per spec.md §1) but does drive the handshake/record
/// layer the same way the teacher's `TlsConnection` does.
pub struct Tls<S> {
    stream: S,
    conn: Box<ServerConnection>,
}

impl<S> Tls<S> {
    /// Wraps `stream`, driving TLS via the already-configured `conn`.
    pub fn new(stream: S, conn: ServerConnection) -> Self {
        Self {
            stream,
            conn: Box::new(conn),
        }
    }

    /// Borrows the wrapped stream.
    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// The negotiated ALPN protocol, if any (used by the connection
    /// handler's protocol-detection step; HTTP/2 ALPN is rejected per
    /// spec.md's Non-goals, so only the absence of an "h2" entry matters
    /// here).
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.conn.alpn_protocol()
    }
}

impl<S: Read + Write> DataSource for Tls<S> {
    fn pull_into(&mut self, buf: &mut RingBuffer) -> io::Result<usize> {
        loop {
            match self.conn.read_tls(&mut self.stream) {
                Ok(0) => return Ok(0),
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        let state = self
            .conn
            .process_new_packets()
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
        if state.plaintext_bytes_to_read() == 0 {
            return Ok(0);
        }
        read_until_blocked(&mut self.conn.reader(), buf)
    }
}

impl<S: Read + Write> DataSink for Tls<S> {
    fn push_from(&mut self, buf: &mut RingBuffer) -> io::Result<usize> {
        let consumed = {
            let mut writer = self.conn.writer();
            let mut total = 0;
            while !buf.is_empty() {
                let n = writer.write(buf.peek())?;
                if n == 0 {
                    break;
                }
                buf.consume(n);
                total += n;
            }
            total
        };
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut self.stream) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(consumed)
    }

    fn has_pending_output(&self) -> bool {
        self.conn.wants_write()
    }
}

/// The per-connection I/O channel (component E): an inbound buffer fed by a
/// [`DataSource`], an outbound buffer drained by a [`DataSink`].
pub struct IoChannel<B> {
    backend: B,
    inbound: RingBuffer,
    outbound: RingBuffer,
    peer_addr: Option<SocketAddr>,
    /// Fired once per `pull` call that read at least one byte.
    pub received_data: Signal<()>,
    /// Fired with the number of bytes the sink accepted.
    pub sent_data: Signal<usize>,
    read_interested: bool,
    write_interested: bool,
}

impl<B> IoChannel<B> {
    /// Wraps `backend`, starting with empty buffers and read-interest on
    /// (the channel always wants to know about incoming bytes; write
    /// interest is only raised once there's something queued to send).
    pub fn new(backend: B, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            backend,
            inbound: RingBuffer::new(),
            outbound: RingBuffer::new(),
            peer_addr,
            received_data: Signal::new(),
            sent_data: Signal::new(),
            read_interested: true,
            write_interested: false,
        }
    }

    /// The peer's address and port, if known — used by the error-handler
    /// interface (spec.md §6) and by the request's peer-address accessor
    /// (the Rust equivalent of the original's `tryCast<TcpSocket*>`, see
    /// SPEC_FULL.md's supplement on this point).
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Borrows the unread inbound bytes.
    pub fn peek_all(&self) -> &[u8] {
        self.inbound.peek()
    }

    /// Borrows up to `length` unread inbound bytes starting `offset` bytes
    /// past the read-head.
    pub fn peek_at(&self, offset: usize, length: usize) -> Option<&[u8]> {
        self.inbound.peek_at(offset, length)
    }

    /// Advances the inbound read-head by `n` bytes.
    pub fn skip(&mut self, n: usize) {
        self.inbound.consume(n);
    }

    /// Queues `data` for sending and raises write-interest.
    pub fn write(&mut self, data: &[u8]) -> Result<(), crate::buffer::BufferFull> {
        self.outbound.append(data)?;
        self.write_interested = true;
        Ok(())
    }

    /// Bytes still queued to send.
    pub fn data_to_write(&self) -> usize {
        self.outbound.len()
    }

    /// True if the channel currently wants to be notified of readability.
    pub fn wants_read(&self) -> bool {
        self.read_interested
    }

    /// Enables or disables read notification.
    pub fn set_read_interest(&mut self, interested: bool) {
        self.read_interested = interested;
    }
}

impl<B: DataSink> IoChannel<B> {
    /// True if the channel currently wants to be notified of writability —
    /// either because bytes are queued, or the backend has its own pending
    /// output (e.g. buffered TLS records).
    pub fn wants_write(&self) -> bool {
        self.write_interested || self.backend.has_pending_output()
    }
}

impl<B: DataSource> IoChannel<B> {
    /// Pulls available bytes from the backend into the inbound buffer,
    /// emitting `received_data` if any arrived. Returns `Ok(0)` on a clean
    /// EOF from the peer (the caller is then responsible for transitioning
    /// the owning socket's state machine).
    pub fn pull(&mut self) -> io::Result<usize> {
        let n = self.backend.pull_into(&mut self.inbound)?;
        if n > 0 {
            self.received_data.emit(&());
        }
        Ok(n)
    }
}

impl<B: DataSink> IoChannel<B> {
    /// Drains as much of the outbound buffer as the backend will accept,
    /// emitting `sent_data(n)`. Lowers write-interest once both the buffer
    /// and any backend-internal pending output are empty.
    pub fn push(&mut self) -> io::Result<usize> {
        let n = self.backend.push_from(&mut self.outbound)?;
        if n > 0 {
            self.sent_data.emit(&n);
        }
        if self.outbound.is_empty() && !self.backend.has_pending_output() {
            self.write_interested = false;
        }
        Ok(n)
    }
}

impl<B> IoChannel<B> {
    /// Borrows the backend (used by the TCP socket to reach stream-level
    /// operations like `shutdown`/`set_nodelay` that aren't part of the
    /// `DataSource`/`DataSink` contract).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutably borrows the backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::VecDeque;

    struct MemStream {
        inbox: VecDeque<u8>,
        outbox: Vec<u8>,
    }

    impl Read for MemStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.inbox.is_empty() {
                return Err(io::Error::new(ErrorKind::WouldBlock, "no data"));
            }
            let n = buf.len().min(self.inbox.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.inbox.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for MemStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.outbox.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn pull_appends_to_inbound_and_emits_received_data() {
        let stream = MemStream {
            inbox: b"hello".iter().copied().collect(),
            outbox: Vec::new(),
        };
        let mut channel = IoChannel::new(Plaintext::new(stream), None);
        let hits = std::rc::Rc::new(std::cell::RefCell::new(0));
        {
            let hits = hits.clone();
            channel.received_data.connect(None, move |_| *hits.borrow_mut() += 1);
        }
        let n = channel.pull().unwrap();
        assert_eq!(5, n);
        assert_eq!(b"hello", channel.peek_all());
        assert_eq!(1, *hits.borrow());
    }

    #[test]
    fn write_then_push_drains_outbound_to_the_backend() {
        let stream = MemStream {
            inbox: VecDeque::new(),
            outbox: Vec::new(),
        };
        let mut channel = IoChannel::new(Plaintext::new(stream), None);
        channel.write(b"response bytes").unwrap();
        assert!(channel.wants_write());
        let n = channel.push().unwrap();
        assert_eq!(14, n);
        assert_eq!(0, channel.data_to_write());
        assert!(!channel.wants_write());
        assert_eq!(b"response bytes", channel.backend().stream().outbox.as_slice());
    }
}
