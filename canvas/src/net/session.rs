//! Replication session - host/guest rendezvous, framed peer transport, and
//! best-effort event broadcast.
//!
//! One session per running instance. The host listens for a single guest
//! and verifies the room code in the join handshake; the guest connects
//! and offers its code. All socket I/O is nonblocking and drained once
//! per frame from [`Session::poll`]. There is no delivery guarantee:
//! broadcast while disconnected is a silent no-op, never queued, never
//! retried.

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};

use anyhow::{anyhow, Context, Result};
use rand::Rng;
use tracing::{debug, info, warn};

use super::protocol::{self, ReplicatedEvent, WireMessage, MAX_FRAME_SIZE};

/// Maximum pending write bytes before events are dropped (64 KiB).
const MAX_WRITE_BUFFER: usize = 65_536;

/// Room codes are 6 characters from a charset without ambiguous glyphs.
const CODE_LEN: usize = 6;
const CODE_CHARSET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

// ── Session types ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Guest => "guest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// What `poll` observed this frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The peer completed the handshake.
    PeerJoined,
    /// The peer went away; status has fallen back to disconnected.
    PeerLeft,
    /// The host turned our join down.
    JoinRejected { reason: String },
    /// A replicated event from the peer.
    Remote(ReplicatedEvent),
}

// ── Peer connection ────────────────────────────────────────

/// One framed, nonblocking peer connection.
#[derive(Debug)]
struct Peer {
    stream: TcpStream,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl Peer {
    fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            stream,
            read_buf: Vec::with_capacity(4096),
            write_buf: Vec::new(),
        })
    }

    /// Enqueue a framed payload (length prefix + bytes), dropping it if the
    /// peer is not draining its socket.
    fn enqueue_frame(&mut self, payload: &str) {
        if self.write_buf.len() > MAX_WRITE_BUFFER {
            warn!("write buffer overflow, dropping frame");
            return;
        }
        let bytes = payload.as_bytes();
        self.write_buf
            .extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        self.write_buf.extend_from_slice(bytes);
    }

    /// Attempt to flush pending writes.
    fn flush_writes(&mut self) -> io::Result<()> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "write zero")),
                Ok(n) => {
                    self.write_buf.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Pull whatever the socket has ready into the read buffer.
    fn read_available(&mut self) -> io::Result<()> {
        let mut buf = [0u8; 4096];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::ConnectionReset, "eof"));
                }
                Ok(n) => self.read_buf.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Extract complete framed payloads from the read buffer. An oversized
    /// length prefix is a protocol violation.
    fn extract_frames(&mut self) -> Result<Vec<String>> {
        let mut frames = Vec::new();
        loop {
            if self.read_buf.len() < 4 {
                break;
            }
            let len = u32::from_be_bytes([
                self.read_buf[0],
                self.read_buf[1],
                self.read_buf[2],
                self.read_buf[3],
            ]);
            if len > MAX_FRAME_SIZE {
                return Err(anyhow!("frame of {len} bytes exceeds maximum"));
            }
            let total = 4 + len as usize;
            if self.read_buf.len() < total {
                break; // incomplete frame, wait for more data
            }
            frames.push(String::from_utf8_lossy(&self.read_buf[4..total]).to_string());
            self.read_buf.drain(..total);
        }
        Ok(frames)
    }
}

// ── Session ────────────────────────────────────────────────

/// A replication endpoint. Exactly one per running instance.
#[derive(Debug)]
pub struct Session {
    role: Role,
    room_code: String,
    status: ConnectionStatus,
    listener: Option<TcpListener>,
    peer: Option<Peer>,
    net_trace: bool,
}

impl Session {
    /// Host a session: bind a nonblocking listener and generate a room
    /// code. Port 0 binds an ephemeral port.
    pub fn host(port: u16, net_trace: bool) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .with_context(|| format!("binding session listener on port {port}"))?;
        listener.set_nonblocking(true)?;
        let room_code = generate_code();
        info!(
            %room_code,
            port = listener.local_addr().map(|a| a.port()).unwrap_or(port),
            "hosting session",
        );
        Ok(Self {
            role: Role::Host,
            room_code,
            status: ConnectionStatus::Disconnected,
            listener: Some(listener),
            peer: None,
            net_trace,
        })
    }

    /// Join a host's session. The room code is validated before any
    /// network attempt; a malformed code fails immediately.
    pub fn join(addr: &str, code: &str, net_trace: bool) -> Result<Self> {
        let code = normalize_code(code).ok_or_else(|| {
            anyhow!("room code must be exactly {CODE_LEN} alphanumeric characters")
        })?;
        let stream =
            TcpStream::connect(addr).with_context(|| format!("connecting to {addr}"))?;
        let mut peer = Peer::new(stream)?;
        peer.enqueue_frame(&protocol::encode(&WireMessage::Join { code: code.clone() }));
        let _ = peer.flush_writes(); // hard errors surface on the next poll
        info!(room_code = %code, addr, "joining session");
        Ok(Self {
            role: Role::Guest,
            room_code: code,
            status: ConnectionStatus::Connecting,
            listener: None,
            peer: Some(peer),
            net_trace,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// The port the listener actually bound (host only).
    pub fn local_port(&self) -> Option<u16> {
        self.listener
            .as_ref()
            .and_then(|l| l.local_addr().ok())
            .map(|a| a.port())
    }

    /// Fire-and-forget event broadcast. A silent no-op while not connected.
    pub fn broadcast(&mut self, event: &ReplicatedEvent) {
        if self.status != ConnectionStatus::Connected {
            debug!("broadcast while not connected, dropped");
            return;
        }
        if let Some(peer) = &mut self.peer {
            let payload = protocol::encode(&WireMessage::Event(event.clone()));
            if self.net_trace {
                info!(">> {payload}");
            }
            peer.enqueue_frame(&payload);
            let _ = peer.flush_writes();
        }
    }

    /// Drain the transport once per frame: accept a pending guest, read and
    /// dispatch complete frames, flush writes, detect departure.
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        self.accept_pending();
        self.pump_peer(&mut events);
        events
    }

    fn accept_pending(&mut self) {
        let Some(listener) = &self.listener else {
            return;
        };
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if self.peer.is_some() {
                        // One peer per session; turn extras away.
                        warn!(%addr, "rejecting extra connection");
                        if let Ok(mut extra) = Peer::new(stream) {
                            extra.enqueue_frame(&protocol::encode(&WireMessage::Reject {
                                reason: "session full".to_string(),
                            }));
                            let _ = extra.flush_writes();
                        }
                        continue;
                    }
                    match Peer::new(stream) {
                        Ok(peer) => {
                            info!(%addr, "guest connected, awaiting join");
                            self.peer = Some(peer);
                            self.status = ConnectionStatus::Connecting;
                        }
                        Err(e) => warn!("failed to set up peer socket: {e}"),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("accept error: {e}");
                    break;
                }
            }
        }
    }

    fn pump_peer(&mut self, events: &mut Vec<SessionEvent>) {
        let mut dead = false;
        let mut frames = Vec::new();

        match &mut self.peer {
            None => return,
            Some(peer) => {
                match peer.read_available() {
                    Ok(()) => match peer.extract_frames() {
                        Ok(extracted) => frames = extracted,
                        Err(e) => {
                            warn!("framing violation: {e}");
                            dead = true;
                        }
                    },
                    Err(e) => {
                        debug!("peer disconnected: {e}");
                        dead = true;
                    }
                }
                if !dead {
                    if let Err(e) = peer.flush_writes() {
                        debug!("peer write failed: {e}");
                        dead = true;
                    }
                }
            }
        }

        for raw in frames {
            if self.net_trace {
                info!("<< {raw}");
            }
            match protocol::decode(&raw) {
                Ok(msg) => {
                    if !self.handle_message(msg, events) {
                        dead = true;
                    }
                }
                Err(e) => warn!("dropping malformed frame: {e}"),
            }
        }

        if dead {
            self.drop_peer(events);
        }
    }

    /// Apply one decoded message. Returns false when the peer should be
    /// dropped.
    fn handle_message(&mut self, msg: WireMessage, events: &mut Vec<SessionEvent>) -> bool {
        match (self.role, msg) {
            (Role::Host, WireMessage::Join { code }) => {
                if code.eq_ignore_ascii_case(&self.room_code) {
                    if let Some(peer) = &mut self.peer {
                        peer.enqueue_frame(&protocol::encode(&WireMessage::Accept));
                        let _ = peer.flush_writes();
                    }
                    self.status = ConnectionStatus::Connected;
                    info!("peer joined");
                    events.push(SessionEvent::PeerJoined);
                    true
                } else {
                    warn!(offered = %code, "join with wrong room code");
                    if let Some(peer) = &mut self.peer {
                        peer.enqueue_frame(&protocol::encode(&WireMessage::Reject {
                            reason: "invalid room code".to_string(),
                        }));
                        let _ = peer.flush_writes();
                    }
                    false
                }
            }
            (Role::Guest, WireMessage::Accept) => {
                self.status = ConnectionStatus::Connected;
                info!("join accepted");
                events.push(SessionEvent::PeerJoined);
                true
            }
            (Role::Guest, WireMessage::Reject { reason }) => {
                warn!(%reason, "join rejected");
                events.push(SessionEvent::JoinRejected { reason });
                false
            }
            (_, WireMessage::Event(event)) => {
                if self.status == ConnectionStatus::Connected {
                    events.push(SessionEvent::Remote(event));
                    true
                } else {
                    warn!("event before handshake, dropping peer");
                    false
                }
            }
            (role, msg) => {
                warn!(role = role.as_str(), ?msg, "unexpected message");
                false
            }
        }
    }

    fn drop_peer(&mut self, events: &mut Vec<SessionEvent>) {
        if self.peer.take().is_some() {
            if self.status == ConnectionStatus::Connected {
                events.push(SessionEvent::PeerLeft);
            }
            // The host keeps listening, so a departed guest can rejoin.
            self.status = ConnectionStatus::Disconnected;
        }
    }
}

// ── Room codes ─────────────────────────────────────────────

/// Trim and uppercase a candidate room code; `None` unless it is exactly
/// six alphanumeric characters.
pub fn normalize_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    (code.len() == CODE_LEN && code.chars().all(|c| c.is_ascii_alphanumeric())).then_some(code)
}

fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

// ── Tests ──────────────────────────────────────────────────
