//! BIRD control socket client.
//!
//! Each address family has its own BIRD instance (or socket). A session
//! keeps one Unix stream open, serialized behind a mutex, and sends
//! `show route for <addr> all` per lookup.
//!
//! Replies are line based: `DDDD-text` continues a reply, `DDDD text` ends
//! it and a line starting with a space continues the previous code.

use super::Augmenter;
use crate::error::{CollectorError, Result};
use parking_lot::Mutex;
use sonic_flow_types::{AddressFamily, Flow, IpPrefix};
use std::io::{self, BufRead, BufReader, Write};
use std::net::IpAddr;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Minimum wait between two failed connection attempts
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound on the lines of one reply
const MAX_REPLY_LINES: usize = 4096;

const CODE_ROUTE: u16 = 1007;

/// Route matched for an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteInfo {
    pub prefix: Option<IpPrefix>,
    /// Last AS of the path, 0 for locally originated routes
    pub origin_as: u32,
}

/// Splits a reply line into its code and whether it ends the reply.
fn reply_code(line: &str) -> Option<(u16, bool)> {
    let bytes = line.as_bytes();
    if bytes.len() < 4 || !bytes[..4].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let code = line[..4].parse().ok()?;
    match bytes.get(4) {
        None | Some(b' ') => Some((code, true)),
        Some(b'-') => Some((code, false)),
        Some(_) => None,
    }
}

fn origin_of_path(path: &str) -> u32 {
    path.split_whitespace()
        .filter_map(|token| token.trim_matches(|c| c == '{' || c == '}').parse().ok())
        .last()
        .unwrap_or(0)
}

/// `[AS65002i]` as printed at the end of a BGP route line
fn bracket_origin(token: &str) -> Option<u32> {
    let digits = token.strip_prefix("[AS")?;
    let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
    digits[..end].parse().ok()
}

/// Extracts the best route from a `show route for ... all` reply.
///
/// Returns `None` when BIRD reports an error (codes 8xxx and 9xxx) or lists
/// no route. Only the first route and its attributes are considered.
pub fn parse_route_reply<S: AsRef<str>>(lines: &[S]) -> Option<RouteInfo> {
    let mut code = 0u16;
    let mut found = false;
    let mut prefix = None;
    let mut path_origin = None;
    let mut line_origin = None;

    for line in lines {
        let line = line.as_ref();
        let text = match reply_code(line) {
            Some((c, _)) => {
                code = c;
                line.get(5..).unwrap_or("")
            }
            None => line.strip_prefix(' ').unwrap_or(line),
        };

        if code >= 8000 {
            return None;
        }

        if code == CODE_ROUTE {
            found = true;
            if prefix.is_none() {
                prefix = text
                    .split_whitespace()
                    .next()
                    .and_then(|token| token.parse::<IpPrefix>().ok());
            }
            if line_origin.is_none() {
                line_origin = text.split_whitespace().find_map(bracket_origin);
            }
        }

        if path_origin.is_none() {
            if let Some(path) = text.trim_start().strip_prefix("BGP.as_path:") {
                path_origin = Some(origin_of_path(path));
            }
        }
    }

    found.then(|| RouteInfo {
        prefix,
        origin_as: path_origin.or(line_origin).unwrap_or(0),
    })
}

struct BirdConnection {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl BirdConnection {
    fn connect(path: &Path) -> io::Result<Self> {
        let stream = UnixStream::connect(path)?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        let writer = stream.try_clone()?;

        let mut conn = Self {
            reader: BufReader::new(stream),
            writer,
        };
        // Greeting, e.g. "0001 BIRD 2.0.8 ready."
        conn.read_reply()?;
        Ok(conn)
    }

    fn query(&mut self, addr: IpAddr) -> io::Result<Vec<String>> {
        writeln!(self.writer, "show route for {} all", addr)?;
        self.writer.flush()?;
        self.read_reply()
    }

    fn read_reply(&mut self) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by BIRD",
                ));
            }
            let line = line.trim_end_matches(['\r', '\n']).to_string();
            let last = matches!(reply_code(&line), Some((_, true)));
            lines.push(line);

            if last {
                return Ok(lines);
            }
            if lines.len() >= MAX_REPLY_LINES {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "unterminated BIRD reply",
                ));
            }
        }
    }
}

#[derive(Default)]
struct SessionState {
    conn: Option<BirdConnection>,
    retry_at: Option<Instant>,
}

/// A lazily connected session to one BIRD control socket.
pub struct BirdSession {
    path: PathBuf,
    state: Mutex<SessionState>,
}

impl BirdSession {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, reason: impl ToString) -> CollectorError {
        CollectorError::Bird {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    /// Looks up the route for `addr`.
    ///
    /// Connects on first use. An I/O error drops the connection so the next
    /// lookup reconnects; while a reconnect is backing off lookups return
    /// `Ok(None)`.
    pub fn lookup(&self, addr: IpAddr) -> Result<Option<RouteInfo>> {
        let mut state = self.state.lock();

        let mut conn = match state.conn.take() {
            Some(conn) => conn,
            None => {
                if state.retry_at.is_some_and(|at| Instant::now() < at) {
                    return Ok(None);
                }
                match BirdConnection::connect(&self.path) {
                    Ok(conn) => {
                        state.retry_at = None;
                        info!(path = %self.path.display(), "Connected to BIRD");
                        conn
                    }
                    Err(e) => {
                        state.retry_at = Some(Instant::now() + RECONNECT_BACKOFF);
                        return Err(self.error(format!("connect failed: {}", e)));
                    }
                }
            }
        };

        match conn.query(addr) {
            Ok(lines) => {
                state.conn = Some(conn);
                Ok(parse_route_reply(&lines))
            }
            Err(e) => Err(self.error(format!("query for {} failed: {}", addr, e))),
        }
    }
}

/// [`Augmenter`] backed by one BIRD session per address family.
pub struct BirdAugmenter {
    v4: BirdSession,
    v6: BirdSession,
    debug: u8,
}

impl BirdAugmenter {
    pub fn new(socket_v4: impl Into<PathBuf>, socket_v6: impl Into<PathBuf>, debug: u8) -> Self {
        Self {
            v4: BirdSession::new(socket_v4),
            v6: BirdSession::new(socket_v6),
            debug,
        }
    }

    fn session(&self, family: AddressFamily) -> &BirdSession {
        match family {
            AddressFamily::V4 => &self.v4,
            AddressFamily::V6 => &self.v6,
        }
    }

    fn route(&self, family: AddressFamily, addr: IpAddr) -> Option<RouteInfo> {
        match self.session(family).lookup(addr) {
            Ok(Some(route)) => Some(route),
            Ok(None) => {
                if self.debug > 2 {
                    debug!(addr = %addr, "No route in BIRD");
                }
                None
            }
            Err(e) => {
                warn!(error = %e, "BIRD lookup failed, forwarding flow without AS data");
                None
            }
        }
    }
}

impl Augmenter for BirdAugmenter {
    fn augment(&self, flow: &mut Flow) {
        if let Some(route) = flow.src_ip().and_then(|addr| self.route(flow.family, addr)) {
            flow.src_as = route.origin_as;
            flow.src_prefix = route.prefix;
        }
        if let Some(route) = flow.dst_ip().and_then(|addr| self.route(flow.family, addr)) {
            flow.dst_as = route.origin_as;
            flow.dst_prefix = route.prefix;
        }
    }
}
