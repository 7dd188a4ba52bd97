//! IPFIX ingestion workers.
//!
//! A pool of threads shares one UDP socket. Each worker reads a datagram,
//! decodes it, updates the template cache, turns every data record it can
//! resolve into a [`Flow`] and hands the flows downstream one at a time
//! before reading again. The only queue in front of a worker is the kernel
//! socket buffer.

use crate::error::{CollectorError, Result};
use crate::field_layout::{self, FieldLayout};
use crate::handoff::{self, Shutdown, POLL_INTERVAL};
use crate::stats::GlobalStats;
use crate::template_cache::{CachedTemplate, TemplateCache, TemplateKey};
use crossbeam_channel::Sender;
use sonic_flow_types::{AddressFamily, Flow};
use sonic_ipfix::{DataRecord, DataSet, Header, Packet, TemplateRecord};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Receive buffer size: one jumbo frame
pub const MAX_DATAGRAM_SIZE: usize = 8960;

/// Turns decoded IPFIX messages into flows.
///
/// Holds everything a worker needs except the socket, so datagrams can be
/// fed in directly.
#[derive(Debug)]
pub struct PacketProcessor {
    cache: Arc<TemplateCache>,
    stats: Arc<GlobalStats>,
    /// AS numbers are filled in by the annotation stage instead
    bgp_augment: bool,
    debug: u8,
}

impl PacketProcessor {
    pub fn new(
        cache: Arc<TemplateCache>,
        stats: Arc<GlobalStats>,
        bgp_augment: bool,
        debug: u8,
    ) -> Self {
        Self {
            cache,
            stats,
            bgp_augment,
            debug,
        }
    }

    pub fn template_cache(&self) -> &Arc<TemplateCache> {
        &self.cache
    }

    /// Handles one datagram received from `remote`, appending its flows.
    ///
    /// Counts the datagram on the wire counters first; non-IPv4 senders and
    /// undecodable messages are counted and dropped.
    pub fn process_datagram(&self, remote: SocketAddr, datagram: &[u8], flows: &mut Vec<Flow>) {
        self.stats.record_datagram(datagram.len());

        let Some(exporter) = exporter_ipv4(remote) else {
            self.stats.record_non_ipv4_exporter();
            if self.debug > 0 {
                warn!(remote = %remote, "Dropping IPFIX packet from non-IPv4 exporter");
            }
            return;
        };

        self.process_packet(exporter, datagram, flows);
    }

    /// Decodes one IPFIX message from `exporter`, appending its flows.
    pub fn process_packet(&self, exporter: Ipv4Addr, datagram: &[u8], flows: &mut Vec<Flow>) {
        let packet = match sonic_ipfix::decode(datagram, exporter) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.record_decode_error();
                warn!(exporter = %exporter, error = %e, "Failed to decode IPFIX packet");
                return;
            }
        };

        let Packet {
            exporter,
            header,
            templates,
            data_sets,
        } = packet;

        self.update_template_cache(exporter, &header, templates);
        for set in &data_sets {
            self.process_data_set(exporter, &header, set, flows);
        }
    }

    fn update_template_cache(
        &self,
        exporter: Ipv4Addr,
        header: &Header,
        templates: Vec<TemplateRecord>,
    ) {
        for template in templates {
            let key = TemplateKey::new(exporter, header.domain_id, template.template_id);
            if self.debug > 0 {
                dump_template(&key, &template);
            }
            self.cache.set(key, template);
        }
    }

    fn process_data_set(
        &self,
        exporter: Ipv4Addr,
        header: &Header,
        set: &DataSet,
        flows: &mut Vec<Flow>,
    ) {
        let key = TemplateKey::new(exporter, header.domain_id, set.template_id);
        let Some(template) = self.cache.get(&key) else {
            self.stats.record_unknown_template();
            if self.debug > 0 {
                warn!(
                    exporter = %exporter,
                    domain_id = header.domain_id,
                    template_id = set.template_id,
                    "Template for data set not found"
                );
            }
            return;
        };

        let records = match template.definition.decode_records(&set.payload) {
            Ok(records) => records,
            Err(e) => {
                self.stats.record_decode_error();
                warn!(
                    exporter = %exporter,
                    domain_id = header.domain_id,
                    template_id = set.template_id,
                    error = %e,
                    "Failed to decode data set"
                );
                return;
            }
        };

        self.process_records(&template, &records, exporter, i64::from(header.export_time), flows);
    }

    fn process_records(
        &self,
        template: &CachedTemplate,
        records: &[DataRecord],
        exporter: Ipv4Addr,
        timestamp: i64,
        flows: &mut Vec<Flow>,
    ) {
        let layout = &template.layout;
        for record in records {
            let Some(family) = layout.family else {
                self.stats.record_unknown_family();
                warn!(
                    exporter = %exporter,
                    template_id = template.definition.template_id,
                    "Unknown address family in flow record"
                );
                continue;
            };
            self.stats.record_flow(family);

            let mut flow = build_flow(layout, record, exporter, timestamp, family);
            if self.bgp_augment {
                flow.src_as = 0;
                flow.dst_as = 0;
            }
            if self.debug > 2 {
                dump_flow(&flow);
            }
            flows.push(flow);
        }
    }
}

/// Builds a flow from `record` as laid out by `layout`.
///
/// Addresses are turned back into network byte order; scalars are read as
/// big-endian unsigned integers and truncated to the flow field width.
pub fn build_flow(
    layout: &FieldLayout,
    record: &DataRecord,
    exporter: Ipv4Addr,
    timestamp: i64,
    family: AddressFamily,
) -> Flow {
    use field_layout::{address, uint};

    let mut flow = Flow::new(exporter, timestamp, family);
    flow.src_addr = address(record, layout.src_addr);
    flow.dst_addr = address(record, layout.dst_addr);
    flow.next_hop = address(record, layout.next_hop);
    flow.protocol = uint(record, layout.protocol) as u8;
    flow.packets = uint(record, layout.packets);
    flow.bytes = uint(record, layout.bytes);
    flow.int_in = uint(record, layout.int_in) as u32;
    flow.int_out = uint(record, layout.int_out) as u32;
    flow.src_port = uint(record, layout.src_port) as u16;
    flow.dst_port = uint(record, layout.dst_port) as u16;
    flow.src_as = uint(record, layout.src_as) as u32;
    flow.dst_as = uint(record, layout.dst_as) as u32;
    flow
}

/// IPv4 address of a datagram sender, unwrapping v4-mapped IPv6.
pub fn exporter_ipv4(remote: SocketAddr) -> Option<Ipv4Addr> {
    match remote {
        SocketAddr::V4(addr) => Some(*addr.ip()),
        SocketAddr::V6(addr) => addr.ip().to_ipv4_mapped(),
    }
}

fn dump_template(key: &TemplateKey, template: &TemplateRecord) {
    let fields: Vec<String> = template
        .fields
        .iter()
        .map(|f| match f.enterprise {
            Some(pen) => format!("{}:{}/{}", pen, f.id, f.length),
            None => format!("{}/{}", f.id, f.length),
        })
        .collect();
    debug!(template = %key, fields = %fields.join(" "), "Received template");
}

fn dump_flow(flow: &Flow) {
    let fmt_ip = |ip: Option<std::net::IpAddr>| ip.map(|ip| ip.to_string()).unwrap_or_default();
    debug!(
        router = %flow.router,
        family = %flow.family,
        src = %fmt_ip(flow.src_ip()),
        dst = %fmt_ip(flow.dst_ip()),
        protocol = flow.protocol,
        src_port = flow.src_port,
        dst_port = flow.dst_port,
        next_hop = %fmt_ip(flow.next_hop_ip()),
        int_in = flow.int_in,
        int_out = flow.int_out,
        packets = flow.packets,
        bytes = flow.bytes,
        "Flow"
    );
}

/// Running ingestion stage: the bound socket and its workers.
pub struct IpfixServer {
    local_addr: SocketAddr,
    workers: Vec<JoinHandle<()>>,
}

impl IpfixServer {
    /// Binds `listen` and starts `readers` workers feeding `output`.
    ///
    /// Resolve and bind failures are returned as [`CollectorError::Bind`].
    pub fn start(
        listen: &str,
        readers: usize,
        processor: Arc<PacketProcessor>,
        output: Sender<Flow>,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let socket = bind(listen)?;
        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);

        info!(listen = %local_addr, readers, "Listening for IPFIX");

        let workers = (0..readers)
            .map(|id| {
                let socket = Arc::clone(&socket);
                let processor = Arc::clone(&processor);
                let output = output.clone();
                let shutdown = shutdown.clone();
                thread::Builder::new()
                    .name(format!("ipfix-reader-{}", id))
                    .spawn(move || packet_worker(&socket, &processor, &output, &shutdown))
            })
            .collect::<io::Result<Vec<_>>>()?;

        Ok(Self { local_addr, workers })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for every worker; call after triggering shutdown.
    pub fn join(self) {
        for worker in self.workers {
            if worker.join().is_err() {
                error!("IPFIX reader thread panicked");
            }
        }
    }
}

fn bind(listen: &str) -> Result<UdpSocket> {
    let bind_err = |source| CollectorError::Bind {
        addr: listen.to_string(),
        source,
    };

    let addr = listen
        .to_socket_addrs()
        .map_err(bind_err)?
        .next()
        .ok_or_else(|| bind_err(io::Error::new(io::ErrorKind::NotFound, "address did not resolve")))?;

    let socket = UdpSocket::bind(addr).map_err(bind_err)?;
    socket.set_read_timeout(Some(POLL_INTERVAL))?;
    Ok(socket)
}

fn packet_worker(
    socket: &UdpSocket,
    processor: &PacketProcessor,
    output: &Sender<Flow>,
    shutdown: &Shutdown,
) {
    let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut flows = Vec::with_capacity(64);

    while !shutdown.is_triggered() {
        let (len, remote) = match socket.recv_from(&mut buffer) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue;
            }
            Err(e) => {
                processor.stats.record_socket_error();
                error!(error = %e, "Failed to read from IPFIX socket");
                continue;
            }
        };

        processor.process_datagram(remote, &buffer[..len], &mut flows);
        for flow in flows.drain(..) {
            if !handoff::send(output, flow, shutdown) {
                return;
            }
        }
    }
}
