use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IPAddress {
    V4([u8; 4]),
    V6([u8; 16]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpVersion {
    V4,
    V6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    TCP,
    UDP,
    ICMP,
    ICMPV6,
}

/// Layer 1 record: the network header every well-formed packet carries.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkLayer {
    pub version: IpVersion,
    pub source: IPAddress,
    pub destination: IPAddress,
    /// TTL for IPv4, hop limit for IPv6.
    pub ttl: u8,
    /// Total length for IPv4, payload length for IPv6.
    pub length: u16,
    pub flow_label: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
}

/// Layer 2 record.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportLayer {
    Tcp {
        source_port: u16,
        destination_port: u16,
        sequence: u32,
        window: u16,
        flags: TcpFlags,
    },
    Udp {
        source_port: u16,
        destination_port: u16,
        length: u16,
    },
    Icmp {
        icmp_type: u8,
        code: u8,
    },
    Icmpv6 {
        icmp_type: u8,
        code: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppProtocol {
    DNS,
    MDNS,
    HTTP,
    HTTPS,
    Raw,
}

/// Layer 3 record, classified by well-known port.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationLayer {
    pub protocol: AppProtocol,
    pub payload_len: usize,
    pub tls_record: Option<String>,
}

/// One decoded capture record. Never mutated once it enters a log.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub number: u64,
    pub timestamp: f64,
    pub length: u32,
    pub network: Option<NetworkLayer>,
    pub transport: Option<TransportLayer>,
    pub application: Option<ApplicationLayer>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerFields {
    pub title: &'static str,
    pub fields: Vec<(&'static str, String)>,
}

impl Packet {
    /// A packet without a network record cannot be stored or grouped.
    pub fn is_malformed(&self) -> bool {
        self.network.is_none()
    }

    pub fn endpoints(&self) -> Option<(IPAddress, IPAddress)> {
        self.network
            .as_ref()
            .map(|net| (net.source, net.destination))
    }

    pub fn protocol(&self) -> Option<Protocol> {
        self.transport.as_ref().map(TransportLayer::protocol)
    }

    pub fn ports(&self) -> Option<(u16, u16)> {
        self.transport.as_ref().and_then(TransportLayer::ports)
    }

    /// Short protocol label for list rows, most specific layer first.
    pub fn protocol_label(&self) -> String {
        if let Some(app) = &self.application
            && app.protocol != AppProtocol::Raw
        {
            return app.protocol.to_string();
        }
        match (&self.transport, &self.network) {
            (Some(transport), _) => transport.protocol().to_string(),
            (None, Some(net)) => net.version.to_string(),
            (None, None) => "Unknown".to_string(),
        }
    }

    pub fn summary(&self) -> String {
        let Some(net) = &self.network else {
            return format!("{} bytes, no network layer", self.length);
        };
        match self.ports() {
            Some((sp, dp)) => format!(
                "{}:{} → {}:{} {} {} bytes",
                net.source,
                sp,
                net.destination,
                dp,
                self.protocol_label(),
                self.length
            ),
            None => format!(
                "{} → {} {} {} bytes",
                net.source,
                net.destination,
                self.protocol_label(),
                self.length
            ),
        }
    }

    /// Per-layer key/value breakdown for the detail pane.
    pub fn layer_fields(&self) -> Vec<LayerFields> {
        let mut layers = Vec::with_capacity(4);
        layers.push(LayerFields {
            title: "Frame",
            fields: vec![
                ("Number", self.number.to_string()),
                ("Timestamp", format!("{:.6}", self.timestamp)),
                ("Length", self.length.to_string()),
            ],
        });

        if let Some(net) = &self.network {
            let mut fields = vec![
                ("Version", net.version.to_string()),
                ("Source IP", net.source.to_string()),
                ("Destination IP", net.destination.to_string()),
            ];
            match net.version {
                IpVersion::V4 => {
                    fields.push(("TTL", net.ttl.to_string()));
                    fields.push(("Total Length", net.length.to_string()));
                }
                IpVersion::V6 => {
                    fields.push(("Hop Limit", net.ttl.to_string()));
                    fields.push(("Payload Length", net.length.to_string()));
                }
            }
            if let Some(label) = net.flow_label {
                fields.push(("Flow Label", label.to_string()));
            }
            layers.push(LayerFields {
                title: "Layer 1",
                fields,
            });
        }

        if let Some(transport) = &self.transport {
            let mut fields = vec![("Protocol", transport.protocol().to_string())];
            match transport {
                TransportLayer::Tcp {
                    source_port,
                    destination_port,
                    sequence,
                    window,
                    flags,
                } => {
                    fields.push(("Source Port", source_port.to_string()));
                    fields.push(("Destination Port", destination_port.to_string()));
                    fields.push(("Sequence", sequence.to_string()));
                    fields.push(("Window Size", window.to_string()));
                    fields.push(("Flags", flags.to_string()));
                }
                TransportLayer::Udp {
                    source_port,
                    destination_port,
                    length,
                } => {
                    fields.push(("Source Port", source_port.to_string()));
                    fields.push(("Destination Port", destination_port.to_string()));
                    fields.push(("Length", length.to_string()));
                }
                TransportLayer::Icmp { icmp_type, code }
                | TransportLayer::Icmpv6 { icmp_type, code } => {
                    fields.push(("Type", icmp_type.to_string()));
                    fields.push(("Code", code.to_string()));
                }
            }
            layers.push(LayerFields {
                title: "Layer 2",
                fields,
            });
        }

        if let Some(app) = &self.application {
            let mut fields = vec![
                ("Protocol", app.protocol.to_string()),
                ("Payload Length", app.payload_len.to_string()),
            ];
            if let Some(record) = &app.tls_record {
                fields.push(("TLS Record", record.clone()));
            }
            layers.push(LayerFields {
                title: "Layer 3",
                fields,
            });
        }

        layers
    }
}

impl TransportLayer {
    pub fn protocol(&self) -> Protocol {
        match self {
            TransportLayer::Tcp { .. } => Protocol::TCP,
            TransportLayer::Udp { .. } => Protocol::UDP,
            TransportLayer::Icmp { .. } => Protocol::ICMP,
            TransportLayer::Icmpv6 { .. } => Protocol::ICMPV6,
        }
    }

    pub fn ports(&self) -> Option<(u16, u16)> {
        match self {
            TransportLayer::Tcp {
                source_port,
                destination_port,
                ..
            }
            | TransportLayer::Udp {
                source_port,
                destination_port,
                ..
            } => Some((*source_port, *destination_port)),
            TransportLayer::Icmp { .. } | TransportLayer::Icmpv6 { .. } => None,
        }
    }
}

impl fmt::Display for IPAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IPAddress::V4(bytes) => {
                write!(f, "{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
            }
            IPAddress::V6(bytes) => {
                let segments: Vec<String> = bytes
                    .chunks(2)
                    .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
                    .map(|segment| format!("{:x}", segment))
                    .collect();
                write!(f, "{}", segments.join(":"))
            }
        }
    }
}

impl IPAddress {
    pub fn version(&self) -> IpVersion {
        match self {
            IPAddress::V4(_) => IpVersion::V4,
            IPAddress::V6(_) => IpVersion::V6,
        }
    }

    fn cmp_bytes(&self, other: &Self) -> Ordering {
        match (self, other) {
            (IPAddress::V4(a), IPAddress::V4(b)) => a.cmp(b),
            (IPAddress::V4(_), IPAddress::V6(_)) => Ordering::Less,
            (IPAddress::V6(_), IPAddress::V4(_)) => Ordering::Greater,
            (IPAddress::V6(a), IPAddress::V6(b)) => a.cmp(b),
        }
    }
}

impl Ord for IPAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_bytes(other)
    }
}

impl PartialOrd for IPAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<IpAddr> for IPAddress {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => IPAddress::V4(v4.octets()),
            IpAddr::V6(v6) => IPAddress::V6(v6.octets()),
        }
    }
}

impl FromStr for IPAddress {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<IpAddr>().map(IPAddress::from)
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => write!(f, "IPv4"),
            IpVersion::V6 => write!(f, "IPv6"),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::TCP => write!(f, "TCP"),
            Protocol::UDP => write!(f, "UDP"),
            Protocol::ICMP => write!(f, "ICMP"),
            Protocol::ICMPV6 => write!(f, "ICMPv6"),
        }
    }
}

impl fmt::Display for AppProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppProtocol::DNS => write!(f, "DNS"),
            AppProtocol::MDNS => write!(f, "MDNS"),
            AppProtocol::HTTP => write!(f, "HTTP"),
            AppProtocol::HTTPS => write!(f, "HTTPS"),
            AppProtocol::Raw => write!(f, "Raw"),
        }
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ACK:{} RST:{} SYN:{} FIN:{}",
            self.ack, self.rst, self.syn, self.fin
        )
    }
}
