use super::BackendError;
use crate::packet::{
    AppProtocol, ApplicationLayer, IPAddress, IpVersion, NetworkLayer, Packet, TcpFlags,
    TransportLayer,
};
use etherparse::{NetHeaders, PacketHeaders, TcpHeader, TransportHeader};
use tracing::trace;

/// Decodes one Ethernet II frame. Frames without an IP header still decode,
/// they just carry no network layer.
pub fn decode_frame(number: u64, timestamp: f64, frame: &[u8]) -> Result<Packet, BackendError> {
    let headers = PacketHeaders::from_ethernet_slice(frame).map_err(|err| {
        trace!(number, error = ?err, "Failed to parse packet headers");
        BackendError::Decode(format!("header parse error: {err:?}"))
    })?;

    let network = match &headers.net {
        Some(NetHeaders::Ipv4(ip, _)) => Some(NetworkLayer {
            version: IpVersion::V4,
            source: IPAddress::V4(ip.source),
            destination: IPAddress::V4(ip.destination),
            ttl: ip.time_to_live,
            length: ip.total_len,
            flow_label: None,
        }),
        Some(NetHeaders::Ipv6(ip, _)) => Some(NetworkLayer {
            version: IpVersion::V6,
            source: IPAddress::V6(ip.source),
            destination: IPAddress::V6(ip.destination),
            ttl: ip.hop_limit,
            length: ip.payload_length,
            flow_label: Some(ip.flow_label.value()),
        }),
        _ => None,
    };

    let payload = headers.payload.slice();

    let transport = match &headers.transport {
        Some(TransportHeader::Tcp(tcp)) => Some(tcp_layer(tcp)),
        Some(TransportHeader::Udp(udp)) => Some(TransportLayer::Udp {
            source_port: udp.source_port,
            destination_port: udp.destination_port,
            length: udp.length,
        }),
        Some(TransportHeader::Icmpv4(icmp)) => {
            let bytes = icmp.to_bytes();
            Some(TransportLayer::Icmp {
                icmp_type: bytes[0],
                code: bytes[1],
            })
        }
        Some(TransportHeader::Icmpv6(icmp)) => {
            let bytes = icmp.to_bytes();
            Some(TransportLayer::Icmpv6 {
                icmp_type: bytes[0],
                code: bytes[1],
            })
        }
        _ => None,
    };

    let application = transport
        .as_ref()
        .and_then(|layer| classify_application(layer, payload));

    Ok(Packet {
        number,
        timestamp,
        length: u32::try_from(frame.len()).unwrap_or(u32::MAX),
        network,
        transport,
        application,
        data: frame.to_vec(),
    })
}

fn tcp_layer(header: &TcpHeader) -> TransportLayer {
    TransportLayer::Tcp {
        source_port: header.source_port,
        destination_port: header.destination_port,
        sequence: header.sequence_number,
        window: header.window_size,
        flags: TcpFlags {
            syn: header.syn,
            ack: header.ack,
            fin: header.fin,
            rst: header.rst,
        },
    }
}

fn classify_application(transport: &TransportLayer, payload: &[u8]) -> Option<ApplicationLayer> {
    let protocol = match transport {
        TransportLayer::Udp {
            source_port,
            destination_port,
            ..
        } => match (*source_port, *destination_port) {
            (53, _) | (_, 53) => AppProtocol::DNS,
            (5353, _) | (_, 5353) => AppProtocol::MDNS,
            _ => AppProtocol::Raw,
        },
        TransportLayer::Tcp {
            source_port,
            destination_port,
            ..
        } => match (*source_port, *destination_port) {
            (80, _) | (_, 80) => AppProtocol::HTTP,
            (443, _) | (_, 443) => AppProtocol::HTTPS,
            _ => AppProtocol::Raw,
        },
        TransportLayer::Icmp { .. } | TransportLayer::Icmpv6 { .. } => AppProtocol::Raw,
    };

    let tls_record = match transport {
        TransportLayer::Tcp { .. } if looks_like_tls(payload) => tls_record_label(payload),
        _ => None,
    };

    Some(ApplicationLayer {
        protocol,
        payload_len: payload.len(),
        tls_record,
    })
}

pub fn looks_like_tls(payload: &[u8]) -> bool {
    if payload.len() < 5 {
        return false;
    }
    let content_type = payload[0];
    let version_major = payload[1];
    (20..=23).contains(&content_type) && version_major == 3
}

/// Labels the first TLS record in `data`, e.g. `Client Hello (TLS 1.2)`.
pub fn tls_record_label(data: &[u8]) -> Option<String> {
    if data.len() < 5 {
        return None;
    }

    let content_type = data[0];
    let length = u16::from_be_bytes([data[3], data[4]]) as usize;
    if data.len() < 5 + length {
        return None; // incomplete record
    }

    let version_str = match (data[1], data[2]) {
        (3, 0) => "SSL 3.0",
        (3, 1) => "TLS 1.0",
        (3, 2) => "TLS 1.1",
        (3, 3) => "TLS 1.2",
        (3, 4) => "TLS 1.3",
        _ => "TLS Unknown",
    };

    let label = match content_type {
        20 => "ChangeCipherSpec",
        21 => "Alert",
        22 if length > 0 => match data[5] {
            1 => "Client Hello",
            2 => "Server Hello",
            11 => "Certificate",
            12 => "Server Key Exchange",
            13 => "Certificate Request",
            14 => "Server Hello Done",
            15 => "Certificate Verify",
            16 => "Client Key Exchange",
            20 => "Finished",
            _ => "Handshake",
        },
        22 => "Handshake",
        23 => "Application Data",
        _ => return None,
    };

    Some(format!("{} ({})", label, version_str))
}
