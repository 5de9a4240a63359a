//! Packet builders and a scripted backend shared by the unit tests.

use crate::backend::{BackendError, CaptureBackend, FilterExpr, PacketSink};
use crate::packet::{
    IPAddress, IpVersion, NetworkLayer, Packet, TcpFlags, TransportLayer,
};
use std::cell::Cell;
use std::sync::Arc;

pub(crate) fn addr(s: &str) -> IPAddress {
    s.parse().unwrap()
}

fn network(src: &str, dst: &str) -> NetworkLayer {
    let source = addr(src);
    NetworkLayer {
        version: source.version(),
        source,
        destination: addr(dst),
        ttl: 64,
        length: 40,
        flow_label: match source.version() {
            IpVersion::V4 => None,
            IpVersion::V6 => Some(0),
        },
    }
}

pub(crate) fn tcp_packet(number: u64, src: &str, dst: &str) -> Packet {
    Packet {
        number,
        timestamp: number as f64,
        length: 54,
        network: Some(network(src, dst)),
        transport: Some(TransportLayer::Tcp {
            source_port: 40000,
            destination_port: 443,
            sequence: 1,
            window: 64240,
            flags: TcpFlags {
                syn: true,
                ..TcpFlags::default()
            },
        }),
        application: None,
        data: vec![0; 54],
    }
}

pub(crate) fn udp_packet(number: u64, src: &str, dst: &str) -> Packet {
    Packet {
        number,
        timestamp: number as f64,
        length: 42,
        network: Some(network(src, dst)),
        transport: Some(TransportLayer::Udp {
            source_port: 5353,
            destination_port: 8053,
            length: 8,
        }),
        application: None,
        data: vec![0; 42],
    }
}

pub(crate) fn malformed_packet(number: u64) -> Packet {
    Packet {
        number,
        timestamp: number as f64,
        length: 14,
        network: None,
        transport: None,
        application: None,
        data: vec![0; 14],
    }
}

pub(crate) fn numbers<'a>(packets: impl IntoIterator<Item = &'a Arc<Packet>>) -> Vec<u64> {
    packets.into_iter().map(|p| p.number).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Start(u64),
    Stop,
    SetFilter(String),
}

/// In-memory backend that records every call and pushes only on request.
#[derive(Debug, Default)]
pub(crate) struct ScriptedBackend {
    pub calls: Vec<Call>,
    pub sinks: Vec<PacketSink>,
    pub fail_start: bool,
    pub fail_stop: bool,
    pub fail_refilter: bool,
    /// Hands re-filter results back oldest-first instead of as given.
    pub reverse_refilter: bool,
    pub refilter_calls: Cell<usize>,
    /// Pushed as soon as the next capture starts, then `finished` (or
    /// `failed` when `script_failure` is set).
    pub script: Option<Vec<Packet>>,
    pub script_failure: Option<String>,
    running: bool,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Pushes through the most recent sink, as a live capture would.
    pub fn push(&self, packet: Packet) -> bool {
        self.sinks.last().is_some_and(|sink| sink.push(packet))
    }

    pub fn current_sink(&self) -> Option<&PacketSink> {
        self.sinks.last()
    }

    pub fn starts(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Start(_)))
            .count()
    }

    pub fn stops(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, Call::Stop)).count()
    }
}

impl CaptureBackend for ScriptedBackend {
    fn start_capture(&mut self, sink: PacketSink) -> Result<(), BackendError> {
        if self.fail_start {
            return Err(BackendError::Capture("device unavailable".to_string()));
        }
        self.calls.push(Call::Start(sink.epoch()));
        if let Some(packets) = self.script.take() {
            for packet in packets {
                sink.push(packet);
            }
            match &self.script_failure {
                Some(message) => sink.failed(message.clone()),
                None => sink.finished(),
            };
        }
        self.sinks.push(sink);
        self.running = true;
        Ok(())
    }

    fn stop_capture(&mut self) -> Result<(), BackendError> {
        if self.fail_stop {
            return Err(BackendError::Capture("device busy".to_string()));
        }
        self.calls.push(Call::Stop);
        self.running = false;
        Ok(())
    }

    fn set_filter(&mut self, expression: &str) -> Result<(), BackendError> {
        FilterExpr::parse(expression)?;
        self.calls.push(Call::SetFilter(expression.to_string()));
        Ok(())
    }

    fn filter_packets(
        &self,
        packets: &[Arc<Packet>],
        expression: &str,
    ) -> Result<Vec<Arc<Packet>>, BackendError> {
        self.refilter_calls.set(self.refilter_calls.get() + 1);
        if self.fail_refilter {
            return Err(BackendError::Capture("re-filter unavailable".to_string()));
        }
        let expr = FilterExpr::parse(expression)?;
        let mut matched: Vec<Arc<Packet>> = packets
            .iter()
            .filter(|p| expr.matches(p))
            .cloned()
            .collect();
        if self.reverse_refilter {
            matched.reverse();
        }
        Ok(matched)
    }
}
