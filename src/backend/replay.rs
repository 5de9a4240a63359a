use super::decoder::decode_frame;
use super::expr::FilterExpr;
use super::{BackendError, CaptureBackend, PacketSink};
use crate::packet::Packet;
use pcap_parser::traits::{PcapNGPacketBlock, PcapReaderIterator};
use pcap_parser::*;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

const READER_CAPACITY: usize = 65536;

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub path: PathBuf,
    /// Delay after each pushed packet. Zero replays as fast as possible.
    pub interval: Duration,
}

/// Plays a pcap/pcapng file back as if it were a live interface.
///
/// The stored filter is bound when a capture starts, so changing it only
/// affects the next run. A restarted capture resumes after the last frame the
/// previous run read; frames are never delivered twice.
pub struct ReplayBackend {
    options: ReplayOptions,
    filter: FilterExpr,
    worker: Option<Worker>,
    cursor: Option<ReplayCursor>,
}

struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<ReplayCursor>,
}

/// Reader position plus the block state needed to keep decoding from it.
struct ReplayCursor {
    reader: Box<dyn PcapReaderIterator + Send>,
    frames: u64,
    interfaces: Vec<InterfaceDescription>,
    legacy_linktype: Linktype,
    legacy_nanos: bool,
}

struct InterfaceDescription {
    linktype: Linktype,
    ts_resolution: u8,
    ts_offset: i64,
}

impl ReplayCursor {
    fn new(reader: Box<dyn PcapReaderIterator + Send>) -> Self {
        Self {
            reader,
            frames: 0,
            interfaces: Vec::new(),
            legacy_linktype: Linktype::ETHERNET,
            legacy_nanos: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ReplayStats {
    frames: u64,
    pushed: u64,
    filtered_out: u64,
    undecodable: u64,
}

impl ReplayOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interval: Duration::from_millis(5),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl ReplayBackend {
    pub fn new(options: ReplayOptions) -> Self {
        Self {
            options,
            filter: FilterExpr::Any,
            worker: None,
            cursor: None,
        }
    }

    pub fn options(&self) -> &ReplayOptions {
        &self.options
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl ReplayBackend {
    fn open(&self) -> Result<ReplayCursor, BackendError> {
        let file = File::open(&self.options.path)?;
        let reader = create_reader(READER_CAPACITY, file)
            .map_err(|e| BackendError::Capture(format!("failed to create reader: {e:?}")))?;
        Ok(ReplayCursor::new(reader))
    }
}

impl CaptureBackend for ReplayBackend {
    fn start_capture(&mut self, sink: PacketSink) -> Result<(), BackendError> {
        if self.worker.is_some() {
            return Err(BackendError::Capture("capture already running".to_string()));
        }

        let mut cursor = match self.cursor.take() {
            Some(cursor) => {
                debug!(frames = cursor.frames, "Resuming replay");
                cursor
            }
            None => self.open()?,
        };

        let running = Arc::new(AtomicBool::new(true));
        let worker_running = Arc::clone(&running);
        let filter = self.filter.clone();
        let interval = self.options.interval;
        let path = self.options.path.clone();
        info!(
            path = ?path,
            epoch = sink.epoch(),
            resume_after = cursor.frames,
            "Spawning replay worker"
        );

        let handle = thread::Builder::new()
            .name("livecrab-replay".to_string())
            .spawn(move || {
                let started = Instant::now();
                match replay(&mut cursor, &filter, &sink, &worker_running, interval) {
                    Ok(stats) => {
                        info!(
                            path = ?path,
                            frames = stats.frames,
                            pushed = stats.pushed,
                            filtered_out = stats.filtered_out,
                            undecodable = stats.undecodable,
                            elapsed_ms = started.elapsed().as_millis(),
                            "Replay worker finished"
                        );
                        sink.finished();
                    }
                    Err(e) => {
                        error!(path = ?path, error = %e, "Replay worker failed");
                        sink.failed(e.to_string());
                    }
                }
                cursor
            })?;

        self.worker = Some(Worker { running, handle });
        Ok(())
    }

    fn stop_capture(&mut self) -> Result<(), BackendError> {
        let Some(worker) = self.worker.take() else {
            debug!("Stop requested with no replay worker running");
            return Ok(());
        };
        worker.running.store(false, Ordering::SeqCst);
        let cursor = worker
            .handle
            .join()
            .map_err(|_| BackendError::WorkerPanicked)?;
        info!(frames = cursor.frames, "Replay worker stopped");
        self.cursor = Some(cursor);
        Ok(())
    }

    fn set_filter(&mut self, expression: &str) -> Result<(), BackendError> {
        self.filter = FilterExpr::parse(expression)?;
        debug!(expression, "Stored capture filter");
        Ok(())
    }

    fn filter_packets(
        &self,
        packets: &[Arc<Packet>],
        expression: &str,
    ) -> Result<Vec<Arc<Packet>>, BackendError> {
        let expr = FilterExpr::parse(expression)?;
        let matched: Vec<Arc<Packet>> = packets
            .iter()
            .filter(|packet| expr.matches(packet))
            .cloned()
            .collect();
        debug!(
            expression,
            input = packets.len(),
            matched = matched.len(),
            "Re-filtered snapshot"
        );
        Ok(matched)
    }
}

impl Drop for ReplayBackend {
    fn drop(&mut self) {
        if let Err(e) = self.stop_capture() {
            warn!(error = %e, "Failed to stop replay worker on drop");
        }
    }
}

fn calculate_ts_unit(resolution: u8) -> u64 {
    if resolution & 0x80 != 0 {
        2u64.pow((resolution & 0x7F) as u32)
    } else {
        10u64.pow(resolution as u32)
    }
}

fn replay(
    cursor: &mut ReplayCursor,
    filter: &FilterExpr,
    sink: &PacketSink,
    running: &AtomicBool,
    interval: Duration,
) -> Result<ReplayStats, BackendError> {
    let mut stats = ReplayStats::default();
    let ReplayCursor {
        reader,
        frames,
        interfaces,
        legacy_linktype,
        legacy_nanos,
    } = cursor;
    let mut stalled = false;

    while running.load(Ordering::SeqCst) {
        match reader.next() {
            Ok((offset, block)) => {
                stalled = false;
                let frame: Option<(f64, Vec<u8>)> = match block {
                    PcapBlockOwned::LegacyHeader(header) => {
                        *legacy_linktype = header.network;
                        *legacy_nanos = header.is_nanosecond_precision();
                        debug!(linktype = ?header.network, "Read legacy pcap header");
                        None
                    }
                    PcapBlockOwned::Legacy(block) => {
                        if *legacy_linktype == Linktype::ETHERNET {
                            let fraction = if *legacy_nanos { 1e9 } else { 1e6 };
                            let timestamp = block.ts_sec as f64 + block.ts_usec as f64 / fraction;
                            Some((timestamp, block.data.to_vec()))
                        } else {
                            trace!(linktype = ?legacy_linktype, "Skipping non-Ethernet frame");
                            None
                        }
                    }
                    PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                        debug!("Encountered SectionHeader; clearing interface descriptions");
                        interfaces.clear();
                        None
                    }
                    PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                        interfaces.push(InterfaceDescription {
                            linktype: idb.linktype,
                            ts_resolution: idb.if_tsresol,
                            ts_offset: idb.if_tsoffset,
                        });
                        debug!(
                            if_id = interfaces.len() - 1,
                            "Registered interface description"
                        );
                        None
                    }
                    PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                        match interfaces.get(epb.if_id as usize) {
                            Some(interface) if interface.linktype == Linktype::ETHERNET => {
                                let unit = calculate_ts_unit(interface.ts_resolution);
                                let timestamp = epb.decode_ts_f64(interface.ts_offset as u64, unit);
                                Some((timestamp, epb.packet_data().to_vec()))
                            }
                            Some(_) => None,
                            None => {
                                warn!(
                                    if_id = epb.if_id,
                                    "EPB references unknown interface; skipping packet"
                                );
                                None
                            }
                        }
                    }
                    _ => {
                        trace!("Skipping unsupported block");
                        None
                    }
                };
                reader.consume(offset);

                let Some((timestamp, data)) = frame else {
                    continue;
                };
                stats.frames += 1;
                *frames += 1;

                let packet = match decode_frame(*frames, timestamp, &data) {
                    Ok(packet) => packet,
                    Err(e) => {
                        trace!(number = *frames, error = %e, "Skipping undecodable frame");
                        stats.undecodable += 1;
                        continue;
                    }
                };

                if !filter.matches(&packet) {
                    stats.filtered_out += 1;
                    continue;
                }

                if !sink.push(packet) {
                    debug!("Session hung up; ending replay");
                    break;
                }
                stats.pushed += 1;

                if !interval.is_zero() {
                    thread::sleep(interval);
                }
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                if stalled {
                    return Err(BackendError::Capture(
                        "capture file ends with a truncated block".to_string(),
                    ));
                }
                stalled = true;
                reader
                    .refill()
                    .map_err(|e| BackendError::Capture(format!("failed to refill reader: {e:?}")))?;
            }
            Err(e) => {
                return Err(BackendError::Capture(format!("error while reading packet data: {e:?}")));
            }
        }
    }

    Ok(stats)
}
