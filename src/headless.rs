use crate::backend::CaptureBackend;
use crate::session::{Session, SessionStats};
use crate::view::Visible;
use anyhow::{Context, Result, bail};
use std::io::Write;
use std::thread::sleep;
use std::time::Duration;
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Starts the capture, pumps events until the source reports it is done,
/// then stops the capture.
pub fn pump_until_finished<B: CaptureBackend>(session: &mut Session<B>) -> Result<SessionStats> {
    session.start_capture().context("Failed to start capture")?;

    let failure = loop {
        let summary = session.poll();
        if summary.ingested() > 0 {
            debug!(ingested = summary.ingested(), "Pumped packets");
        }
        if let Some(failure) = summary.failures.into_iter().last() {
            break Some(failure);
        }
        if summary.finished {
            break None;
        }
        sleep(POLL_INTERVAL);
    };

    session.stop_capture().context("Failed to stop capture")?;
    let stats = session.stats();
    info!(?stats, "Headless capture complete");

    if let Some(failure) = failure {
        bail!("Capture failed: {failure}");
    }
    Ok(stats)
}

/// Prints the visible rows (newest first) followed by a stats line.
pub fn print_view<B: CaptureBackend, W: Write>(
    session: &Session<B>,
    limit: Option<usize>,
    out: &mut W,
) -> Result<()> {
    let limit = limit.unwrap_or(usize::MAX);
    match session.visible() {
        Visible::Packets(packets) => {
            for packet in packets.iter().take(limit) {
                writeln!(
                    out,
                    "{:>6} {:.6} {}",
                    packet.number,
                    packet.timestamp,
                    packet.summary()
                )?;
            }
        }
        Visible::Groups(groups) => {
            for group in groups.iter().take(limit) {
                writeln!(
                    out,
                    "{} -> {} ({} packets)",
                    group.key.source, group.key.destination, group.packets
                )?;
            }
        }
    }

    let stats = session.stats();
    writeln!(
        out,
        "-- {} packets in {} groups (filter: {:?})",
        if stats.filter_active {
            stats.filtered_packets
        } else {
            stats.unfiltered_packets
        },
        if stats.filter_active {
            stats.filtered_groups
        } else {
            stats.unfiltered_groups
        },
        session.filter_expression()
    )?;
    Ok(())
}
