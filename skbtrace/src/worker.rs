use aya::maps::{Array, MapData, RingBuf};
use skbtrace_common::{DumpSlot, FilterConfig, TraceEvent, DUMP_SLOT_NONE, IPPROTO_TCP, IPPROTO_UDP};
use tokio::io::unix::AsyncFd;
use tracing::info;
use zerocopy::FromBytes;

use crate::{
	error::{Error, Result},
	trx::{EventRx, EventTx},
};

pub struct RingBufWorker {
	pub ringbuf_fd: AsyncFd<RingBuf<MapData>>,
	pub tx: EventTx,
}

impl RingBufWorker {
	pub async fn start(ringbuf_fd: AsyncFd<RingBuf<MapData>>, tx: EventTx) -> Result<()> {
		let mut worker = RingBufWorker { ringbuf_fd, tx };
		tokio::spawn(async move {
			let res = worker.start_worker().await;
			res
		});
		Ok(())
	}

	async fn start_worker(&mut self) -> Result<()> {
		let tx = self.tx.clone();
		loop {
			let mut guard = self.ringbuf_fd.readable_mut().await?;
			let ring_buf = guard.get_inner_mut();

			while let Some(item) = ring_buf.next() {
				let data = item.as_ref();

				match parse_event_from_bytes(data) {
					Ok(event) => {
						tx.send(event).await?;
					}
					Err(e) => info!("Failed to parse event: {:?}", e),
				}
			}

			guard.clear_ready();
		}
	}
}

pub struct ReceiverWorker {
	pub rx: EventRx,
	pub cfg: FilterConfig,
	/// Present only when the dump capability was requested and resolved.
	pub dump_slots: Option<Array<MapData, DumpSlot>>,
}

impl ReceiverWorker {
	pub async fn start(rx: EventRx, cfg: FilterConfig, dump_slots: Option<Array<MapData, DumpSlot>>) -> Result<()> {
		let worker = ReceiverWorker { rx, cfg, dump_slots };
		tokio::spawn(async move {
			let res = worker.start_worker().await;
			res
		});
		Ok(())
	}

	async fn start_worker(&self) -> Result<()> {
		while let Ok(evt) = self.rx.recv().await {
			info!("{}", format_event(&self.cfg, &evt));

			if evt.dump_slot != DUMP_SLOT_NONE {
				self.print_dump(&evt);
			}
		}
		Ok(())
	}

	/// Best-effort: a later dump may already have recycled the slot, and a
	/// read failure only costs this one annotation.
	fn print_dump(&self, evt: &TraceEvent) {
		let Some(slots) = &self.dump_slots else {
			return;
		};

		match slots.get(&(evt.dump_slot as u32), 0) {
			Ok(slot) => {
				info!("{}", String::from_utf8_lossy(slot.text_bytes()));
			}
			Err(e) => info!("Failed to read dump slot {}: {:?}", evt.dump_slot, e),
		}
	}
}

fn parse_event_from_bytes(data: &[u8]) -> Result<TraceEvent> {
	let evt = TraceEvent::ref_from_prefix(data).map_err(|_| Error::InvalidEventSize)?.0;
	Ok(*evt)
}

fn format_event(cfg: &FilterConfig, evt: &TraceEvent) -> String {
	let mut line = format!(
		"[{:#018x}] pos{} pid={} skb={:#x}",
		evt.probe_addr, evt.probe_slot, evt.pid, evt.skb_addr
	);

	if cfg.output_timestamp != 0 {
		line.push_str(&format!(" ts={}ns", evt.timestamp_ns));
	}

	if cfg.output_meta != 0 {
		let m = &evt.meta;
		line.push_str(&format!(
			" mark={:#x} if={} len={} mtu={} proto={:#06x}",
			m.mark,
			m.ifindex,
			m.len,
			m.mtu,
			u16::from_be(m.protocol)
		));
	}

	if cfg.output_tuple != 0 {
		let t = &evt.tuple;
		line.push_str(&format!(
			" {}:{} > {}:{} {}",
			ip_to_string(t.saddr),
			u16::from_be(t.sport),
			ip_to_string(t.daddr),
			u16::from_be(t.dport),
			protocol_to_str(t.proto)
		));
	}

	if cfg.output_stack != 0 && evt.stack_id >= 0 {
		line.push_str(&format!(" stack={}", evt.stack_id));
	}

	line
}

/// Addresses travel in network byte order, so the native bytes already are
/// the dotted-quad octets.
fn ip_to_string(ip: u32) -> String {
	let octets = ip.to_ne_bytes();
	format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
}

fn protocol_to_str(proto: u8) -> &'static str {
	match proto {
		IPPROTO_TCP => "TCP",
		IPPROTO_UDP => "UDP",
		_ => "UNKNOWN",
	}
}

// region:    --- Tests

#[cfg(test)]
mod tests {
	type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>; // For tests.

	use super::*;
	use skbtrace_common::{FlowTuple, SkbMeta, STACK_ID_NONE};
	use zerocopy::IntoBytes;

	fn fx_event() -> TraceEvent {
		TraceEvent {
			pid: 4242,
			probe_slot: 2,
			probe_addr: 0xffff_ffff_8123_4560,
			skb_addr: 0xffff_8881_0042_0000,
			timestamp_ns: 1_000_000,
			meta: SkbMeta {
				mark: 0x5,
				ifindex: 2,
				len: 60,
				mtu: 1500,
				protocol: 0x0800u16.to_be(),
				_pad: 0,
			},
			tuple: FlowTuple {
				saddr: u32::from_ne_bytes([192, 168, 1, 1]),
				daddr: u32::from_ne_bytes([192, 168, 1, 2]),
				sport: 4444u16.to_be(),
				dport: 443u16.to_be(),
				proto: IPPROTO_TCP,
				_pad: [0; 7],
			},
			..TraceEvent::empty()
		}
	}

	#[test]
	fn event_round_trips_through_bytes() -> Result<()> {
		// -- Setup & Fixtures
		let fx_evt = fx_event();

		// -- Exec
		let parsed = parse_event_from_bytes(fx_evt.as_bytes())?;

		// -- Check
		assert_eq!(parsed.pid, 4242);
		assert_eq!(parsed.probe_slot, 2);
		assert_eq!(parsed.tuple.dport, 443u16.to_be());
		assert_eq!(parsed.dump_slot, DUMP_SLOT_NONE);
		assert_eq!(parsed.stack_id, STACK_ID_NONE);

		Ok(())
	}

	#[test]
	fn truncated_event_is_rejected() -> Result<()> {
		let fx_evt = fx_event();
		let bytes = fx_evt.as_bytes();

		let res = parse_event_from_bytes(&bytes[..bytes.len() - 1]);

		assert!(matches!(res, Err(Error::InvalidEventSize)));

		Ok(())
	}

	#[test]
	fn format_renders_requested_blocks_only() -> Result<()> {
		// -- Setup & Fixtures
		let fx_evt = fx_event();
		let fx_cfg = FilterConfig {
			output_tuple: 1,
			..FilterConfig::default()
		};

		// -- Exec
		let line = format_event(&fx_cfg, &fx_evt);

		// -- Check
		assert!(line.contains("pos2"));
		assert!(line.contains("pid=4242"));
		assert!(line.contains("192.168.1.1:4444 > 192.168.1.2:443 TCP"));
		assert!(!line.contains("mtu="));
		assert!(!line.contains("ts="));
		assert!(!line.contains("stack="));

		Ok(())
	}

	#[test]
	fn format_renders_meta_and_timestamp() -> Result<()> {
		let fx_evt = fx_event();
		let fx_cfg = FilterConfig {
			output_timestamp: 1,
			output_meta: 1,
			..FilterConfig::default()
		};

		let line = format_event(&fx_cfg, &fx_evt);

		assert!(line.contains("ts=1000000ns"));
		assert!(line.contains("mark=0x5"));
		assert!(line.contains("mtu=1500"));
		assert!(line.contains("proto=0x0800"));

		Ok(())
	}

	#[test]
	fn absent_stack_id_is_not_rendered() -> Result<()> {
		let fx_evt = fx_event();
		let fx_cfg = FilterConfig {
			output_stack: 1,
			..FilterConfig::default()
		};

		// STACK_ID_NONE is negative, so nothing is printed even though the
		// stack flag is on.
		let line = format_event(&fx_cfg, &fx_evt);
		assert!(!line.contains("stack="));

		let with_stack = TraceEvent {
			stack_id: 7,
			..fx_evt
		};
		let line = format_event(&fx_cfg, &with_stack);
		assert!(line.contains("stack=7"));

		Ok(())
	}

	#[test]
	fn ip_rendering_uses_wire_order() -> Result<()> {
		assert_eq!(ip_to_string(u32::from_ne_bytes([10, 0, 0, 1])), "10.0.0.1");
		assert_eq!(protocol_to_str(IPPROTO_TCP), "TCP");
		assert_eq!(protocol_to_str(IPPROTO_UDP), "UDP");
		assert_eq!(protocol_to_str(89), "UNKNOWN");

		Ok(())
	}
}

// endregion: --- Tests
