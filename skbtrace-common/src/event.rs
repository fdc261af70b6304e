use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::DUMP_SLOT_LEN;

/// `TraceEvent::dump_slot` when no dump was produced for this event.
pub const DUMP_SLOT_NONE: u64 = u64::MAX;
/// `TraceEvent::stack_id` when no stack was captured for this event.
pub const STACK_ID_NONE: i64 = -1;

/// Cheap metadata snapshot of the traced skb. Fields that hang off the
/// device reference (ifindex, mtu) stay zero when the device is absent.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct SkbMeta {
	pub mark: u32,
	pub ifindex: u32,
	pub len: u32,
	pub mtu: u32,
	/// Link-layer protocol (`skb->protocol`), network byte order.
	pub protocol: u16,
	pub _pad: u16,
}

impl SkbMeta {
	pub const fn empty() -> Self {
		Self {
			mark: 0,
			ifindex: 0,
			len: 0,
			mtu: 0,
			protocol: 0,
			_pad: 0,
		}
	}
}

/// L3/L4 flow tuple pulled out of the skb's embedded headers. Addresses
/// and ports are in network byte order; only IPv4 is interpreted, so the
/// address and port fields stay zero for anything else.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct FlowTuple {
	pub saddr: u32,
	pub daddr: u32,
	pub sport: u16,
	pub dport: u16,
	pub proto: u8,
	pub _pad: [u8; 7],
}

impl FlowTuple {
	pub const fn empty() -> Self {
		Self {
			saddr: 0,
			daddr: 0,
			sport: 0,
			dport: 0,
			proto: 0,
			_pad: [0; 7],
		}
	}
}

/// One record per accepted probe invocation, pushed to the ring buffer and
/// decoded by the userspace reader. Built fresh on the probe stack, never
/// reused.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct TraceEvent {
	pub pid: u32,
	/// Which of the five argument-position entry points produced this
	/// event (1..=5). Not interpreted by the probes themselves.
	pub probe_slot: u32,
	/// Instruction address of the instrumented call site.
	pub probe_addr: u64,
	pub skb_addr: u64,
	pub timestamp_ns: u64,
	/// Index into the dump ring, or [`DUMP_SLOT_NONE`] when no dump was
	/// requested or the rendering failed.
	pub dump_slot: u64,
	pub meta: SkbMeta,
	pub tuple: FlowTuple,
	/// Id into the stack-trace table, negative errno on capture failure,
	/// [`STACK_ID_NONE`] when stack output is off.
	pub stack_id: i64,
}

impl TraceEvent {
	/// Fresh record with every optional annotation at its absent value.
	pub const fn empty() -> Self {
		Self {
			pid: 0,
			probe_slot: 0,
			probe_addr: 0,
			skb_addr: 0,
			timestamp_ns: 0,
			dump_slot: DUMP_SLOT_NONE,
			meta: SkbMeta::empty(),
			tuple: FlowTuple::empty(),
			stack_id: STACK_ID_NONE,
		}
	}
}

/// One slot of the dump ring: a NUL-padded textual rendering of a whole
/// sk_buff.
#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct DumpSlot {
	pub bytes: [u8; DUMP_SLOT_LEN],
}

impl DumpSlot {
	/// The rendered text, without the NUL padding.
	pub fn text_bytes(&self) -> &[u8] {
		let end = self.bytes.iter().position(|&b| b == 0).unwrap_or(DUMP_SLOT_LEN);
		&self.bytes[..end]
	}
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for SkbMeta {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for FlowTuple {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for TraceEvent {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for DumpSlot {}

// region:    --- Tests

#[cfg(test)]
mod tests {
	type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>; // For tests.

	use super::*;
	use core::mem::size_of;

	#[test]
	fn wire_layout_is_stable() -> Result<()> {
		// The reader decodes these records byte-for-byte, so the sizes are
		// part of the contract.
		assert_eq!(size_of::<SkbMeta>(), 20);
		assert_eq!(size_of::<FlowTuple>(), 20);
		assert_eq!(size_of::<TraceEvent>(), 88);
		assert_eq!(size_of::<crate::FilterConfig>(), 56);
		assert_eq!(size_of::<DumpSlot>(), DUMP_SLOT_LEN);

		Ok(())
	}

	#[test]
	fn empty_event_carries_absent_sentinels() -> Result<()> {
		let evt = TraceEvent::empty();

		assert_eq!(evt.dump_slot, DUMP_SLOT_NONE);
		assert_eq!(evt.stack_id, STACK_ID_NONE);
		assert_eq!(evt.meta.mark, 0);
		assert_eq!(evt.meta.ifindex, 0);
		assert_eq!(evt.tuple.saddr, 0);
		assert_eq!(evt.tuple.proto, 0);

		Ok(())
	}

	#[test]
	fn dump_slot_text_stops_at_nul() -> Result<()> {
		// -- Setup & Fixtures
		let mut fx_slot = DumpSlot {
			bytes: [0; DUMP_SLOT_LEN],
		};
		fx_slot.bytes[..5].copy_from_slice(b"(skb)");

		// -- Check
		assert_eq!(fx_slot.text_bytes(), b"(skb)");

		// A full slot with no NUL yields the whole buffer.
		let fx_full = DumpSlot {
			bytes: [b'x'; DUMP_SLOT_LEN],
		};
		assert_eq!(fx_full.text_bytes().len(), DUMP_SLOT_LEN);

		Ok(())
	}
}

// endregion: --- Tests
