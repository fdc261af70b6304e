use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

/// Number of rotating dump slots shared by all CPUs.
pub const DUMP_SLOT_COUNT: u32 = 256;
/// Size of one dump slot, the upper bound for a `bpf_snprintf_btf` rendering.
pub const DUMP_SLOT_LEN: usize = 2048;
/// Capacity of the stack-trace table.
pub const STACK_TABLE_ENTRIES: u32 = 256;

/// 16-byte address slot. Only the first word is interpreted, as an IPv4
/// address in network byte order; the rest is reserved for a future v6
/// layout and must stay zero.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct AddrSlot {
	pub words: [u32; 4],
}

impl AddrSlot {
	pub const fn v4(addr: u32) -> Self {
		Self { words: [addr, 0, 0, 0] }
	}

	pub fn v4_addr(&self) -> u32 {
		self.words[0]
	}

	pub fn is_unset(&self) -> bool {
		self.words == [0; 4]
	}
}

/// Filter and output selection, published once by the loader into the
/// single-entry config map before any probe is attached. The probes only
/// ever read it. A zero in any filter field means "do not constrain on
/// this field". Addresses and ports are in network byte order.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct FilterConfig {
	pub mark: u32,
	/// Reserved: v6 filtering is not supported, must stay zero.
	pub ipv6: u8,
	pub _pad0: [u8; 3],
	pub saddr: AddrSlot,
	pub daddr: AddrSlot,
	pub l4_proto: u8,
	pub _pad1: u8,
	pub sport: u16,
	pub dport: u16,
	pub output_timestamp: u8,
	pub output_meta: u8,
	pub output_tuple: u8,
	pub output_skb: u8,
	pub output_stack: u8,
	pub _pad2: u8,
	/// BTF type id of `struct sk_buff` on the running kernel, resolved by
	/// the loader. Zero means the dump capability is absent and
	/// `output_skb` is ignored.
	pub skb_btf_id: u32,
}

impl FilterConfig {
	pub fn mark_matches(&self, mark: u32) -> bool {
		self.mark == 0 || mark == self.mark
	}

	/// True when no field of the 5-tuple filter is set, the fast path for
	/// "no tuple filtering requested".
	pub fn tuple_unconstrained(&self) -> bool {
		self.l4_proto == 0
			&& self.saddr.is_unset()
			&& self.daddr.is_unset()
			&& self.sport == 0
			&& self.dport == 0
	}

	pub fn l3_matches(&self, saddr: u32, daddr: u32, proto: u8) -> bool {
		if self.saddr.v4_addr() != 0 && saddr != self.saddr.v4_addr() {
			return false;
		}
		if self.daddr.v4_addr() != 0 && daddr != self.daddr.v4_addr() {
			return false;
		}
		if self.l4_proto != 0 && proto != self.l4_proto {
			return false;
		}
		true
	}

	pub fn wants_port_filter(&self) -> bool {
		self.sport != 0 || self.dport != 0
	}

	pub fn ports_match(&self, sport: u16, dport: u16) -> bool {
		if self.sport != 0 && sport != self.sport {
			return false;
		}
		if self.dport != 0 && dport != self.dport {
			return false;
		}
		true
	}

	pub fn dump_enabled(&self) -> bool {
		self.output_skb != 0 && self.skb_btf_id != 0
	}
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for AddrSlot {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for FilterConfig {}

/// Version nibble of the first byte of an IP header.
pub fn ip_version(first_byte: u8) -> u8 {
	first_byte >> 4
}

/// Only IPv4 headers are interpreted; anything else is rejected while a
/// tuple filter is set and left unparsed otherwise.
pub fn l3_version_supported(first_byte: u8) -> bool {
	ip_version(first_byte) == 4
}

/// Slot taken by the `seq`-th dump since attach. Wraps at the pool size, so
/// two dumps 256 apart alias to the same slot and the last writer wins.
pub fn dump_slot_index(seq: u64) -> u64 {
	seq % DUMP_SLOT_COUNT as u64
}

// region:    --- Tests

#[cfg(test)]
mod tests {
	type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>; // For tests.

	use super::*;

	fn fx_tuple_config() -> FilterConfig {
		FilterConfig {
			saddr: AddrSlot::v4(u32::from_be_bytes([10, 0, 0, 1]).to_be()),
			daddr: AddrSlot::v4(u32::from_be_bytes([10, 0, 0, 2]).to_be()),
			l4_proto: IPPROTO_TCP,
			sport: 1234u16.to_be(),
			dport: 80u16.to_be(),
			..FilterConfig::default()
		}
	}

	#[test]
	fn mark_zero_matches_any_mark() -> Result<()> {
		let cfg = FilterConfig::default();

		assert!(cfg.mark_matches(0));
		assert!(cfg.mark_matches(5));
		assert!(cfg.mark_matches(u32::MAX));

		Ok(())
	}

	#[test]
	fn mark_nonzero_requires_equality() -> Result<()> {
		let cfg = FilterConfig {
			mark: 5,
			..FilterConfig::default()
		};

		assert!(cfg.mark_matches(5));
		assert!(!cfg.mark_matches(6));
		assert!(!cfg.mark_matches(0));

		Ok(())
	}

	#[test]
	fn empty_tuple_is_unconstrained() -> Result<()> {
		// -- Setup & Fixtures
		let fx_empty = FilterConfig {
			mark: 42, // mark is not part of the tuple
			output_meta: 1,
			..FilterConfig::default()
		};

		// -- Check
		assert!(fx_empty.tuple_unconstrained());

		Ok(())
	}

	#[test]
	fn any_tuple_field_constrains() -> Result<()> {
		let fx_cases = [
			FilterConfig {
				saddr: AddrSlot::v4(1),
				..FilterConfig::default()
			},
			FilterConfig {
				daddr: AddrSlot::v4(1),
				..FilterConfig::default()
			},
			FilterConfig {
				l4_proto: IPPROTO_UDP,
				..FilterConfig::default()
			},
			FilterConfig {
				sport: 53u16.to_be(),
				..FilterConfig::default()
			},
			FilterConfig {
				dport: 53u16.to_be(),
				..FilterConfig::default()
			},
		];

		for cfg in fx_cases {
			assert!(!cfg.tuple_unconstrained());
		}

		Ok(())
	}

	#[test]
	fn l3_matches_checks_set_fields_only() -> Result<()> {
		// -- Setup & Fixtures
		let cfg = fx_tuple_config();
		let saddr = u32::from_be_bytes([10, 0, 0, 1]).to_be();
		let daddr = u32::from_be_bytes([10, 0, 0, 2]).to_be();

		// -- Check
		assert!(cfg.l3_matches(saddr, daddr, IPPROTO_TCP));
		// Wrong source address.
		assert!(!cfg.l3_matches(saddr.wrapping_add(1), daddr, IPPROTO_TCP));
		// Wrong destination address.
		assert!(!cfg.l3_matches(saddr, 0, IPPROTO_TCP));
		// Protocol mismatch rejects even though the addresses line up.
		assert!(!cfg.l3_matches(saddr, daddr, IPPROTO_UDP));

		// An unset address is a wildcard.
		let wildcard = FilterConfig {
			l4_proto: IPPROTO_TCP,
			..FilterConfig::default()
		};
		assert!(wildcard.l3_matches(saddr, daddr, IPPROTO_TCP));

		Ok(())
	}

	#[test]
	fn dport_filter_accepts_and_rejects() -> Result<()> {
		// -- Setup & Fixtures
		let fx_accept = FilterConfig {
			dport: 80u16.to_be(),
			..FilterConfig::default()
		};
		let fx_reject = FilterConfig {
			dport: 81u16.to_be(),
			..FilterConfig::default()
		};
		let (sport, dport) = (1234u16.to_be(), 80u16.to_be());

		// -- Check
		assert!(fx_accept.wants_port_filter());
		assert!(fx_accept.ports_match(sport, dport));
		assert!(!fx_reject.ports_match(sport, dport));

		Ok(())
	}

	#[test]
	fn unset_ports_are_wildcards() -> Result<()> {
		let cfg = FilterConfig::default();

		assert!(!cfg.wants_port_filter());
		assert!(cfg.ports_match(1u16.to_be(), 2u16.to_be()));

		Ok(())
	}

	#[test]
	fn ip_version_reads_high_nibble() -> Result<()> {
		assert_eq!(ip_version(0x45), 4);
		assert_eq!(ip_version(0x60), 6);
		assert_eq!(ip_version(0x00), 0);

		assert!(l3_version_supported(0x45));
		assert!(!l3_version_supported(0x60));
		assert!(!l3_version_supported(0x00));

		Ok(())
	}

	#[test]
	fn dump_slots_wrap_at_pool_size() -> Result<()> {
		assert_eq!(dump_slot_index(0), 0);
		assert_eq!(dump_slot_index(255), 255);
		// The 257th dump (seq 256) lands on the same slot as the 1st.
		assert_eq!(dump_slot_index(256), dump_slot_index(0));
		assert_eq!(dump_slot_index(511), 255);

		Ok(())
	}

	#[test]
	fn mark_and_dport_scenario() -> Result<()> {
		// -- Setup & Fixtures
		// skb: mark=5, IPv4 TCP 192.168.1.1:4444 -> 192.168.1.2:443.
		let mark = 5u32;
		let saddr = u32::from_be_bytes([192, 168, 1, 1]).to_be();
		let daddr = u32::from_be_bytes([192, 168, 1, 2]).to_be();
		let (sport, dport) = (4444u16.to_be(), 443u16.to_be());

		let fx_match = FilterConfig {
			mark: 5,
			dport: 443u16.to_be(),
			output_tuple: 1,
			..FilterConfig::default()
		};
		let fx_wrong_mark = FilterConfig {
			mark: 6,
			..fx_match
		};
		let fx_wrong_proto = FilterConfig {
			l4_proto: IPPROTO_UDP,
			..fx_match
		};

		// -- Check: mark=5 + dport=443 accepts on every stage.
		assert!(fx_match.mark_matches(mark));
		assert!(fx_match.l3_matches(saddr, daddr, IPPROTO_TCP));
		assert!(fx_match.ports_match(sport, dport));

		// -- Check: mark=6 fails the first (cheap) stage.
		assert!(!fx_wrong_mark.mark_matches(mark));

		// -- Check: UDP filter rejects a TCP object even with matching ports.
		assert!(!fx_wrong_proto.l3_matches(saddr, daddr, IPPROTO_TCP));
		assert!(fx_wrong_proto.ports_match(sport, dport));

		Ok(())
	}
}

// endregion: --- Tests
