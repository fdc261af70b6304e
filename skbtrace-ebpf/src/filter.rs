//! Per-invocation accept/reject decision against the published config.

use network_types::{
	ip::{IpProto, Ipv4Hdr},
	tcp::TcpHdr,
	udp::UdpHdr,
};
use skbtrace_common::{l3_version_supported, FilterConfig};

use crate::{
	access::{self, Access, SkbAccess},
	vmlinux::sk_buff,
};

/// Mark check first: it is a single bounded read, the tuple walk is
/// several. A mark mismatch skips the tuple parse entirely.
pub fn accept(skb: *const sk_buff, cfg: &FilterConfig) -> bool {
	filter_mark(skb, cfg) && filter_l3_l4(skb, cfg)
}

fn filter_mark(skb: *const sk_buff, cfg: &FilterConfig) -> bool {
	if cfg.mark == 0 {
		return true;
	}
	let mark = Access::mark(skb).unwrap_or(0);
	cfg.mark_matches(mark)
}

/// Walks the skb's embedded IPv4/TCP/UDP headers. Once any tuple field is
/// constrained, a header that cannot be read, a non-v4 network layer, or a
/// transport we cannot parse while a port filter is set all count as a
/// mismatch.
fn filter_l3_l4(skb: *const sk_buff, cfg: &FilterConfig) -> bool {
	if cfg.tuple_unconstrained() {
		return true;
	}

	let Some((head, l3_off, l4_off)) = header_offsets(skb) else {
		return false;
	};

	let ip = unsafe { head.add(l3_off as usize) } as *const Ipv4Hdr;
	let Some(first_byte) = access::read(ip as *const u8) else {
		return false;
	};
	if !l3_version_supported(first_byte) {
		return false;
	}

	let Some(ip4) = access::read(ip) else {
		return false;
	};
	if !cfg.l3_matches(ip4.src_addr, ip4.dst_addr, ip4.proto as u8) {
		return false;
	}

	if !cfg.wants_port_filter() {
		return true;
	}

	// TCP and UDP keep their ports at the same two leading fields; any
	// other transport cannot satisfy an active port filter.
	let l4 = unsafe { head.add(l4_off as usize) };
	let (sport, dport) = match ip4.proto {
		IpProto::Tcp => {
			let Some(tcp) = access::read(l4 as *const TcpHdr) else {
				return false;
			};
			(tcp.source, tcp.dest)
		}
		IpProto::Udp => {
			let Some(udp) = access::read(l4 as *const UdpHdr) else {
				return false;
			};
			(udp.source, udp.dest)
		}
		_ => return false,
	};

	cfg.ports_match(sport, dport)
}

/// Locates the skb's recorded network and transport headers.
pub fn header_offsets(skb: *const sk_buff) -> Option<(*const u8, u16, u16)> {
	let head = Access::head(skb)?;
	let l3_off = Access::network_header(skb)?;
	let l4_off = Access::transport_header(skb)?;
	Some((head, l3_off, l4_off))
}
