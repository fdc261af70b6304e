//! Event annotation stages, one per output-enable flag.

use core::mem;
use core::sync::atomic::{AtomicU64, Ordering};

use aya_ebpf::{bindings::btf_ptr, helpers::r#gen::bpf_snprintf_btf, programs::ProbeContext};
use network_types::{
	ip::{IpProto, Ipv4Hdr},
	tcp::TcpHdr,
	udp::UdpHdr,
};
use skbtrace_common::{
	dump_slot_index, l3_version_supported, FilterConfig, FlowTuple, SkbMeta, TraceEvent,
	DUMP_SLOT_LEN,
};

use crate::{
	access::{self, Access, SkbAccess},
	filter,
	vmlinux::sk_buff,
};

/// BPF_F_FAST_STACK_CMP: dedup stacks by hash only, no frame compare.
const STACK_FLAGS: u64 = 0x200;

/// Next dump sequence number, shared by every CPU. The fetch-add is the
/// only synchronization; two dumps a pool-length apart alias to the same
/// slot and the last writer wins.
static DUMP_CURSOR: AtomicU64 = AtomicU64::new(0);

pub fn set_output(ctx: &ProbeContext, skb: *const sk_buff, cfg: &FilterConfig, event: &mut TraceEvent) {
	if cfg.output_meta != 0 {
		set_meta(skb, &mut event.meta);
	}

	if cfg.output_tuple != 0 {
		set_tuple(skb, &mut event.tuple);
	}

	if cfg.output_skb != 0 {
		set_skb_dump(skb, cfg, event);
	}

	if cfg.output_stack != 0 {
		set_stack(ctx, event);
	}
}

fn set_meta(skb: *const sk_buff, meta: &mut SkbMeta) {
	meta.mark = Access::mark(skb).unwrap_or(0);
	meta.len = Access::len(skb).unwrap_or(0);
	meta.protocol = Access::protocol(skb).unwrap_or(0);

	// The device reference may be gone; ifindex and mtu then stay zero.
	if let Some(dev) = Access::dev(skb) {
		meta.ifindex = Access::ifindex(dev).unwrap_or(0);
		meta.mtu = Access::mtu(dev).unwrap_or(0);
	}
}

/// Records whatever the headers yield: the protocol byte always, addresses
/// only for v4, ports only for TCP/UDP. Unresolvable headers leave the
/// fields zeroed; this stage never rejects.
fn set_tuple(skb: *const sk_buff, tuple: &mut FlowTuple) {
	let Some((head, l3_off, l4_off)) = filter::header_offsets(skb) else {
		return;
	};

	let ip = unsafe { head.add(l3_off as usize) } as *const Ipv4Hdr;
	let Some(ip4) = access::read(ip) else {
		return;
	};
	tuple.proto = ip4.proto as u8;

	if let Some(first_byte) = access::read(ip as *const u8) {
		if l3_version_supported(first_byte) {
			tuple.saddr = ip4.src_addr;
			tuple.daddr = ip4.dst_addr;
		}
	}

	let l4 = unsafe { head.add(l4_off as usize) };
	match ip4.proto {
		IpProto::Tcp => {
			if let Some(tcp) = access::read(l4 as *const TcpHdr) {
				tuple.sport = tcp.source;
				tuple.dport = tcp.dest;
			}
		}
		IpProto::Udp => {
			if let Some(udp) = access::read(l4 as *const UdpHdr) {
				tuple.sport = udp.source;
				tuple.dport = udp.dest;
			}
		}
		_ => {}
	}
}

/// Renders the whole skb into the next dump slot. The capability is
/// injected by the loader as the sk_buff BTF type id; without it, or on
/// any slot/render failure, the event keeps its "no dump" sentinel and is
/// emitted regardless.
fn set_skb_dump(skb: *const sk_buff, cfg: &FilterConfig, event: &mut TraceEvent) {
	if !cfg.dump_enabled() {
		return;
	}

	let seq = DUMP_CURSOR.fetch_add(1, Ordering::Relaxed);
	let slot = dump_slot_index(seq);

	let Some(buf) = crate::DUMP_SLOTS.get_ptr_mut(slot as u32) else {
		return;
	};

	let mut ptr = btf_ptr {
		ptr: skb as *mut _,
		type_id: cfg.skb_btf_id,
		flags: 0,
	};

	let written = unsafe {
		bpf_snprintf_btf(
			buf as *mut _,
			DUMP_SLOT_LEN as u32,
			&mut ptr as *mut _ as *mut _,
			mem::size_of::<btf_ptr>() as u32,
			0,
		)
	};
	if written < 0 {
		return;
	}

	event.dump_slot = slot;
}

fn set_stack(ctx: &ProbeContext, event: &mut TraceEvent) {
	// Keep the raw negative error on failure; the consumer treats any
	// negative id as "no stack".
	event.stack_id = unsafe { crate::STACKS.get_stackid(ctx, STACK_FLAGS) }.unwrap_or_else(|e| e);
}
