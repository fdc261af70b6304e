//! Bounded, fault-tolerant reads of traced kernel objects.
//!
//! Every access to skb memory funnels through [`read`], which copies the
//! value into a local and reports an unreadable source instead of faulting.
//! On top of it sit two field-layout strategies behind [`SkbAccess`],
//! selected once at build time via the `fixed-offsets` feature, never per
//! call: [`CoreLayout`] takes offsets from the BTF-derived `vmlinux.rs`
//! bindings, [`FixedLayout`] uses build-time byte offsets for pre-BTF
//! kernels (x86-64 only, like the register conventions of that path).

use aya_ebpf::{helpers::bpf_probe_read_kernel, programs::ProbeContext};

#[cfg(not(feature = "fixed-offsets"))]
use aya_ebpf::EbpfContext;

use crate::vmlinux::{net_device, sk_buff};

/// Bounded copy of a `T` out of (possibly invalid) kernel memory. `None`
/// means "field unavailable": the source was unmapped or does not exist on
/// this kernel. Callers treat that as zero or skip the annotation.
pub fn read<T>(src: *const T) -> Option<T> {
	unsafe { bpf_probe_read_kernel(src).ok() }
}

/// The skb fields the engine consumes, one accessor per field so the
/// filter and the extractors share a single read path.
pub trait SkbAccess {
	fn mark(skb: *const sk_buff) -> Option<u32>;
	fn len(skb: *const sk_buff) -> Option<u32>;
	fn protocol(skb: *const sk_buff) -> Option<u16>;
	fn head(skb: *const sk_buff) -> Option<*const u8>;
	fn network_header(skb: *const sk_buff) -> Option<u16>;
	fn transport_header(skb: *const sk_buff) -> Option<u16>;
	fn dev(skb: *const sk_buff) -> Option<*const net_device>;
	fn ifindex(dev: *const net_device) -> Option<u32>;
	fn mtu(dev: *const net_device) -> Option<u32>;
}

/// Offsets resolved from the kernel's own type descriptors (vmlinux.rs).
#[cfg(not(feature = "fixed-offsets"))]
pub struct CoreLayout;

#[cfg(not(feature = "fixed-offsets"))]
impl SkbAccess for CoreLayout {
	fn mark(skb: *const sk_buff) -> Option<u32> {
		unsafe { read(&(*skb).mark) }
	}

	fn len(skb: *const sk_buff) -> Option<u32> {
		unsafe { read(&(*skb).len) }
	}

	fn protocol(skb: *const sk_buff) -> Option<u16> {
		unsafe { read(&(*skb).protocol) }
	}

	fn head(skb: *const sk_buff) -> Option<*const u8> {
		let head = unsafe { read(&(*skb).head)? };
		Some(head as *const u8)
	}

	fn network_header(skb: *const sk_buff) -> Option<u16> {
		unsafe { read(&(*skb).network_header) }
	}

	fn transport_header(skb: *const sk_buff) -> Option<u16> {
		unsafe { read(&(*skb).transport_header) }
	}

	fn dev(skb: *const sk_buff) -> Option<*const net_device> {
		let dev = unsafe { read(&(*skb).dev)? };
		if dev.is_null() {
			return None;
		}
		Some(dev as *const net_device)
	}

	fn ifindex(dev: *const net_device) -> Option<u32> {
		let ifindex = unsafe { read(&(*dev).ifindex)? };
		Some(ifindex as u32)
	}

	fn mtu(dev: *const net_device) -> Option<u32> {
		unsafe { read(&(*dev).mtu) }
	}
}

/// Raw bounded copies at byte offsets pinned when the engine was built,
/// for kernels without usable type descriptors.
#[cfg(feature = "fixed-offsets")]
pub struct FixedLayout;

/// x86-64 defconfig offsets, pinned at build time.
#[cfg(feature = "fixed-offsets")]
mod off {
	pub const SKB_DEV: usize = 16;
	pub const SKB_LEN: usize = 112;
	pub const SKB_MARK: usize = 164;
	pub const SKB_PROTOCOL: usize = 176;
	pub const SKB_TRANSPORT_HEADER: usize = 178;
	pub const SKB_NETWORK_HEADER: usize = 180;
	pub const SKB_HEAD: usize = 192;
	pub const DEV_IFINDEX: usize = 168;
	pub const DEV_MTU: usize = 184;
}

#[cfg(feature = "fixed-offsets")]
fn read_at<T>(base: *const u8, offset: usize) -> Option<T> {
	read(unsafe { base.add(offset) } as *const T)
}

#[cfg(feature = "fixed-offsets")]
impl SkbAccess for FixedLayout {
	fn mark(skb: *const sk_buff) -> Option<u32> {
		read_at(skb as *const u8, off::SKB_MARK)
	}

	fn len(skb: *const sk_buff) -> Option<u32> {
		read_at(skb as *const u8, off::SKB_LEN)
	}

	fn protocol(skb: *const sk_buff) -> Option<u16> {
		read_at(skb as *const u8, off::SKB_PROTOCOL)
	}

	fn head(skb: *const sk_buff) -> Option<*const u8> {
		read_at(skb as *const u8, off::SKB_HEAD)
	}

	fn network_header(skb: *const sk_buff) -> Option<u16> {
		read_at(skb as *const u8, off::SKB_NETWORK_HEADER)
	}

	fn transport_header(skb: *const sk_buff) -> Option<u16> {
		read_at(skb as *const u8, off::SKB_TRANSPORT_HEADER)
	}

	fn dev(skb: *const sk_buff) -> Option<*const net_device> {
		let dev: *const net_device = read_at(skb as *const u8, off::SKB_DEV)?;
		if dev.is_null() {
			return None;
		}
		Some(dev)
	}

	fn ifindex(dev: *const net_device) -> Option<u32> {
		let ifindex: i32 = read_at(dev as *const u8, off::DEV_IFINDEX)?;
		Some(ifindex as u32)
	}

	fn mtu(dev: *const net_device) -> Option<u32> {
		read_at(dev as *const u8, off::DEV_MTU)
	}
}

#[cfg(not(feature = "fixed-offsets"))]
pub type Access = CoreLayout;
#[cfg(feature = "fixed-offsets")]
pub type Access = FixedLayout;

/// Instruction address of the instrumented call site.
#[cfg(not(feature = "fixed-offsets"))]
pub fn probe_ip(ctx: &ProbeContext) -> u64 {
	unsafe { aya_ebpf::helpers::r#gen::bpf_get_func_ip(ctx.as_ptr()) }
}

/// The legacy path predates `bpf_get_func_ip`; it reads the saved
/// instruction pointer off the register file instead (x86-64 only).
#[cfg(feature = "fixed-offsets")]
pub fn probe_ip(ctx: &ProbeContext) -> u64 {
	unsafe { (*ctx.regs).rip }
}
