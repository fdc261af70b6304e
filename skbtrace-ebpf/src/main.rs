#![no_std]
#![no_main]

use aya_ebpf::{
	helpers::{bpf_get_current_pid_tgid, bpf_ktime_get_ns},
	macros::{kprobe, map},
	maps::{Array, RingBuf, StackTrace},
	programs::ProbeContext,
};
use aya_log_ebpf::error;
use skbtrace_common::{DumpSlot, FilterConfig, TraceEvent, DUMP_SLOT_COUNT, STACK_TABLE_ENTRIES};

mod access;
mod filter;
mod output;
mod vmlinux;

use vmlinux::sk_buff;

#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(256 * 1024, 0);

#[map]
static CONFIG: Array<FilterConfig> = Array::with_max_entries(1, 0);

#[map]
static DUMP_SLOTS: Array<DumpSlot> = Array::with_max_entries(DUMP_SLOT_COUNT, 0);

#[map]
static STACKS: StackTrace = StackTrace::with_max_entries(STACK_TABLE_ENTRIES, 0);

/// Key of the single config entry.
const CONFIG_KEY: u32 = 0;

// One entry point per argument position of the traced skb. Which kernel
// function each one is bound to is the loader's decision; the probes are
// purely positional.

#[kprobe]
pub fn skb_arg1(ctx: ProbeContext) -> u32 {
	match try_handle_skb(&ctx, 1) {
		Ok(ret) => ret,
		Err(ret) => ret,
	}
}

#[kprobe]
pub fn skb_arg2(ctx: ProbeContext) -> u32 {
	match try_handle_skb(&ctx, 2) {
		Ok(ret) => ret,
		Err(ret) => ret,
	}
}

#[kprobe]
pub fn skb_arg3(ctx: ProbeContext) -> u32 {
	match try_handle_skb(&ctx, 3) {
		Ok(ret) => ret,
		Err(ret) => ret,
	}
}

#[kprobe]
pub fn skb_arg4(ctx: ProbeContext) -> u32 {
	match try_handle_skb(&ctx, 4) {
		Ok(ret) => ret,
		Err(ret) => ret,
	}
}

#[kprobe]
pub fn skb_arg5(ctx: ProbeContext) -> u32 {
	match try_handle_skb(&ctx, 5) {
		Ok(ret) => ret,
		Err(ret) => ret,
	}
}

fn try_handle_skb(ctx: &ProbeContext, slot: u32) -> Result<u32, u32> {
	let skb: *const sk_buff = ctx.arg(slot as usize - 1).ok_or(1u32)?;

	let mut event = TraceEvent::empty();

	// No published config yet: trace everything, annotate nothing.
	if let Some(cfg) = CONFIG.get(CONFIG_KEY) {
		if !filter::accept(skb, cfg) {
			return Ok(0);
		}
		output::set_output(ctx, skb, cfg, &mut event);
	}

	event.pid = bpf_get_current_pid_tgid() as u32;
	event.probe_slot = slot;
	event.probe_addr = access::probe_ip(ctx);
	event.skb_addr = skb as u64;
	event.timestamp_ns = unsafe { bpf_ktime_get_ns() };

	match EVENTS.output(&event, 0) {
		Ok(_) => (),
		Err(e) => error!(ctx, "Couldn't write to the ring buffer ->> ERROR: {}", e),
	}

	Ok(0)
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
	loop {}
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";
