mod cli;
mod error;
mod trx;
mod worker;

pub use self::error::{Error, Result};

use std::time::Duration;

use aya::{
	maps::{Array, MapData, RingBuf},
	programs::KProbe,
	Btf, Ebpf,
};
use aya_obj::btf::BtfKind;
use clap::Parser;
use skbtrace_common::{DumpSlot, FilterConfig};
use tokio::io::unix::AsyncFd;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
	cli::args::{Cli, ProbeSpec},
	trx::new_trx_pair,
	worker::{ReceiverWorker, RingBufWorker},
};

const PROGRAM_NAMES: [&str; 5] = ["skb_arg1", "skb_arg2", "skb_arg3", "skb_arg4", "skb_arg5"];

fn init_tracing() {
	tracing_subscriber::fmt()
		.with_target(false)
		.with_env_filter(EnvFilter::from_default_env())
		.init();
}

#[tokio::main]
async fn main() -> Result<()> {
	let args = Cli::parse();

	init_tracing();

	// Bump the memlock rlimit. This is needed for older kernels that don't use the
	// new memcg based accounting, see https://lwn.net/Articles/837122/
	let rlim = libc::rlimit {
		rlim_cur: libc::RLIM_INFINITY,
		rlim_max: libc::RLIM_INFINITY,
	};
	let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
	if ret != 0 {
		debug!("remove limit on locked memory failed, ret is: {ret}");
	}

	let mut ebpf = aya::Ebpf::load(aya::include_bytes_aligned!(concat!(env!("OUT_DIR"), "/skbtrace")))?;
	if let Err(e) = aya_log::EbpfLogger::init(&mut ebpf) {
		// This can happen if you remove all log statements from your eBPF program.
		warn!("failed to initialize eBPF logger: {e}");
	}

	let mut cfg = args.filter_config();
	if cfg.output_skb != 0 {
		cfg.skb_btf_id = resolve_skb_btf_id()?;
	}

	// The probes treat the config as read-only, so it must be in place
	// before the first one can fire.
	publish_config(&mut ebpf, cfg)?;

	attach_probes(&mut ebpf, &args.probes)?;
	info!("attached {} probe(s)", args.probes.len());

	let ringbuf_fd = take_ring_buf(&mut ebpf)?;
	let dump_slots = take_dump_slots(&mut ebpf, &cfg)?;

	let (tx, rx) = new_trx_pair();
	RingBufWorker::start(ringbuf_fd, tx).await?;
	ReceiverWorker::start(rx, cfg, dump_slots).await?;

	match args.time {
		Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
		None => tokio::signal::ctrl_c().await?,
	}

	info!("detaching");

	Ok(())
}

/// The dump capability the probes get injected with: the running kernel's
/// own type id for `struct sk_buff`.
fn resolve_skb_btf_id() -> Result<u32> {
	let btf = Btf::from_sys_fs()?;
	let id = btf
		.id_by_type_name_kind("sk_buff", BtfKind::Struct)
		.map_err(|_| Error::SkbBtfIdNotFound)?;
	Ok(id)
}

fn publish_config(ebpf: &mut Ebpf, cfg: FilterConfig) -> Result<()> {
	let mut map: Array<&mut MapData, FilterConfig> =
		Array::try_from(ebpf.map_mut("CONFIG").ok_or(Error::EbpfMapNotFound)?)?;
	map.set(0, cfg, 0)?;
	Ok(())
}

fn attach_probes(ebpf: &mut Ebpf, probes: &[ProbeSpec]) -> Result<()> {
	for name in PROGRAM_NAMES {
		let program: &mut KProbe = ebpf.program_mut(name).ok_or(Error::EbpfProgNotFound)?.try_into()?;
		program.load()?;
	}

	// Each FUNC@POS binds the function to the program that reads that
	// argument position.
	for spec in probes {
		let name = PROGRAM_NAMES[spec.position as usize - 1];
		let program: &mut KProbe = ebpf.program_mut(name).ok_or(Error::EbpfProgNotFound)?.try_into()?;
		program.attach(&spec.function, 0)?;
	}

	Ok(())
}

fn take_ring_buf(ebpf: &mut Ebpf) -> Result<AsyncFd<RingBuf<MapData>>> {
	let ring_buf = RingBuf::try_from(ebpf.take_map("EVENTS").ok_or(Error::EbpfMapNotFound)?)?;
	let fd = AsyncFd::new(ring_buf)?;
	Ok(fd)
}

fn take_dump_slots(ebpf: &mut Ebpf, cfg: &FilterConfig) -> Result<Option<Array<MapData, DumpSlot>>> {
	if !cfg.dump_enabled() {
		return Ok(None);
	}

	let map = Array::try_from(ebpf.take_map("DUMP_SLOTS").ok_or(Error::EbpfMapNotFound)?)?;
	Ok(Some(map))
}
