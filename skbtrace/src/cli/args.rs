use std::net::Ipv4Addr;
use std::str::FromStr;

use clap::{Parser, ValueEnum};
use skbtrace_common::{AddrSlot, FilterConfig, IPPROTO_TCP, IPPROTO_UDP};

use crate::error::Error;

#[derive(Parser)]
#[command(name = "skbtrace", about = "Trace sk_buff flow through instrumented kernel functions")]
pub struct Cli {
	/// Kernel function to probe, as NAME or NAME@POS where POS is the
	/// 1-based argument position of the skb (default 1). Repeatable.
	#[arg(long = "probe", value_name = "FUNC[@POS]", required = true)]
	pub probes: Vec<ProbeSpec>,

	/// Only trace skbs carrying this mark.
	#[arg(long)]
	pub mark: Option<u32>,

	/// Only trace this IPv4 source address.
	#[arg(long)]
	pub saddr: Option<Ipv4Addr>,

	/// Only trace this IPv4 destination address.
	#[arg(long)]
	pub daddr: Option<Ipv4Addr>,

	/// Only trace this transport protocol.
	#[arg(long, value_enum)]
	pub proto: Option<L4Proto>,

	/// Only trace this source port.
	#[arg(long)]
	pub sport: Option<u16>,

	/// Only trace this destination port.
	#[arg(long)]
	pub dport: Option<u16>,

	/// Print the event timestamp.
	#[arg(long)]
	pub output_timestamp: bool,

	/// Record mark/ifindex/len/mtu/protocol for every event.
	#[arg(long)]
	pub output_meta: bool,

	/// Record the L3/L4 tuple for every event.
	#[arg(long)]
	pub output_tuple: bool,

	/// Render a full textual skb dump alongside every event.
	#[arg(long)]
	pub output_skb: bool,

	/// Record a kernel stack id for every event.
	#[arg(long)]
	pub output_stack: bool,

	/// Stop after this many seconds instead of running until Ctrl-C.
	#[arg(long)]
	pub time: Option<u64>,
}

impl Cli {
	/// The config record the probes will read, minus the BTF capability id
	/// which only the loader can resolve.
	pub fn filter_config(&self) -> FilterConfig {
		FilterConfig {
			mark: self.mark.unwrap_or(0),
			saddr: addr_slot(self.saddr),
			daddr: addr_slot(self.daddr),
			l4_proto: self.proto.map(L4Proto::number).unwrap_or(0),
			sport: self.sport.unwrap_or(0).to_be(),
			dport: self.dport.unwrap_or(0).to_be(),
			output_timestamp: self.output_timestamp as u8,
			output_meta: self.output_meta as u8,
			output_tuple: self.output_tuple as u8,
			output_skb: self.output_skb as u8,
			output_stack: self.output_stack as u8,
			..FilterConfig::default()
		}
	}
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum L4Proto {
	Tcp,
	Udp,
}

impl L4Proto {
	pub fn number(self) -> u8 {
		match self {
			L4Proto::Tcp => IPPROTO_TCP,
			L4Proto::Udp => IPPROTO_UDP,
		}
	}
}

/// One probe binding: a kernel function plus the argument position its skb
/// arrives in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeSpec {
	pub function: String,
	pub position: u8,
}

impl FromStr for ProbeSpec {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (function, position) = match s.split_once('@') {
			Some((function, pos)) => {
				let position: u8 = pos
					.parse()
					.map_err(|_| Error::InvalidProbeSpec(s.to_string()))?;
				(function, position)
			}
			None => (s, 1),
		};

		if function.is_empty() || !(1..=5).contains(&position) {
			return Err(Error::InvalidProbeSpec(s.to_string()));
		}

		Ok(ProbeSpec {
			function: function.to_string(),
			position,
		})
	}
}

fn addr_slot(addr: Option<Ipv4Addr>) -> AddrSlot {
	match addr {
		Some(addr) => AddrSlot::v4(u32::from(addr).to_be()),
		None => AddrSlot::default(),
	}
}

// region:    --- Tests


// endregion: --- Tests
