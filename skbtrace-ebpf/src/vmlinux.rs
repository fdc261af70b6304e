//! Kernel type layouts for the probes.
//!
//! Generated with `aya-tool generate sk_buff net_device` against the target
//! kernel's BTF, then trimmed to the prefix that covers the fields the
//! probes read. Offsets must match the deployed kernel; pre-BTF kernels use
//! the `fixed-offsets` constants in `access.rs` instead.

#![allow(non_camel_case_types, non_snake_case, dead_code)]

pub type __u8 = ::core::ffi::c_uchar;
pub type __u16 = ::core::ffi::c_ushort;
pub type __u32 = ::core::ffi::c_uint;
pub type __u64 = ::core::ffi::c_ulonglong;
pub type __be16 = __u16;
pub type __be32 = __u32;

#[repr(C)]
#[derive(Copy, Clone)]
pub struct __BindgenBitfieldUnit<Storage> {
	storage: Storage,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct list_head {
	pub next: *mut list_head,
	pub prev: *mut list_head,
}

#[repr(C)]
pub struct sk_buff {
	pub next: *mut sk_buff,
	pub prev: *mut sk_buff,
	pub dev: *mut net_device,
	pub sk: *mut ::core::ffi::c_void,
	pub tstamp: __u64,
	pub cb: [::core::ffi::c_char; 48usize],
	pub _skb_refdst: ::core::ffi::c_ulong,
	pub destructor: ::core::option::Option<unsafe extern "C" fn(skb: *mut sk_buff)>,
	pub _nfct: ::core::ffi::c_ulong,
	pub len: ::core::ffi::c_uint,
	pub data_len: ::core::ffi::c_uint,
	pub mac_len: __u16,
	pub hdr_len: __u16,
	pub queue_mapping: __u16,
	pub __cloned_offset: [__u8; 0usize],
	pub _bitfield_align_1: [u8; 0usize],
	pub _bitfield_1: __BindgenBitfieldUnit<[u8; 1usize]>,
	pub active_extensions: __u8,
	pub __pkt_type_offset: [__u8; 0usize],
	pub _bitfield_align_2: [u8; 0usize],
	pub _bitfield_2: __BindgenBitfieldUnit<[u8; 4usize]>,
	pub tc_index: __u16,
	pub csum: __u32,
	pub priority: __u32,
	pub skb_iif: ::core::ffi::c_int,
	pub hash: __u32,
	pub vlan_all: __u32,
	pub napi_id: ::core::ffi::c_uint,
	pub secmark: __u32,
	pub mark: __u32,
	pub inner_protocol: __be16,
	pub inner_transport_header: __u16,
	pub inner_network_header: __u16,
	pub inner_mac_header: __u16,
	pub protocol: __be16,
	pub transport_header: __u16,
	pub network_header: __u16,
	pub mac_header: __u16,
	pub tail: __u32,
	pub end: __u32,
	pub head: *mut ::core::ffi::c_uchar,
	pub data: *mut ::core::ffi::c_uchar,
	pub truesize: ::core::ffi::c_uint,
	pub users: __u32,
}

#[repr(C)]
pub struct net_device {
	pub name: [::core::ffi::c_char; 16usize],
	pub name_node: *mut ::core::ffi::c_void,
	pub ifalias: *mut ::core::ffi::c_void,
	pub mem_end: ::core::ffi::c_ulong,
	pub mem_start: ::core::ffi::c_ulong,
	pub base_addr: ::core::ffi::c_ulong,
	pub state: ::core::ffi::c_ulong,
	pub dev_list: list_head,
	pub napi_list: list_head,
	pub unreg_list: list_head,
	pub close_list: list_head,
	pub ptype_all: list_head,
	pub ptype_specific: list_head,
	pub flags: ::core::ffi::c_uint,
	pub priv_flags: ::core::ffi::c_uint,
	pub ifindex: ::core::ffi::c_int,
	pub group: ::core::ffi::c_int,
	pub gflags: ::core::ffi::c_ushort,
	pub padded: ::core::ffi::c_ushort,
	pub operstate: __u8,
	pub link_mode: __u8,
	pub if_port: __u8,
	pub dma: __u8,
	pub mtu: ::core::ffi::c_uint,
	pub min_mtu: ::core::ffi::c_uint,
	pub max_mtu: ::core::ffi::c_uint,
}
