use which::which;

/// `aya-build` drives the BPF compilation from the userspace crate; this
/// only fails fast when the linker it shells out to is missing.
fn main() {
	if which("bpf-linker").is_err() {
		panic!("bpf-linker not found: install it with `cargo install bpf-linker`");
	}
}
