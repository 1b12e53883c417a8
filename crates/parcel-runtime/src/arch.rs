/// Architecture tags a manifest payload may target.
pub const SUPPORTED_ARCHITECTURES: &[&str] = &["arm", "ia32"];

/// Map a machine/ABI name onto a payload architecture tag.
///
/// Any ARM flavour (including 64-bit) runs `arm` payloads and any x86 flavour
/// runs `ia32` payloads. Everything else is unrecognized.
pub fn classify_arch(machine: &str) -> Option<&'static str> {
    let machine = machine.to_ascii_lowercase();
    if machine.contains("arm") || machine.starts_with("aarch64") {
        Some("arm")
    } else if machine.contains("x86") || machine == "amd64" || is_i686_family(&machine) {
        Some("ia32")
    } else {
        None
    }
}

fn is_i686_family(machine: &str) -> bool {
    matches!(machine, "i386" | "i486" | "i586" | "i686")
}

/// Architecture tag of the machine this binary was built for.
pub fn host_architecture() -> Option<&'static str> {
    classify_arch(std::env::consts::ARCH)
}

/// Validate an explicitly configured tag against the closed set.
pub fn supported_arch(tag: &str) -> Option<&'static str> {
    SUPPORTED_ARCHITECTURES.iter().copied().find(|t| *t == tag)
}
