use tex_bake_core::platform::{basis_supported, CapabilityKey, CpuArch, OperatingSystem};

/// Exhaustive check over every os/arch pair against the support table.
#[test]
fn gate_matches_support_table_for_every_pair() {
    for os in OperatingSystem::ALL {
        for arch in CpuArch::ALL {
            let key = CapabilityKey::new(os, arch);
            let expected = matches!(
                (os, arch),
                (OperatingSystem::Windows, CpuArch::Amd64)
                    | (OperatingSystem::Linux, CpuArch::Amd64)
                    | (OperatingSystem::Linux, CpuArch::Arm32)
                    | (OperatingSystem::Linux, CpuArch::Arm64)
                    | (OperatingSystem::MacOs, CpuArch::Amd64)
                    | (OperatingSystem::MacOs, CpuArch::Arm64)
            );
            assert_eq!(
                basis_supported(key),
                expected,
                "unexpected gate answer for {key}"
            );
        }
    }
}

#[test]
fn unknown_axes_are_never_supported() {
    for os in OperatingSystem::ALL {
        assert!(!basis_supported(CapabilityKey::new(os, CpuArch::Unknown)));
    }
    for arch in CpuArch::ALL {
        assert!(!basis_supported(CapabilityKey::new(
            OperatingSystem::Unknown,
            arch
        )));
    }
}

#[test]
fn key_display_is_os_slash_arch() {
    let key = CapabilityKey::new(OperatingSystem::Linux, CpuArch::Arm64);
    assert_eq!(key.to_string(), "linux/arm64");
    let key = CapabilityKey::new(OperatingSystem::Windows, CpuArch::Amd64);
    assert_eq!(key.to_string(), "windows/amd64");
}

#[test]
fn detect_returns_a_key_the_gate_can_answer() {
    // Whatever the host is, the gate must answer without panicking.
    let key = CapabilityKey::detect();
    let _ = basis_supported(key);
}
