//! Build-time helper for crates that support more than one Arm profile.
//!
//! Call [`process`] from a `build.rs` to inspect the `TARGET` environment
//! variable Cargo sets for the crate being built, and emit `cargo::rustc-cfg`
//! lines so the crate can write `#[cfg(arm_profile = "a")]` /
//! `#[cfg(arm_profile = "r")]` instead of matching on target-triple strings
//! directly.

use std::env;

/// The recognised Arm architecture profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmProfile {
    /// Application profile (Cortex-A)
    A,
    /// Real-time profile (Cortex-R)
    R,
    /// Microcontroller profile (Cortex-M)
    M,
}

impl ArmProfile {
    fn as_cfg_str(self) -> &'static str {
        match self {
            ArmProfile::A => "a",
            ArmProfile::R => "r",
            ArmProfile::M => "m",
        }
    }
}

/// Parses the current build target and emits the appropriate
/// `cargo::rustc-cfg=arm_profile="..."` and `cargo::rustc-check-cfg` lines.
///
/// Returns an error string if `TARGET` is missing or not an Arm target this
/// crate recognises; build scripts should treat that as non-fatal for
/// non-Arm host builds (e.g. `cargo test` on the development machine).
pub fn process() -> Result<(), String> {
    println!("cargo::rustc-check-cfg=cfg(arm_profile, values(\"a\", \"r\", \"m\"))");

    let target = env::var("TARGET").map_err(|_| "TARGET not set".to_string())?;
    if !target.starts_with("arm") && !target.starts_with("thumb") {
        // Not an Arm target (e.g. host build for `cargo test`); nothing to do.
        return Ok(());
    }

    let profile = if target.contains("v7a") {
        ArmProfile::A
    } else if target.contains("v7r") {
        ArmProfile::R
    } else if target.starts_with("thumbv6m")
        || target.starts_with("thumbv7m")
        || target.starts_with("thumbv8m")
    {
        ArmProfile::M
    } else {
        return Err(format!("unrecognised Arm target: {target}"));
    };

    println!("cargo::rustc-cfg=arm_profile=\"{}\"", profile.as_cfg_str());
    println!("cargo::rerun-if-env-changed=TARGET");
    Ok(())
}
