fn main() {
    // CARGO_CFG_TARGET_OS reflects the target; #[cfg()] here would see the host.
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "windows" {
        // libgit2-sys needs advapi32 for GetNamedSecurityInfoW and the
        // registry calls it makes while reading the system git config.
        println!("cargo:rustc-link-lib=advapi32");
    }
}
