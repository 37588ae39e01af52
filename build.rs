// build.rs

use std::env;

fn main() {
    let version = env::var("LAUNCHSITE_VERSION")
        .unwrap_or_else(|_| env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "dev".to_string()));
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=LAUNCHSITE_VERSION={version}");
    println!("cargo:rustc-env=LAUNCHSITE_BUILD_TARGET={target}");
    println!("cargo:rerun-if-env-changed=LAUNCHSITE_VERSION");
}
