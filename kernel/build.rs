use std::env;
use std::path::PathBuf;

fn main() {
    if let Err(e) = arm_targets::process() {
        println!("cargo::warning={e}");
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    std::fs::copy("link.x", out_dir.join("link.x")).expect("copy link.x");
    println!("cargo::rustc-link-search={}", out_dir.display());
    println!("cargo::rerun-if-changed=link.x");
}
