fn main() {
    if let Err(e) = arm_targets::process() {
        println!("cargo::warning={e}");
    }
}
