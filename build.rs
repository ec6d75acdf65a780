use std::env;

fn main() {
    // Firmware link scripts; host builds of the library need none.
    if env::var("CARGO_FEATURE_STM32").is_ok() {
        println!("cargo:rustc-link-arg-bins=--nmagic");
        println!("cargo:rustc-link-arg-bins=-Tlink.x");
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    }
}
