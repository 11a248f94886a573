use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=LIBTORCHSHARP_DIR");
    println!("cargo:rerun-if-env-changed=TORCHSHARP_HOME");

    if env::var_os("CARGO_FEATURE_LIBTORCH").is_none() {
        return;
    }

    // LibTorchSharp 위치: LIBTORCHSHARP_DIR 우선, 없으면 TORCHSHARP_HOME/lib
    let lib_dir = env::var("LIBTORCHSHARP_DIR")
        .ok()
        .or_else(|| env::var("TORCHSHARP_HOME").ok().map(|home| format!("{}/lib", home)));

    match lib_dir {
        Some(dir) => println!("cargo:rustc-link-search=native={}", dir),
        None => println!(
            "cargo:warning=libtorch feature enabled but LIBTORCHSHARP_DIR is not set; relying on the system linker path"
        ),
    }
}
