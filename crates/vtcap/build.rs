fn main() {
    // tgetent and friends live in the terminfo library on modern systems.
    // Allow overriding for hosts that ship a standalone libtermcap.
    println!("cargo:rerun-if-env-changed=VTCAP_TERMCAP_LIB");
    let lib = std::env::var("VTCAP_TERMCAP_LIB")
        .unwrap_or_else(|_| "tinfo".to_string());
    println!("cargo:rustc-link-lib={lib}");
}
