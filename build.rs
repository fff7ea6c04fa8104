fn main() {
    println!("cargo:rerun-if-env-changed=ENVNODE_BOARD");

    // Hardware revision string reported by the Device Information Service.
    if let Ok(board) = std::env::var("ENVNODE_BOARD") {
        println!("cargo:rustc-env=ENVNODE_BOARD={board}");
    }

    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
