fn main() {
    // ESP-IDF environment is only needed for the firmware binary; host
    // test builds run without the toolchain.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
