fn main() {
    // ESP-IDF sysenv propagation is only meaningful for device builds;
    // host-target test builds run with --no-default-features.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
