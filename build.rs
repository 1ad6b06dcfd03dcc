fn main() {
    // Only needed when building the desktop window shell.
    #[cfg(feature = "desktop")]
    tauri_build::build();
}
