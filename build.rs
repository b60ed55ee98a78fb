//! Build script for frame_pump
//! Links the Android NDK media library on Android targets

fn main() {
    // Only for Android targets
    if std::env::var("CARGO_CFG_TARGET_OS").map_or(false, |os| os == "android") {
        // AMediaCodec/AMediaExtractor live in libmediandk
        println!("cargo:rustc-link-lib=mediandk");
    }
}
