use std::{env, path::PathBuf};

const WATCHED_VARIABLES: [&str; 4] = ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_DYNAMIC", "VCPKGRS_TRIPLET"];

fn warn(message: &str) {
    println!("cargo:warning={message}");
}

/// Where vcpkg would have installed FFmpeg for the configured triplet.
fn vcpkg_ffmpeg_dir() -> Option<PathBuf> {
    let root = env::var_os("VCPKG_ROOT")?;
    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    Some(PathBuf::from(root).join("installed").join(triplet))
}

fn main() {
    for variable in WATCHED_VARIABLES {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    if let Some(ffmpeg_dir) = env::var_os("FFMPEG_DIR").map(PathBuf::from) {
        if !ffmpeg_dir.join("include").exists() {
            warn(&format!(
                "FFMPEG_DIR={} has no include/ directory; ffmpeg-next will fail to find headers.",
                ffmpeg_dir.display()
            ));
        }
        return;
    }

    // Elsewhere pkg-config finds the system FFmpeg.
    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "windows" {
        return;
    }

    match vcpkg_ffmpeg_dir() {
        None => warn(
            "FFMPEG_DIR is not set. On Windows, install FFmpeg via vcpkg and set VCPKG_ROOT + FFMPEG_DIR.",
        ),
        Some(dir) if dir.exists() => {
            warn(&format!(
                "Found vcpkg FFmpeg at {}; set FFMPEG_DIR to it to make discovery explicit.",
                dir.display()
            ));
            if env::var_os("VCPKGRS_DYNAMIC").is_none() {
                warn("Set VCPKGRS_DYNAMIC=1 when linking against a dynamic vcpkg FFmpeg.");
            }
        }
        Some(dir) => warn(&format!(
            "VCPKG_ROOT is set but no FFmpeg install was found at {}.",
            dir.display()
        )),
    }
}
