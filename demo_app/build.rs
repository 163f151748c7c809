// Compiles the demo's GLSL shaders to SPIR-V with glslc from the Vulkan SDK.
// Skipped with a warning when the SDK is not installed; the demo then expects
// prebuilt .spv files next to the sources.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

fn compile_shaders(shader_dir: &Path, glslc: &str) {
    let entries = match std::fs::read_dir(shader_dir) {
        Ok(entries) => entries,
        Err(_) => {
            eprintln!("info: no shader directory at {:?}", shader_dir);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(ext) = path.extension() else {
            continue;
        };
        if ext != "vert" && ext != "frag" {
            continue;
        }

        let mut out_file = path.clone().into_os_string();
        out_file.push(".spv");
        let out_file = PathBuf::from(out_file);

        let needs_compile = match (std::fs::metadata(&path), std::fs::metadata(&out_file)) {
            (Ok(src), Ok(dst)) => match (src.modified(), dst.modified()) {
                (Ok(src_time), Ok(dst_time)) => src_time > dst_time,
                _ => true,
            },
            _ => true,
        };

        if !needs_compile {
            continue;
        }

        let status = Command::new(glslc).arg(&path).arg("-o").arg(&out_file).status();

        match status {
            Ok(s) if s.success() => {
                eprintln!("info: compiled {:?}", path.file_name().unwrap_or_default());
            }
            Ok(s) => {
                panic!(
                    "glslc failed for {:?} with exit code {}",
                    path,
                    s.code().unwrap_or(-1)
                );
            }
            Err(e) => {
                panic!("failed to run glslc for {:?}: {}", path, e);
            }
        }
    }
}

fn main() {
    println!("cargo:rerun-if-changed=resources/shaders");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        format!("{}\\Bin\\glslc.exe", vulkan_sdk)
    } else {
        format!("{}/bin/glslc", vulkan_sdk)
    };

    if !Path::new(&glslc).exists() {
        eprintln!("warning: glslc not found at {}, shader compilation skipped", glslc);
        return;
    }

    compile_shaders(&PathBuf::from("resources/shaders"), &glslc);
}
