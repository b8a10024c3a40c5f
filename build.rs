use std::{env, fs, path::PathBuf};

const DEFAULT_AP_SSID: &str = "PICO_ALARME_AP";
const DEFAULT_AP_PASS: &str = "picoalarme123";

fn main() {
    // 1) Handle memory.x based on target
    let target = env::var("TARGET").expect("TARGET is set by cargo");
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));

    if target.starts_with("thumbv8m") {
        // Pico 2 ARM
        copy_memory_x(&out_dir, "memory-pico2.x");
    } else if target.starts_with("thumbv6m") {
        // Pico W (RP2040)
        copy_memory_x(&out_dir, "memory-pico1w.x");
    }

    // 2) Load optional env files
    let _ = dotenvy::from_filename(".env");
    load_home_env(".pico.env");

    // 3) Soft-AP credentials, with the stock values as fallback
    let ap_ssid = env_or_default("AP_SSID", DEFAULT_AP_SSID);
    let ap_pass = env_or_default("AP_PASS", DEFAULT_AP_PASS);

    if env::var_os("CARGO_FEATURE_WIFI").is_some() {
        if !(1..=32).contains(&ap_ssid.len()) {
            println!("cargo:warning=AP_SSID must be 1-32 bytes; the firmware will refuse to start");
        }
        if !(8..=63).contains(&ap_pass.len()) {
            println!("cargo:warning=AP_PASS must be 8-63 bytes; the firmware will refuse to start");
        }
    }

    // 4) Expose as compile-time constants
    println!("cargo:rustc-env=AP_SSID={ap_ssid}");
    println!("cargo:rustc-env=AP_PASS={ap_pass}");

    println!("cargo:rerun-if-env-changed=AP_SSID");
    println!("cargo:rerun-if-env-changed=AP_PASS");
    println!("cargo:rerun-if-changed=.env");
}

fn copy_memory_x(out_dir: &PathBuf, file: &str) {
    let memory_x = fs::read_to_string(file).unwrap_or_else(|_| panic!("Failed to read {file}"));
    let dest = out_dir.join("memory.x");
    fs::write(&dest, memory_x).expect("Failed to write memory.x");
    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rerun-if-changed={file}");
}

fn load_home_env(file: &str) {
    let home = match env::var_os("USERPROFILE").or_else(|| env::var_os("HOME")) {
        Some(path) => PathBuf::from(path),
        None => return,
    };
    let path = home.join(file);
    let _ = dotenvy::from_path(&path);
}

fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
