use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

extern crate cc;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    emit_build_info();

    // the host build only exists to run the unit tests
    if env::var("CARGO_CFG_TARGET_ARCH").as_deref() == Ok("riscv64") {
        link_firmware();
    }
}

/// Run `program` and return its trimmed output, `None` if it is not installed or fails
fn command_output(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    Some(text.trim().to_string())
}

fn emit_build_info() {
    println!("cargo:rerun-if-env-changed=CONSOLE_BOOT_GIT_ID");
    println!("cargo:rerun-if-changed=../../.git/HEAD");

    let git_id = env::var("CONSOLE_BOOT_GIT_ID")
        .ok()
        .or_else(|| command_output("git", &["describe", "--always", "--dirty"]))
        .unwrap_or_else(|| "unknown".to_string());
    let date = command_output("date", &["-u", "+%Y-%m-%d"]).unwrap_or_else(|| "0000-00-00".to_string());
    let time = command_output("date", &["-u", "+%H:%M:%S"]).unwrap_or_else(|| "00:00:00".to_string());

    println!("cargo:rustc-env=CONSOLE_BOOT_GIT_ID={git_id}");
    println!("cargo:rustc-env=CONSOLE_BOOT_BUILD_DATE={date}");
    println!("cargo:rustc-env=CONSOLE_BOOT_BUILD_TIME={time}");
}

fn link_firmware() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("No out dir"));

    // Put the linker scripts somewhere the linker can find it
    let link_dir = PathBuf::from("src/arch/link");
    println!("cargo:rustc-link-search={}", out_dir.display());
    for entry in fs::read_dir(link_dir).unwrap() {
        let entry = entry.unwrap();
        println!("cargo:rerun-if-changed={}", entry.path().display());
        fs::copy(entry.path(), out_dir.join(entry.file_name())).unwrap();
    }
    // set "-C link-arg=-Tlink.ld" argument when linking to use the custom linker script
    println!("cargo:rustc-link-arg-bins=-Tlink.ld");

    let asm_dir = PathBuf::from("src/arch/riscv64imac/asm");
    for entry in fs::read_dir(asm_dir).unwrap() {
        let entry = entry.unwrap();
        let file_name = entry.file_name().into_string().unwrap();
        let name = file_name.split('.').next().unwrap();
        println!("cargo:rerun-if-changed={}", entry.path().display());
        cc::Build::new()
            .file(entry.path())
            .flag("-no-pie")
            .flag("-fno-pic")
            .compiler("riscv64-elf-gcc")
            .target("riscv64imac")
            .compile(name);
    }
    println!("cargo:rustc-link-search=native={}", out_dir.display());
}
