use std::env;
use std::process::Command;

fn main() {
    let mut version = env!("CARGO_PKG_VERSION").to_string();
    if nightly() {
        version.push_str("-nightly");
        if let Some(sha) = git_sha() {
            version.push('+');
            version.push_str(&sha);
        }
    }
    println!("cargo:rustc-env=APP_VERSION={}", version);

    println!("cargo:rerun-if-env-changed=FIACRE_NIGHTLY");
    println!("cargo:rerun-if-env-changed=GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
}

fn nightly() -> bool {
    env::var("FIACRE_NIGHTLY")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

// Short commit hash, from the working tree or the GIT_SHA override for
// builds without a checkout.
fn git_sha() -> Option<String> {
    let from_git = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string());
    from_git
        .into_iter()
        .chain(env::var("GIT_SHA").ok())
        .find(|sha| !sha.is_empty())
}
