use std::{path::Path, process::Command};

use time::{OffsetDateTime, macros::format_description};

fn main() {
  let build_time = OffsetDateTime::now_utc()
    .format(format_description!("[year]-[month]-[day] [hour]:[minute] UTC"))
    .unwrap_or_else(|_| "unknown".into());
  println!("cargo:rustc-env=BUILD_TIME_HUMAN={}", build_time);

  println!("cargo:rerun-if-changed=.git/HEAD");
  if Path::new(".git/refs/heads").exists() {
    println!("cargo:rerun-if-changed=.git/refs/heads");
  }

  let commit_short = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".into());
  println!("cargo:rustc-env=GIT_COMMIT_SHORT={}", commit_short);

  let dirty = git(&["status", "--porcelain"]).is_some_and(|out| !out.is_empty());
  println!("cargo:rustc-env=GIT_DIRTY={}", dirty);

  let rustc = std::env::var("RUSTC").unwrap_or_else(|_| "rustc".into());
  let rust_version = Command::new(rustc)
    .arg("--version")
    .output()
    .ok()
    .filter(|o| o.status.success())
    .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
    .unwrap_or_else(|| "unknown".into());
  println!("cargo:rustc-env=RUST_VERSION={}", rust_version);
}

fn git(args: &[&str]) -> Option<String> {
  let output = Command::new("git").args(args).output().ok()?;
  if !output.status.success() {
    return None;
  }
  Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
