// From vergen documentation
extern crate vergen;
use std::process::Command;

use vergen::{ConstantsFlags, generate_cargo_keys};

fn main() {
    // Only the git-independent keys, so the crate still builds from a
    // plain source tarball.
    let mut flags = ConstantsFlags::empty();
    flags.insert(ConstantsFlags::BUILD_TIMESTAMP);
    flags.insert(ConstantsFlags::SEMVER_FROM_CARGO_PKG);
    generate_cargo_keys(flags).expect("Must be able to generate cargo keys");
    // Based on
    // https://vallentin.io/2019/06/06/versioning
    // https://unix.stackexchange.com/questions/155046/determine-if-git-working-directory-is-clean-from-a-script
    let clean = match Command::new("git")
        .arg("status")
        .arg("--porcelain")
        .output()
    {
        Ok(out) if out.status.success() && out.stdout.is_empty() => "true",
        Ok(_) => "false",
        Err(_) => "unknown",
    };
    println!("cargo:rustc-env=WD_IS_CLEAN={}", clean);
}
