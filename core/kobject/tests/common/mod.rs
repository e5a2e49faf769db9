use std::{env, process::Command};

const CHILD_ENV: &str = "KOBJECT_FATAL_CHILD";

/// Runs `body` in a fresh copy of this test binary and asserts that the
/// process dies, logging one of the `expected` messages first.
///
/// `test` must be the name of the calling test function. Contract violations
/// abort the process, so they cannot be observed from inside the test
/// harness.
pub fn assert_fatal(test: &str, expected: &[&str], body: impl FnOnce()) {
    if env::var_os(CHILD_ENV).is_some() {
        body();
        return;
    }

    let output = Command::new(env::current_exe().unwrap())
        .args([test, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_ENV, "1")
        .env("RUST_LOG", "error")
        .output()
        .unwrap();
    let log = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&output.stdout)
    );

    assert!(
        !output.status.success(),
        "`{test}` ran to completion ({}):\n{log}",
        output.status
    );
    assert!(
        expected.iter().any(|msg| log.contains(msg)),
        "`{test}` died without logging any of {expected:?}:\n{log}"
    );
}
