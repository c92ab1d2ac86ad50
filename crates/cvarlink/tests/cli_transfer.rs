#![cfg(feature = "cli")]

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "cvarlink-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn cvarlink(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cvarlink"))
        .args(["--log-level", "error"])
        .args(args)
        .output()
        .expect("cvarlink should run")
}

fn payload() -> Vec<u8> {
    let mut data = Vec::new();
    for i in 0..12 {
        data.extend_from_slice(
            format!("<text>line {i}: \"50%\" #!m! done</text>\n").as_bytes(),
        );
    }
    data
}

#[test]
fn send_to_file_then_receive_reassembles_payload() {
    let dir = unique_temp_dir("transfer");
    let input = dir.join("menu.rfm");
    let lines = dir.join("lines.txt");
    let out_dir = dir.join("out");
    let data = payload();
    std::fs::write(&input, &data).expect("input should be writable");

    let sent = cvarlink(&[
        "--format",
        "json",
        "send",
        input.to_str().unwrap(),
        "--target",
        "client-1",
        "--pace",
        "0",
        "-o",
        lines.to_str().unwrap(),
    ]);
    assert!(sent.status.success(), "{sent:?}");
    let report: serde_json::Value =
        serde_json::from_slice(&sent.stdout).expect("send should emit json");
    assert!(report["schema_id"]
        .as_str()
        .unwrap_or("")
        .ends_with("send-report.schema.json"));
    assert_eq!(report["kind"], "menu");
    assert_eq!(report["end_marker_sent"], true);

    let text = std::fs::read_to_string(&lines).expect("lines should be written");
    let commands: Vec<&str> = text.lines().collect();
    assert!(commands[0].starts_with("client-1 #!m!"));
    assert_eq!(commands.last().copied(), Some("client-1 #!.!"));
    assert_eq!(report["commands_sent"].as_u64(), Some(commands.len() as u64));
    assert!(commands
        .iter()
        .all(|line| line.len() - "client-1 ".len() <= 255 && !line[9..].contains('"')));
    // Data chunks never look like a header.
    assert!(commands[1..commands.len() - 1]
        .iter()
        .all(|line| !line["client-1 ".len()..].starts_with("#!")));

    let received = cvarlink(&[
        "--format",
        "json",
        "receive",
        lines.to_str().unwrap(),
        "--out-dir",
        out_dir.to_str().unwrap(),
    ]);
    assert!(received.status.success(), "{received:?}");
    let summary: serde_json::Value =
        serde_json::from_slice(&received.stdout).expect("receive should emit json");
    assert_eq!(summary["completed"].as_array().map(Vec::len), Some(1));
    assert_eq!(summary["rejected"], 0);

    let restored = std::fs::read(out_dir.join("client-1-1.rfm")).expect("payload should be written");
    assert_eq!(restored, data);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_writes_lines_to_stdout() {
    let dir = unique_temp_dir("stdout");
    let input = dir.join("autoexec.cfg");
    std::fs::write(&input, "echo hi; set x 1\n").expect("input should be writable");

    let output = cvarlink(&[
        "send",
        input.to_str().unwrap(),
        "--target",
        "srv",
        "--pace",
        "0",
        "--sequenced",
    ]);
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["srv #!f+0000echo hi; set x 1%0A", "srv #!.!"]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn receive_from_stdin_with_interleaved_contexts() {
    let dir = unique_temp_dir("stdin");
    let out_dir = dir.join("out");
    let input = "// relay capture\n\
                 a #!m!hello \n\
                 b #!f!echo \n\
                 a world\n\
                 b one\n\
                 b #!.!\n\
                 a #!.!\n";

    let mut child = Command::new(env!("CARGO_BIN_EXE_cvarlink"))
        .args(["--log-level", "error", "--format", "raw", "receive", "--out-dir"])
        .arg(&out_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("receive should start");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(input.as_bytes())
        .expect("stdin should accept input");
    let output = child.wait_with_output().expect("receive should finish");
    assert!(output.status.success(), "{output:?}");

    let written: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(written.len(), 2);
    assert_eq!(
        std::fs::read_to_string(out_dir.join("a-1.rfm")).expect("a should be written"),
        "hello world"
    );
    assert_eq!(
        std::fs::read_to_string(out_dir.join("b-1.cfg")).expect("b should be written"),
        "echo one"
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_end_marker_depends_on_completion_policy() {
    let dir = unique_temp_dir("no-marker");
    let input = dir.join("menu.rfm");
    let lines = dir.join("lines.txt");
    std::fs::write(&input, payload()).expect("input should be writable");

    let sent = cvarlink(&[
        "send",
        input.to_str().unwrap(),
        "--target",
        "peer",
        "--pace",
        "0",
        "--no-end-marker",
        "-o",
        lines.to_str().unwrap(),
    ]);
    assert!(sent.status.success(), "{sent:?}");

    let marker_dir = dir.join("marker");
    let pending = cvarlink(&[
        "--format",
        "json",
        "receive",
        lines.to_str().unwrap(),
        "--out-dir",
        marker_dir.to_str().unwrap(),
    ]);
    assert_eq!(pending.status.code(), Some(1));
    let summary: serde_json::Value =
        serde_json::from_slice(&pending.stdout).expect("receive should emit json");
    assert_eq!(summary["incomplete"][0]["context"], "peer");

    let idle_dir = dir.join("idle");
    let reaped = cvarlink(&[
        "receive",
        lines.to_str().unwrap(),
        "--out-dir",
        idle_dir.to_str().unwrap(),
        "--completion",
        "idle",
        "--idle",
        "1s",
    ]);
    assert!(reaped.status.success(), "{reaped:?}");
    assert_eq!(
        std::fs::read(idle_dir.join("peer-1.rfm")).expect("payload should be written"),
        payload()
    );

    let length_dir = dir.join("length");
    let expected = payload().len().to_string();
    let by_length = cvarlink(&[
        "receive",
        lines.to_str().unwrap(),
        "--out-dir",
        length_dir.to_str().unwrap(),
        "--completion",
        "length",
        "--expect",
        &expected,
    ]);
    assert!(by_length.status.success(), "{by_length:?}");
    assert!(length_dir.join("peer-1.rfm").exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn invalid_target_is_a_usage_error() {
    let dir = unique_temp_dir("bad-target");
    let input = dir.join("menu.rfm");
    std::fs::write(&input, "x").expect("input should be writable");

    let output = cvarlink(&["send", input.to_str().unwrap(), "--target", "two words", "--pace", "0"]);
    assert_eq!(output.status.code(), Some(64));
    assert!(output.stdout.is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}
