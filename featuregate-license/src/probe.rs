//! Platform-specific hardware identifier probes.
//!
//! Every probe returns `None` on failure. External commands run under a
//! deadline and are killed when it passes.

use std::io::{Read, Seek, SeekFrom};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// How often a running probe command is checked for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Values firmware vendors ship instead of a real serial or UUID.
const PLACEHOLDER_VALUES: &[&str] = &[
    "to be filled by o.e.m.",
    "default string",
    "system serial number",
    "not applicable",
    "not specified",
    "serialnumber",
    "uuid",
    "none",
    "n/a",
    "0",
    "00000000-0000-0000-0000-000000000000",
    "ffffffff-ffff-ffff-ffff-ffffffffffff",
    "03000200-0400-0500-0006-000700080009",
];

/// Persistent installation identifier.
pub(crate) fn machine_guid(timeout: Duration) -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        run_command(
            "reg",
            &[
                "query",
                r"HKLM\SOFTWARE\Microsoft\Cryptography",
                "/v",
                "MachineGuid",
            ],
            timeout,
        )
        .and_then(|out| parse_reg_value(&out, "MachineGuid"))
        .and_then(accept)
    }

    #[cfg(target_os = "linux")]
    {
        let _ = timeout;
        read_identifier_file(&["/etc/machine-id", "/var/lib/dbus/machine-id"])
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    {
        let _ = timeout;
        None
    }
}

/// Hardware/BIOS UUID.
pub(crate) fn bios_uuid(timeout: Duration) -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        cim_property("Win32_ComputerSystemProduct", "UUID", timeout)
    }

    #[cfg(target_os = "linux")]
    {
        let _ = timeout;
        read_identifier_file(&["/sys/class/dmi/id/product_uuid"])
    }

    #[cfg(target_os = "macos")]
    {
        ioreg_property("IOPlatformUUID", timeout)
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        let _ = timeout;
        None
    }
}

/// Baseboard serial number.
pub(crate) fn baseboard_serial(timeout: Duration) -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        cim_property("Win32_BaseBoard", "SerialNumber", timeout)
    }

    #[cfg(target_os = "linux")]
    {
        let _ = timeout;
        read_identifier_file(&["/sys/class/dmi/id/board_serial"])
    }

    #[cfg(target_os = "macos")]
    {
        ioreg_property("IOPlatformSerialNumber", timeout)
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        let _ = timeout;
        None
    }
}

#[cfg(target_os = "windows")]
fn cim_property(class: &str, property: &str, timeout: Duration) -> Option<String> {
    let script = format!(
        "(Get-CimInstance -ClassName {class} -ErrorAction SilentlyContinue | Select-Object -First 1).{property}"
    );
    run_command(
        "powershell",
        &["-NoProfile", "-NonInteractive", "-Command", &script],
        timeout,
    )
    .and_then(|out| out.lines().map(str::trim).find(|l| !l.is_empty()).map(String::from))
    .and_then(accept)
}

/// Extracts the data column from `reg query` output:
/// `    MachineGuid    REG_SZ    5f1c...`.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn parse_reg_value(output: &str, name: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with(name))
        .and_then(|l| {
            let parts: Vec<&str> = l.split_whitespace().collect();
            (parts.len() >= 3).then(|| parts[parts.len() - 1].to_string())
        })
}

#[cfg(target_os = "macos")]
fn ioreg_property(key: &str, timeout: Duration) -> Option<String> {
    run_command("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"], timeout)
        .and_then(|output| {
            output
                .lines()
                .find(|l| l.contains(key))
                .and_then(|l| l.split('"').nth(3))
                .map(String::from)
        })
        .and_then(accept)
}

#[cfg(target_os = "linux")]
fn read_identifier_file(paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| match std::fs::read_to_string(path) {
        Ok(content) => accept(content),
        Err(e) => {
            debug!(path, error = %e, "Identifier file unreadable");
            None
        }
    })
}

/// Trims a raw identifier and rejects blanks and vendor placeholders.
fn accept(raw: String) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() || is_placeholder(value) {
        None
    } else {
        Some(value.to_string())
    }
}

fn is_placeholder(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    PLACEHOLDER_VALUES.contains(&lower.as_str())
}

/// Runs a command and returns its stdout, or `None` if it fails to start,
/// exits unsuccessfully, or outlives `timeout`.
///
/// Stdout is captured in an unnamed temporary file, not a pipe. A descendant
/// left holding the handle cannot stall the read, and no reader thread is
/// needed.
#[cfg_attr(target_os = "linux", allow(dead_code))]
fn run_command(program: &str, args: &[&str], timeout: Duration) -> Option<String> {
    let deadline = Instant::now() + timeout;

    let mut capture = match tempfile::tempfile() {
        Ok(file) => file,
        Err(e) => {
            debug!(program, error = %e, "Probe output file unavailable");
            return None;
        }
    };
    let stdout = capture.try_clone().ok()?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::null());

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        command.creation_flags(CREATE_NO_WINDOW);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            debug!(program, error = %e, "Probe command failed to start");
            return None;
        }
    };

    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => break,
            Ok(Some(status)) => {
                debug!(program, %status, "Probe command exited unsuccessfully");
                return None;
            }
            Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
            Ok(None) => {
                debug!(program, timeout_ms = timeout.as_millis() as u64, "Probe timed out");
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
            Err(e) => {
                debug!(program, error = %e, "Probe status unavailable");
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
        }
    }

    let mut output = String::new();
    match capture
        .seek(SeekFrom::Start(0))
        .and_then(|_| capture.read_to_string(&mut output))
    {
        Ok(_) => Some(output),
        Err(e) => {
            debug!(program, error = %e, "Probe output unreadable");
            None
        }
    }
}
