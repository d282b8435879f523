//! Service enumeration through systemd
//!
//! Running service units are listed with `systemctl list-units`, then their
//! properties are read in one `systemctl show` call. Output parsing is kept
//! separate from command execution so it can be tested on any host.

use crate::error::OsError;
use crate::models::ServiceSnapshot;
use std::collections::HashMap;
use std::process::Command;

const SHOW_PROPERTIES: &str = "Id,MainPID,Description,ActiveState,ExecStart";
const SERVICE_SUFFIX: &str = ".service";

/// Running services that own a main process
pub fn list_services() -> Result<Vec<ServiceSnapshot>, OsError> {
    let units = systemctl(&[
        "list-units",
        "--type=service",
        "--state=running",
        "--no-legend",
        "--plain",
        "--no-pager",
    ])?;
    let units = parse_unit_list(&units);
    if units.is_empty() {
        return Ok(Vec::new());
    }

    let mut args = vec!["show", "--no-pager", "--property", SHOW_PROPERTIES];
    args.extend(units.iter().map(String::as_str));
    let shown = systemctl(&args)?;

    Ok(parse_show_output(&shown)
        .into_iter()
        .filter(ServiceSnapshot::is_running)
        .collect())
}

fn systemctl(args: &[&str]) -> Result<String, OsError> {
    let output = Command::new("systemctl")
        .args(args)
        .output()
        .map_err(|e| OsError::Enumeration {
            what: "services",
            details: format!("failed to run systemctl: {}", e),
        })?;

    if !output.status.success() {
        return Err(OsError::Enumeration {
            what: "services",
            details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Unit names from `systemctl list-units --no-legend --plain`
pub fn parse_unit_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|unit| unit.ends_with(SERVICE_SUFFIX))
        .map(str::to_string)
        .collect()
}

/// Service records from `systemctl show`, one property block per unit
pub fn parse_show_output(output: &str) -> Vec<ServiceSnapshot> {
    let mut services = Vec::new();
    let mut block: HashMap<&str, &str> = HashMap::new();

    for line in output.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if let Some(service) = service_from_properties(&block) {
                services.push(service);
            }
            block.clear();
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            block.insert(key, value);
        }
    }

    services
}

fn service_from_properties(properties: &HashMap<&str, &str>) -> Option<ServiceSnapshot> {
    let id = properties.get("Id")?;
    let name = id.strip_suffix(SERVICE_SUFFIX).unwrap_or(id);
    let pid = properties
        .get("MainPID")
        .and_then(|pid| pid.trim().parse().ok())
        .unwrap_or(0);
    let (bin_path, cmd_line) = properties
        .get("ExecStart")
        .map(|exec| parse_exec_start(exec))
        .unwrap_or_default();

    Some(ServiceSnapshot {
        pid,
        name: name.to_string(),
        display_name: properties.get("Description").unwrap_or(&name).to_string(),
        status: status_from_active_state(properties.get("ActiveState").copied().unwrap_or("")),
        bin_path,
        cmd_line,
    })
}

fn status_from_active_state(state: &str) -> String {
    match state {
        "active" | "reloading" => "running".to_string(),
        "inactive" | "failed" | "deactivating" | "" => "stopped".to_string(),
        other => other.to_string(),
    }
}

/// Binary path and command line from an `ExecStart` property.
///
/// systemd prints `{ path=/usr/sbin/cupsd ; argv[]=/usr/sbin/cupsd -l ; ... }`;
/// only the first command is used.
pub fn parse_exec_start(exec: &str) -> (String, String) {
    let mut bin_path = String::new();
    let mut cmd_line = String::new();

    let first = exec
        .trim()
        .trim_start_matches('{')
        .split('}')
        .next()
        .unwrap_or("");

    for field in first.split(" ; ").map(str::trim) {
        if let Some(path) = field.strip_prefix("path=") {
            bin_path = path.trim().to_string();
        } else if let Some(argv) = field.strip_prefix("argv[]=") {
            cmd_line = argv.trim().to_string();
        }
    }

    (bin_path, cmd_line)
}
