//! Unit tests for data models module
//!
//! Validates JSON spelling of the enums and the identity helpers used by the
//! failure memo and deferred task registry.

use super::*;

#[test]
fn test_priority_json_spelling() {
    for priority in Priority::ALL {
        let json = serde_json::to_string(&priority).unwrap();
        assert_eq!(json, format!("\"{}\"", priority.as_str()));
    }

    let parsed: Priority = serde_json::from_str("\"BelowNormal\"").unwrap();
    assert_eq!(parsed, Priority::BelowNormal);
    assert!(serde_json::from_str::<Priority>("\"Urgent\"").is_err());
}

#[test]
fn test_io_priority_accepts_deprecated_high() {
    let parsed: IoPriority = serde_json::from_str("\"High\"").unwrap();
    assert_eq!(parsed, IoPriority::High);

    let parsed: IoPriority = serde_json::from_str("\"VeryLow\"").unwrap();
    assert_eq!(parsed, IoPriority::VeryLow);
}

#[test]
fn test_selector_by_keeps_unknown_values() {
    let parsed: SelectorBy = serde_json::from_str("\"CommandLine\"").unwrap();
    assert_eq!(parsed, SelectorBy::CommandLine);

    let parsed: SelectorBy = serde_json::from_str("\"WindowTitle\"").unwrap();
    assert_eq!(parsed, SelectorBy::Unknown("WindowTitle".to_string()));
    assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"WindowTitle\"");
}

#[test]
fn test_force_flag_spelling_and_default() {
    assert_eq!(serde_json::to_string(&ForceFlag::Yes).unwrap(), "\"Y\"");
    assert_eq!(serde_json::to_string(&ForceFlag::No).unwrap(), "\"N\"");
    assert_eq!(ForceFlag::default(), ForceFlag::No);
    assert!(ForceFlag::Yes.is_forced());
}

#[test]
fn test_attribute_labels() {
    assert_eq!(AttributeKind::Affinity.to_string(), "affinity");
    assert_eq!(AttributeKind::Priority.to_string(), "priority");
    assert_eq!(AttributeKind::IoPriority.to_string(), "I/O priority");
}

#[test]
fn test_process_key_display() {
    let key = ProcessKey::new(4242, "notepad.exe");
    assert_eq!(key.to_string(), "notepad.exe (4242)");
    assert_ne!(key, ProcessKey::new(4242, "calc.exe"));
}

#[test]
fn test_refresh_only_touches_mutable_fields() {
    let mut snapshot = ProcessSnapshot {
        pid: 10,
        name: "app".to_string(),
        bin_path: "/usr/bin/app".to_string(),
        cmd_line: "/usr/bin/app --serve".to_string(),
        priority: Some(Priority::Normal),
        io_priority: None,
        affinity: vec![0, 1],
        service: None,
        is_new: true,
    };

    snapshot.refresh(LiveAttributes {
        priority: Some(Priority::High),
        io_priority: Some(IoPriority::Low),
        affinity: vec![2],
    });

    assert_eq!(snapshot.priority, Some(Priority::High));
    assert_eq!(snapshot.io_priority, Some(IoPriority::Low));
    assert_eq!(snapshot.affinity, vec![2]);
    assert_eq!(snapshot.cmd_line, "/usr/bin/app --serve");
    assert!(!snapshot.is_new);
}

#[test]
fn test_stopped_service_is_not_running() {
    let mut service = ServiceSnapshot {
        pid: 812,
        name: "cups.service".to_string(),
        display_name: "CUPS Scheduler".to_string(),
        status: "running".to_string(),
        bin_path: "/usr/sbin/cupsd".to_string(),
        cmd_line: "/usr/sbin/cupsd -l".to_string(),
    };
    assert!(service.is_running());

    service.status = "stopped".to_string();
    assert!(!service.is_running());

    service.status = "running".to_string();
    service.pid = 0;
    assert!(!service.is_running());
}
