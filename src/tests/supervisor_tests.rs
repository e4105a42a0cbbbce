use crate::storage::{MonitorSettings, StatusReader};
use crate::supervisor::*;
use tempfile::TempDir;

fn shell_settings(dir: &TempDir, script: &str) -> MonitorSettings {
    MonitorSettings {
        data_dir: dir.path().join("data"),
        program: "sh".to_string(),
        program_args: vec!["-c".to_string(), script.to_string()],
        echo_output: false,
        ..MonitorSettings::default()
    }
}

#[test]
fn test_launch_config_args_in_insertion_order() {
    let mut config = LaunchConfig::new();
    config
        .set("-p", 8080u16)
        .set("-v", false)
        .set("-u", true)
        .set_opt("-k", Some(15u32))
        .set_opt("-s", None::<String>)
        .set("-h", "keep.example.org");

    assert_eq!(
        config.to_args(),
        vec!["-p", "8080", "-u", "-k", "15", "-h", "keep.example.org"]
    );
    assert_eq!(config.to_string(), "-p 8080 -u -k 15 -h keep.example.org");
    assert_eq!(config.get("-p"), Some(&LaunchValue::Int(8080)));
    assert_eq!(config.get("-s"), None);
}

#[test]
fn test_launch_config_reset_keeps_position() {
    let mut config = LaunchConfig::new();
    config.set("-p", 1000u16).set("-u", true).set("-p", 2000u16);

    assert_eq!(config.to_args(), vec!["-p", "2000", "-u"]);
}

#[test]
fn test_launch_config_serialization() {
    let mut config = LaunchConfig::new();
    config
        .set("-p", 8080u16)
        .set("-u", true)
        .set_opt("-s", None::<String>)
        .set("-m", "iptables");

    let json = serde_json::to_string(&config).unwrap();
    assert_eq!(json, r#"{"-p":8080,"-u":true,"-s":null,"-m":"iptables"}"#);

    let back: LaunchConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_invocation_build() {
    let settings = MonitorSettings::default();
    let mut launch = LaunchConfig::new();
    launch.set("-p", 8080u16).set("-r", true);

    let invocation = Invocation::build(&settings, &launch);
    assert_eq!(invocation.program, "python3");
    assert_eq!(invocation.args, vec!["natter.py", "-p", "8080", "-r"]);
    assert_eq!(invocation.to_string(), "python3 natter.py -p 8080 -r");
}

#[cfg(unix)]
#[test]
fn test_exit_code_plain() {
    use std::process::Command;

    let status = Command::new("sh").args(["-c", "exit 7"]).status().unwrap();
    assert_eq!(exit_code(status), Some(7));
}

#[cfg(unix)]
mod process_runs {
    use super::*;
    use crate::connectivity::Protocol;
    use crate::storage::Phase;
    use std::future::pending;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_publishes_fact_then_stopped() {
        let dir = TempDir::new().unwrap();
        let settings = shell_settings(&dir, "echo 'WAN > 203.0.113.9:51000 [OPEN]'; exit 3");
        let status_path = settings.status_path();

        let mut supervisor = Supervisor::new(settings, LaunchConfig::new());
        let phase = supervisor.run(pending()).await;

        assert_eq!(phase, Phase::Stopped { code: Some(3) });

        let snapshot = StatusReader::new(&status_path).read().unwrap().unwrap();
        assert_eq!(snapshot.status, "stopped (code: 3)");
        assert_eq!(snapshot.outer_ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(snapshot.outer_port, Some(51000));
        assert_eq!(snapshot.log, "WAN > 203.0.113.9:51000 [OPEN]");
        assert!(snapshot.timestamp.is_some());
    }

    #[tokio::test]
    async fn test_paired_line_on_stderr() {
        let dir = TempDir::new().unwrap();
        let settings = shell_settings(
            &dir,
            "echo 'tcp://192.168.1.5:40000 <--Natter--> tcp://203.0.113.9:51000' 1>&2",
        );

        let mut supervisor = Supervisor::new(settings, LaunchConfig::new());
        let phase = supervisor.run(pending()).await;

        assert_eq!(phase, Phase::Stopped { code: Some(0) });
        let record = supervisor.status();
        assert_eq!(record.outer().unwrap().to_string(), "203.0.113.9:51000");
        assert_eq!(record.inner().unwrap().to_string(), "192.168.1.5:40000");
        assert_eq!(record.protocol(), Protocol::Tcp);
    }

    #[tokio::test]
    async fn test_stdout_and_stderr_keep_write_order() {
        let dir = TempDir::new().unwrap();
        let settings = shell_settings(
            &dir,
            "i=0; while [ $i -lt 100 ]; do echo o$i; echo e$i 1>&2; i=$((i+1)); done",
        );
        let log_path = settings.log_path();

        let mut supervisor = Supervisor::new(settings, LaunchConfig::new());
        supervisor.run(pending()).await;

        let log = std::fs::read_to_string(log_path).unwrap();
        let logged: Vec<&str> = log
            .lines()
            .filter_map(|line| line.split_once("] ").map(|(_, text)| text))
            .collect();
        let expected: Vec<String> = (0..100)
            .flat_map(|i| [format!("o{}", i), format!("e{}", i)])
            .collect();

        assert_eq!(logged, expected);
    }

    #[tokio::test]
    async fn test_later_stdout_fact_beats_earlier_stderr_fact() {
        for _ in 0..10 {
            let dir = TempDir::new().unwrap();
            let settings = shell_settings(
                &dir,
                "echo 'WAN > 198.51.100.1:1000 [OPEN]' 1>&2; echo 'WAN > 203.0.113.9:2000 [OPEN]'",
            );

            let mut supervisor = Supervisor::new(settings, LaunchConfig::new());
            supervisor.run(pending()).await;

            assert_eq!(supervisor.status().outer().unwrap().to_string(), "203.0.113.9:2000");
        }
    }

    #[tokio::test]
    async fn test_shutdown_while_draining_background_output() {
        let dir = TempDir::new().unwrap();
        // The backgrounded loop keeps the pipe open and busy after sh exits
        let settings = shell_settings(
            &dir,
            "(i=0; while [ $i -lt 100 ]; do echo tick; sleep 0.1; i=$((i+1)); done) & exit 0",
        );

        let mut supervisor = Supervisor::new(settings, LaunchConfig::new());
        let started = std::time::Instant::now();
        let phase = supervisor
            .run(tokio::time::sleep(Duration::from_millis(500)))
            .await;

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(phase, Phase::Stopped { code: Some(0) });
    }

    #[tokio::test]
    async fn test_last_fact_wins() {
        let dir = TempDir::new().unwrap();
        let settings = shell_settings(
            &dir,
            "echo 'WAN > 203.0.113.9:1000 [OPEN]'; echo 'WAN > 198.51.100.4:2000 [OPEN]'",
        );

        let mut supervisor = Supervisor::new(settings, LaunchConfig::new());
        supervisor.run(pending()).await;

        assert_eq!(supervisor.status().outer().unwrap().to_string(), "198.51.100.4:2000");
    }

    #[tokio::test]
    async fn test_heartbeat_and_private_lines_are_logged_only() {
        let dir = TempDir::new().unwrap();
        let settings = shell_settings(&dir, "echo 14:03:22; echo 10.0.0.5:22; exit 0");
        let log_path = settings.log_path();

        let mut supervisor = Supervisor::new(settings, LaunchConfig::new());
        let phase = supervisor.run(pending()).await;

        assert_eq!(phase, Phase::Stopped { code: Some(0) });
        assert_eq!(supervisor.status().outer(), None);
        assert_eq!(supervisor.status().log_tail(), "");

        let log = std::fs::read_to_string(log_path).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("] 14:03:22"));
        assert!(lines[1].ends_with("] 10.0.0.5:22"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_and_missing_newline() {
        let dir = TempDir::new().unwrap();
        let settings = shell_settings(&dir, r"printf 'WAN > 203.0.113.9:4000 [OPEN]\377'");

        let mut supervisor = Supervisor::new(settings, LaunchConfig::new());
        supervisor.run(pending()).await;

        let record = supervisor.status();
        assert_eq!(record.outer().unwrap().to_string(), "203.0.113.9:4000");
        assert_eq!(record.log_tail(), "WAN > 203.0.113.9:4000 [OPEN]");
    }

    #[tokio::test]
    async fn test_spawn_failure_publishes_error() {
        let dir = TempDir::new().unwrap();
        let settings = MonitorSettings {
            data_dir: dir.path().join("data"),
            program: "/nonexistent/natter-binary".to_string(),
            program_args: Vec::new(),
            echo_output: false,
            ..MonitorSettings::default()
        };
        let status_path = settings.status_path();

        let mut supervisor = Supervisor::new(settings, LaunchConfig::new());
        let phase = supervisor.run(pending()).await;

        assert!(matches!(phase, Phase::Error(_)));
        let snapshot = StatusReader::new(&status_path).read().unwrap().unwrap();
        assert!(snapshot.status.starts_with("error:"));
        assert!(!snapshot.has_outer());
    }

    #[tokio::test]
    async fn test_shutdown_terminates_child() {
        let dir = TempDir::new().unwrap();
        let settings = shell_settings(&dir, "echo 'WAN > 203.0.113.9:51000 [OPEN]'; exec sleep 30");

        let mut supervisor = Supervisor::new(settings, LaunchConfig::new());
        let started = std::time::Instant::now();
        let phase = supervisor
            .run(tokio::time::sleep(Duration::from_millis(300)))
            .await;

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(phase, Phase::Stopped { code: Some(-9) });
        assert!(supervisor.status().outer().is_some());
    }

    #[tokio::test]
    async fn test_each_run_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let settings = shell_settings(&dir, "echo 'WAN > 203.0.113.9:51000 [OPEN]'");
        let log_path = settings.log_path();

        let mut supervisor = Supervisor::new(settings, LaunchConfig::new());
        supervisor.run(pending()).await;
        supervisor.run(pending()).await;

        let log = std::fs::read_to_string(log_path).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert_eq!(supervisor.status().phase(), &Phase::Stopped { code: Some(0) });
    }

    #[tokio::test]
    async fn test_launch_flags_reach_child() {
        let dir = TempDir::new().unwrap();
        // sh -c puts the first trailing argument in $0
        let settings = shell_settings(&dir, r#"echo "args: $0 $1""#);
        let log_path = settings.log_path();

        let mut launch = LaunchConfig::new();
        launch.set("-p", 8080u16);

        let mut supervisor = Supervisor::new(settings, launch);
        supervisor.run(pending()).await;

        let log = std::fs::read_to_string(log_path).unwrap();
        assert!(log.contains("] args: -p 8080"));
        assert_eq!(
            supervisor.status().launch_config().get("-p"),
            Some(&LaunchValue::Int(8080))
        );
    }
}
