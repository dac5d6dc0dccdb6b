mod common;

use common::{diagnostics, failed, fixture, missing, ok, timed_out, ScriptedRunner};
use net_health_rs::error::ProbeError;
use net_health_rs::gateway::GatewayLookup;
use tokio_util::sync::CancellationToken;

fn nmap_with(xml: &'static str) -> std::sync::Arc<ScriptedRunner> {
    let body = fixture(xml);
    ScriptedRunner::new(move |_| ok(&body))
}

#[tokio::test]
async fn unreachable_target_is_an_empty_report() {
    let runner = nmap_with("nmap_down.xml");
    let diag = diagnostics(runner.clone(), GatewayLookup::NotFound);

    let report = diag
        .port_scan("192.0.2.1", None, &CancellationToken::new())
        .await
        .expect("no error for unreachable host");

    assert_eq!(
        serde_json::to_value(&report).unwrap(),
        serde_json::json!({ "ip": "192.0.2.1", "ports": [] })
    );
    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].to_string(),
        "nmap -oX - -sS -p 22-1024 192.0.2.1"
    );
}

#[tokio::test]
async fn port_scan_uses_requested_range() {
    let runner = nmap_with("nmap_ports.xml");
    let diag = diagnostics(runner.clone(), GatewayLookup::NotFound);

    let report = diag
        .port_scan("192.168.1.10", Some("22,80"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.target, "192.168.1.10");
    assert_eq!(report.ports.len(), 5);
    assert!(runner.calls()[0].args.windows(2).any(|w| w == ["-p", "22,80"]));
}

#[tokio::test]
async fn missing_scanner_is_unavailable() {
    let runner = ScriptedRunner::new(|cmd| missing(&cmd.program));
    let diag = diagnostics(runner, GatewayLookup::NotFound);

    let err = diag
        .port_scan("192.168.1.10", None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProbeError::Unavailable { facility: "nmap", .. }));
}

#[tokio::test]
async fn missing_privilege_is_unavailable() {
    let runner = ScriptedRunner::new(|_| {
        failed(
            1,
            "You requested a scan type which requires root privileges.\nQUITTING!\n",
        )
    });
    let diag = diagnostics(runner, GatewayLookup::NotFound);

    let err = diag
        .os_detect("10.0.0.7", &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        ProbeError::Unavailable { reason, .. } => assert!(reason.contains("root privileges")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn bad_input_never_reaches_the_scanner() {
    let runner = nmap_with("nmap_ports.xml");
    let diag = diagnostics(runner.clone(), GatewayLookup::NotFound);
    let cancel = CancellationToken::new();

    let err = diag.port_scan("-iL/etc/passwd", None, &cancel).await.unwrap_err();
    assert!(matches!(err, ProbeError::InvalidInput(_)));
    let err = diag
        .port_scan("192.168.1.10", Some("99999"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ProbeError::InvalidInput(_)));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn os_detect_is_stable_for_fixed_output() {
    let runner = nmap_with("nmap_os.xml");
    let diag = diagnostics(runner.clone(), GatewayLookup::NotFound);
    let cancel = CancellationToken::new();

    let first = diag.os_detect("10.0.0.7", &cancel).await.unwrap();
    let second = diag.os_detect("10.0.0.7", &cancel).await.unwrap();

    assert_eq!(first.os_name.as_deref(), Some("Linux 4.15 - 5.8"));
    assert_eq!(first.accuracy, Some(96));
    assert_eq!(first, second);
    let cmd = &runner.calls()[0];
    assert!(cmd.has_arg("-O") && cmd.has_arg("-sS"));
}

#[tokio::test]
async fn os_detect_without_match_leaves_fields_unset() {
    let runner = nmap_with("nmap_down.xml");
    let diag = diagnostics(runner, GatewayLookup::NotFound);

    let report = diag
        .os_detect("192.0.2.1", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.os_name, None);
    assert_eq!(report.accuracy, None);
}

#[tokio::test]
async fn scanner_deadline_is_reported() {
    let runner = ScriptedRunner::new(|_| timed_out("<nmaprun>"));
    let diag = diagnostics(runner, GatewayLookup::NotFound);

    let err = diag
        .port_scan("192.168.1.10", None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProbeError::DeadlineExceeded { facility: "nmap", .. }));
}

#[tokio::test]
async fn upload_failure_keeps_download() {
    let select = fixture("speedtest_select.json");
    let download = fixture("speedtest_download.json");
    let runner = ScriptedRunner::new(move |cmd| {
        if cmd.has_arg("--no-upload") && cmd.has_arg("--no-download") {
            ok(&select)
        } else if cmd.has_arg("--no-upload") {
            ok(&download)
        } else {
            failed(1, "ERROR: Upload failed: connection reset by peer\n")
        }
    });
    let diag = diagnostics(runner.clone(), GatewayLookup::NotFound);

    let report = diag.speed_test(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.download_bps, Some(245813221.44));
    assert_eq!(report.upload_bps, None);
    assert_eq!(report.isp.as_deref(), Some("Example Broadband"));
    assert_eq!(report.client_ip.as_deref(), Some("203.0.113.5"));
    assert_eq!(report.ping_ms, Some(12.104));
    assert!(report.measured_at.is_some());

    let calls = runner.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls[1].args.windows(2).any(|w| w == ["--server", "10390"]));
    assert!(calls[2].args.windows(2).any(|w| w == ["--server", "10390"]));
}

#[tokio::test]
async fn full_speed_test() {
    let select = fixture("speedtest_select.json");
    let download = fixture("speedtest_download.json");
    let upload = fixture("speedtest_upload.json");
    let runner = ScriptedRunner::new(move |cmd| match (cmd.has_arg("--no-download"), cmd.has_arg("--no-upload")) {
        (true, true) => ok(&select),
        (false, true) => ok(&download),
        _ => ok(&upload),
    });
    let diag = diagnostics(runner, GatewayLookup::NotFound);

    let report = diag.speed_test(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.download_bps, Some(245813221.44));
    assert_eq!(report.upload_bps, Some(21654012.9));
    let server = report.server.expect("server metadata");
    assert_eq!(server["id"], "10390");
}

#[tokio::test]
async fn speed_test_without_facility_fails() {
    let runner = ScriptedRunner::new(|cmd| missing(&cmd.program));
    let diag = diagnostics(runner, GatewayLookup::NotFound);

    let err = diag.speed_test(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ProbeError::Unavailable { facility: "speedtest", .. }));
}

#[tokio::test]
async fn ping_timeout_is_total_loss() {
    let runner = ScriptedRunner::new(|_| timed_out("PING 10.9.9.9 (10.9.9.9) 56(84) bytes of data.\n"));
    let diag = diagnostics(runner, GatewayLookup::NotFound);

    let report = diag.ping("10.9.9.9", &CancellationToken::new()).await.unwrap();
    assert_eq!(report.packet_loss_pct, Some(100.0));
    assert_eq!(report.received, Some(0));
    assert_eq!(report.transmitted, Some(4));
    assert_eq!(report.avg_rtt_ms, None);
    assert!(report.raw_text.starts_with("timeout"));
    assert!(report.raw_text.contains("PING 10.9.9.9"));
}

#[tokio::test]
async fn ping_parses_combined_output() {
    let runner = ScriptedRunner::new(|cmd| ok(&common::posix_ping_ok(common::last_arg(cmd), "4.250")));
    let diag = diagnostics(runner, GatewayLookup::NotFound);

    let report = diag.ping("8.8.8.8", &CancellationToken::new()).await.unwrap();
    assert_eq!(report.target, "8.8.8.8");
    assert_eq!(report.transmitted, Some(4));
    assert_eq!(report.received, Some(4));
    assert_eq!(report.avg_rtt_ms, Some(4.25));
}

#[tokio::test]
async fn cancelled_probe_never_launches() {
    let runner = nmap_with("nmap_ports.xml");
    let diag = diagnostics(runner.clone(), GatewayLookup::NotFound);
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(matches!(
        diag.port_scan("192.168.1.10", None, &cancel).await,
        Err(ProbeError::Cancelled)
    ));
    assert!(matches!(diag.ping("8.8.8.8", &cancel).await, Err(ProbeError::Cancelled)));
    assert!(matches!(diag.speed_test(&cancel).await, Err(ProbeError::Cancelled)));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn ipv6_scan_passes_family_flag_and_matches_canonical_address() {
    let xml = r#"<?xml version="1.0"?>
<nmaprun scanner="nmap" args="nmap -oX - -6 -sS -p 22-1024 2001:db8:0::1">
<host><status state="up" reason="echo-reply"/>
<address addr="2001:db8::1" addrtype="ipv6"/>
<ports><port protocol="tcp" portid="22"><state state="open" reason="syn-ack"/><service name="ssh"/></port></ports>
</host>
</nmaprun>"#;
    let runner = ScriptedRunner::new(move |_| ok(xml));
    let diag = diagnostics(runner.clone(), GatewayLookup::NotFound);

    let report = diag
        .port_scan("2001:db8:0::1", None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.ports.len(), 1);
    assert_eq!(report.ports[0].port, 22);
    assert_eq!(
        runner.calls()[0].to_string(),
        "nmap -oX - -6 -sS -p 22-1024 2001:db8:0::1"
    );
}

#[tokio::test]
async fn ipv4_scan_has_no_family_flag() {
    let runner = nmap_with("nmap_down.xml");
    let diag = diagnostics(runner.clone(), GatewayLookup::NotFound);
    diag.os_detect("192.0.2.1", &CancellationToken::new()).await.unwrap();
    assert!(!runner.calls()[0].has_arg("-6"));
}
