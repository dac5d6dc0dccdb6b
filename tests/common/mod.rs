//! Scripted facilities shared by the integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use net_health_rs::config::DiagConfig;
use net_health_rs::gateway::{GatewayLookup, GatewayResolver};
use net_health_rs::probes::Diagnostics;
use net_health_rs::runner::{CommandRunner, CommandSpec, RunError, RunOutput};
use tokio_util::sync::CancellationToken;

type Script = dyn Fn(&CommandSpec) -> Result<RunOutput, RunError> + Send + Sync;

/// Answers commands from a closure and records every call.
pub struct ScriptedRunner {
    script: Box<Script>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&CommandSpec) -> Result<RunOutput, RunError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(
        &self,
        cmd: &CommandSpec,
        _timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, RunError> {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        self.calls.lock().unwrap().push(cmd.clone());
        (self.script)(cmd)
    }
}

pub struct FixedGateway(pub GatewayLookup);

impl GatewayResolver for FixedGateway {
    fn resolve(&self, _cancel: &CancellationToken) -> GatewayLookup {
        self.0
    }
}

pub fn ok(stdout: &str) -> Result<RunOutput, RunError> {
    Ok(RunOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: Some(0),
        timed_out: false,
    })
}

pub fn failed(code: i32, stderr: &str) -> Result<RunOutput, RunError> {
    Ok(RunOutput {
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_code: Some(code),
        timed_out: false,
    })
}

pub fn timed_out(partial: &str) -> Result<RunOutput, RunError> {
    Ok(RunOutput {
        stdout: partial.to_string(),
        stderr: String::new(),
        exit_code: None,
        timed_out: true,
    })
}

pub fn missing(program: &str) -> Result<RunOutput, RunError> {
    Err(RunError::Launch {
        program: program.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
    })
}

pub fn diagnostics(runner: Arc<ScriptedRunner>, gateway: GatewayLookup) -> Arc<Diagnostics> {
    Arc::new(Diagnostics::new(
        DiagConfig::default(),
        runner,
        Arc::new(FixedGateway(gateway)),
    ))
}

pub fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {path}: {e}"))
}

/// POSIX ping output with every echo answered.
pub fn posix_ping_ok(host: &str, avg: &str) -> String {
    format!(
        "PING {host} ({host}) 56(84) bytes of data.\n\
         64 bytes from {host}: icmp_seq=1 ttl=117 time={avg} ms\n\
         \n\
         --- {host} ping statistics ---\n\
         4 packets transmitted, 4 received, 0% packet loss, time 3004ms\n\
         rtt min/avg/max/mdev = 1.000/{avg}/9.000/0.500 ms\n"
    )
}

/// Last argument of a command line (the probe target for ping and nmap).
pub fn last_arg(cmd: &CommandSpec) -> &str {
    cmd.args.last().map(String::as_str).unwrap_or("")
}
