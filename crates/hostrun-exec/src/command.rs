//! Host transport that shells out through configurable command templates.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use hostrun_core::config::TransportConfig;
use hostrun_core::events::CheckKind;
use hostrun_core::types::{Host, OsFamily, Script};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::debug;

use crate::error::ExecError;
use crate::types::{CheckOutcome, HostTransport, ScriptOutput};

const TIMEOUT_EXIT_CODE: i32 = 124;

#[derive(Debug, Clone)]
pub struct ShellTransport {
    config: TransportConfig,
    script_timeout: Duration,
}

impl ShellTransport {
    pub fn new(config: TransportConfig, script_timeout: Duration) -> Self {
        Self {
            config,
            script_timeout,
        }
    }

    fn template_for(&self, os: OsFamily) -> &str {
        match os {
            OsFamily::Linux => &self.config.linux_command,
            OsFamily::Windows => &self.config.windows_command,
        }
    }

    async fn check_network(&self, host: &Host) -> CheckOutcome {
        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let target = (host.address.as_str(), host.port);
        match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
            Ok(Ok(_)) => CheckOutcome::passed(format!("{}:{} reachable", host.address, host.port)),
            Ok(Err(err)) => CheckOutcome::failed(
                format!("{}:{} unreachable", host.address, host.port),
                err.to_string(),
            ),
            Err(_) => CheckOutcome::failed(
                format!("{}:{} did not answer", host.address, host.port),
                format!("connect timed out after {}s", timeout.as_secs()),
            ),
        }
    }

    async fn check_command(&self, host: &Host, command: &str, label: &str) -> CheckOutcome {
        match self.run_command(host, command, None).await {
            Ok(output) if output.exit_code == Some(0) => CheckOutcome::passed(format!("{label} ok")),
            Ok(output) => CheckOutcome::failed(
                format!("{label} failed"),
                failure_detail(&output),
            ),
            Err(err) => CheckOutcome::failed(format!("{label} failed"), err.to_string()),
        }
    }

    async fn run_command(
        &self,
        host: &Host,
        command: &str,
        stdin: Option<&str>,
    ) -> Result<ScriptOutput, ExecError> {
        let rendered = render_template(self.template_for(host.os), host, command);
        debug!(host = %host.name, command = %rendered, "running host command");

        let mut child = Command::new(&self.config.shell)
            .arg("-c")
            .arg(&rendered)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                host: host.name.clone(),
                command: format!("{} -c {rendered}", self.config.shell),
                source,
            })?;

        if let Some(mut pipe) = child.stdin.take() {
            if let Some(input) = stdin {
                pipe.write_all(input.as_bytes())
                    .await
                    .map_err(|source| ExecError::Io {
                        host: host.name.clone(),
                        source,
                    })?;
            }
        }

        match tokio::time::timeout(self.script_timeout, child.wait_with_output()).await {
            Ok(result) => {
                let output = result.map_err(|source| ExecError::Io {
                    host: host.name.clone(),
                    source,
                })?;
                Ok(ScriptOutput {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            Err(_) => Ok(ScriptOutput {
                exit_code: Some(TIMEOUT_EXIT_CODE),
                stdout: String::new(),
                stderr: format!(
                    "timed out after {}s, exit code {TIMEOUT_EXIT_CODE}",
                    self.script_timeout.as_secs()
                ),
            }),
        }
    }
}

#[async_trait]
impl HostTransport for ShellTransport {
    async fn check(&self, kind: CheckKind, host: &Host) -> CheckOutcome {
        match kind {
            CheckKind::Network => self.check_network(host).await,
            CheckKind::Login => self.check_command(host, "true", "login").await,
            CheckKind::Sudo => self.check_command(host, "sudo -n true", "sudo").await,
        }
    }

    async fn run_script(
        &self,
        host: &Host,
        script: &Script,
        reference: Option<&str>,
    ) -> Result<ScriptOutput, ExecError> {
        self.run_command(host, &script.command, reference).await
    }
}

/// Fills `{address}`, `{port}`, `{user}` and a shell-quoted `{command}`.
pub fn render_template(template: &str, host: &Host, command: &str) -> String {
    let user = host
        .username
        .clone()
        .unwrap_or_else(|| default_user(host.os).to_string());
    template
        .replace("{address}", &host.address)
        .replace("{port}", &host.port.to_string())
        .replace("{user}", &user)
        .replace("{command}", &shell_quote(command))
}

pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn default_user(os: OsFamily) -> &'static str {
    match os {
        OsFamily::Linux => "root",
        OsFamily::Windows => "Administrator",
    }
}

fn failure_detail(output: &ScriptOutput) -> String {
    let stderr = output.stderr.trim();
    match output.exit_code {
        Some(code) if stderr.is_empty() => format!("exit code {code}"),
        Some(code) => format!("{stderr}\nexit code {code}"),
        None => format!("{stderr}\nterminated by signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostrun_core::types::{HostId, ScriptId};

    fn local_host(port: u16) -> Host {
        Host {
            id: HostId::new("local"),
            name: "localhost".to_string(),
            address: "127.0.0.1".to_string(),
            port,
            os: OsFamily::Linux,
            username: Some("ops".to_string()),
        }
    }

    fn local_transport(timeout: Duration) -> ShellTransport {
        ShellTransport::new(
            TransportConfig {
                connect_timeout_secs: 2,
                shell: "sh".to_string(),
                linux_command: "sh -c {command}".to_string(),
                windows_command: "sh -c {command}".to_string(),
            },
            timeout,
        )
    }

    fn script(command: &str) -> Script {
        Script {
            id: ScriptId::new("s1"),
            name: "test".to_string(),
            command: command.to_string(),
        }
    }

    #[test]
    fn render_template_fills_placeholders_and_quotes_command() {
        let host = local_host(2222);
        let rendered = render_template(
            "ssh -p {port} {user}@{address} {command}",
            &host,
            "echo 'hi' | wc -c",
        );
        assert_eq!(
            rendered,
            r#"ssh -p 2222 ops@127.0.0.1 'echo '\''hi'\'' | wc -c'"#
        );
    }

    #[test]
    fn render_template_uses_os_default_user() {
        let mut host = local_host(22);
        host.username = None;
        host.os = OsFamily::Windows;
        assert_eq!(render_template("{user}", &host, ""), "Administrator");
    }

    #[tokio::test]
    async fn runs_script_through_template_and_passes_reference_on_stdin() {
        let transport = local_transport(Duration::from_secs(10));
        let output = transport
            .run_script(&local_host(22), &script("cat; echo done >&2; exit 1"), Some("ref-42"))
            .await
            .expect("run script");

        assert_eq!(output.exit_code, Some(1));
        assert_eq!(output.stdout, "ref-42");
        assert!(output.stderr.contains("done"));
    }

    #[tokio::test]
    async fn script_timeout_maps_to_timeout_exit_code() {
        let transport = local_transport(Duration::from_millis(200));
        let output = transport
            .run_script(&local_host(22), &script("sleep 5"), None)
            .await
            .expect("run script");

        assert_eq!(output.exit_code, Some(TIMEOUT_EXIT_CODE));
        assert!(output.stderr.contains("exit code 124"));
    }

    #[tokio::test]
    async fn network_check_reflects_listening_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let open_port = listener.local_addr().expect("addr").port();
        let transport = local_transport(Duration::from_secs(5));

        let outcome = transport
            .check(CheckKind::Network, &local_host(open_port))
            .await;
        assert!(outcome.success, "{outcome:?}");

        drop(listener);
        let outcome = transport
            .check(CheckKind::Network, &local_host(open_port))
            .await;
        assert!(!outcome.success);
        assert!(!outcome.detail.is_empty());
    }

    #[tokio::test]
    async fn login_check_reports_exit_code_in_detail() {
        let mut transport = local_transport(Duration::from_secs(5));
        transport.config.linux_command = "exit 126; {command}".to_string();

        let outcome = transport.check(CheckKind::Login, &local_host(22)).await;
        assert!(!outcome.success);
        assert_eq!(outcome.detail, "exit code 126");

        let transport = local_transport(Duration::from_secs(5));
        let outcome = transport.check(CheckKind::Login, &local_host(22)).await;
        assert!(outcome.success, "{outcome:?}");
    }
}
