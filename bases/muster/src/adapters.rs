//! Collaborator implementations that drive an external provisioning
//! toolchain. Every operation is an argv template from the composition's
//! `toolchain` section; placeholders like `{fqdn}` are filled in before the
//! command is spawned and its output is streamed into the host's log.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use fleet_engine::{
    Bootstrapper, CollaboratorError, CustomizationOptions, Hypervisor, NodeRegistry,
    ProgressSink, Tester, VmHandle,
};
use fleet_primitives::{RunList, Template, TestSpec};

type Result<T> = std::result::Result<T, CollaboratorError>;

/// Argv templates for every external operation. `test` is optional: without
/// it, acceptance specs select no runnable test.
#[derive(Debug, Clone, Deserialize)]
pub struct Toolchain {
    pub query_vm: Vec<String>,
    pub network_exists: Vec<String>,
    pub template_exists: Vec<String>,
    pub clone: Vec<String>,
    pub node_exists: Vec<String>,
    pub client_exists: Vec<String>,
    pub delete_client: Vec<String>,
    pub set_run_list: Vec<String>,
    pub bootstrap: Vec<String>,
    #[serde(default)]
    pub test: Option<Vec<String>>,
}

/// Fill `{key}` placeholders and drop arguments that end up empty (so an
/// optional flag like `{sudo}` can vanish entirely).
fn fill(template: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            let mut filled = arg.clone();
            for (key, value) in vars {
                filled = filled.replace(&format!("{{{key}}}"), value);
            }
            filled
        })
        .filter(|arg| !arg.is_empty())
        .collect()
}

fn command_for(argv: &[String]) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| CollaboratorError::failed("toolchain command", "empty argv template"))?;
    let mut command = Command::new(program);
    command.args(args);
    Ok(command)
}

/// Run to completion, capturing stdout. Used for query operations.
async fn run_captured(argv: &[String]) -> Result<(bool, String)> {
    let output = command_for(argv)?
        .output()
        .await
        .map_err(|e| CollaboratorError::io(format!("spawning {}", argv[0]), e))?;
    Ok((
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
    ))
}

/// Run to completion, streaming stdout and stderr line by line into the
/// host's log. Used for long operations (clone, bootstrap, tests).
async fn run_streamed(argv: &[String], progress: &ProgressSink) -> Result<i32> {
    let mut child = command_for(argv)?
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CollaboratorError::io(format!("spawning {}", argv[0]), e))?;

    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        let sink = progress.clone();
        readers.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                sink.send(line);
            }
        }));
    }
    if let Some(stderr) = child.stderr.take() {
        let sink = progress.clone();
        readers.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                sink.send(line);
            }
        }));
    }

    let status = child
        .wait()
        .await
        .map_err(|e| CollaboratorError::io(format!("waiting for {}", argv[0]), e))?;
    for reader in readers {
        let _ = reader.await;
    }

    Ok(status.code().unwrap_or(-1))
}

/// What the `query_vm` command prints on stdout.
#[derive(Debug, Deserialize)]
struct VmQuery {
    exists: bool,
    #[serde(default)]
    powered_on: bool,
    #[serde(default)]
    ip_address: Option<String>,
}

pub struct CommandHypervisor {
    toolchain: Toolchain,
    environment: String,
}

impl CommandHypervisor {
    pub fn new(toolchain: Toolchain, environment: impl Into<String>) -> Self {
        Self {
            toolchain,
            environment: environment.into(),
        }
    }
}

#[async_trait]
impl Hypervisor for CommandHypervisor {
    async fn find_vm(&self, fqdn: &str) -> Result<Option<VmHandle>> {
        let argv = fill(
            &self.toolchain.query_vm,
            &[("fqdn", fqdn), ("environment", &self.environment)],
        );
        let (ok, stdout) = run_captured(&argv).await?;
        if !ok {
            return Err(CollaboratorError::failed(
                "querying VM",
                format!("{} exited non-zero", argv[0]),
            ));
        }

        let query: VmQuery = serde_json::from_str(&stdout).map_err(|e| {
            CollaboratorError::failed("querying VM", format!("bad query output: {e}"))
        })?;
        Ok(query.exists.then_some(VmHandle {
            powered_on: query.powered_on,
            ip_address: query.ip_address,
        }))
    }

    async fn network_exists(&self, name: &str) -> Result<bool> {
        let argv = fill(
            &self.toolchain.network_exists,
            &[("name", name), ("environment", &self.environment)],
        );
        let (ok, _) = run_captured(&argv).await?;
        Ok(ok)
    }

    async fn template_exists(&self, name: &str) -> Result<bool> {
        let argv = fill(
            &self.toolchain.template_exists,
            &[("name", name), ("environment", &self.environment)],
        );
        let (ok, _) = run_captured(&argv).await?;
        Ok(ok)
    }

    async fn clone_vm(
        &self,
        template: &Template,
        target: &str,
        options: &CustomizationOptions,
        progress: ProgressSink,
    ) -> Result<bool> {
        // The toolchain takes the primary NIC; secondary NICs stay on DHCP.
        let primary = options.nics.first().cloned().unwrap_or_default();
        let cpus = options.cpu_count.to_string();
        let memory = options.memory_gb.to_string();
        let dns_suffixes = options.dns_suffixes.join(",");

        let argv = fill(
            &self.toolchain.clone,
            &[
                ("template", &template.name),
                ("fqdn", target),
                ("hostname", &options.hostname),
                ("domain", &options.domain),
                ("vlan", &options.vlan),
                ("cpus", &cpus),
                ("memory_gb", &memory),
                ("resource_pool", &options.resource_pool),
                ("ip", primary.ip.as_deref().unwrap_or("")),
                ("gateway", primary.gateway.as_deref().unwrap_or("")),
                ("dns", options.dns_servers.as_deref().unwrap_or("")),
                ("dns_suffixes", &dns_suffixes),
                ("environment", &self.environment),
            ],
        );

        progress.send(format!("running external command: {}", argv.join(" ")));
        Ok(run_streamed(&argv, &progress).await? == 0)
    }
}

pub struct CommandRegistry {
    toolchain: Toolchain,
    environment: String,
}

impl CommandRegistry {
    pub fn new(toolchain: Toolchain, environment: impl Into<String>) -> Self {
        Self {
            toolchain,
            environment: environment.into(),
        }
    }

    async fn exit_ok(&self, template: &[String], fqdn: &str) -> Result<bool> {
        let argv = fill(
            template,
            &[("fqdn", fqdn), ("environment", &self.environment)],
        );
        let (ok, _) = run_captured(&argv).await?;
        Ok(ok)
    }
}

#[async_trait]
impl NodeRegistry for CommandRegistry {
    async fn node_exists(&self, fqdn: &str) -> Result<bool> {
        self.exit_ok(&self.toolchain.node_exists, fqdn).await
    }

    async fn client_exists(&self, fqdn: &str) -> Result<bool> {
        self.exit_ok(&self.toolchain.client_exists, fqdn).await
    }

    async fn delete_client(&self, fqdn: &str) -> Result<bool> {
        self.exit_ok(&self.toolchain.delete_client, fqdn).await
    }

    async fn set_run_list(&self, fqdn: &str, run_list: &RunList) -> Result<bool> {
        let argv = fill(
            &self.toolchain.set_run_list,
            &[
                ("fqdn", fqdn),
                ("run_list", &run_list.as_argument()),
                ("environment", &self.environment),
            ],
        );
        let (ok, _) = run_captured(&argv).await?;
        Ok(ok)
    }
}

pub struct CommandBootstrapper {
    toolchain: Toolchain,
    environment: String,
}

impl CommandBootstrapper {
    pub fn new(toolchain: Toolchain, environment: impl Into<String>) -> Self {
        Self {
            toolchain,
            environment: environment.into(),
        }
    }
}

#[async_trait]
impl Bootstrapper for CommandBootstrapper {
    async fn run(
        &self,
        target: &str,
        ssh_user: &str,
        ssh_key: &str,
        run_list: &RunList,
        use_sudo: bool,
        progress: ProgressSink,
    ) -> Result<i32> {
        let argv = fill(
            &self.toolchain.bootstrap,
            &[
                ("target", target),
                ("ssh_user", ssh_user),
                ("ssh_key", ssh_key),
                ("run_list", &run_list.as_argument()),
                ("sudo", if use_sudo { "--sudo" } else { "" }),
                ("environment", &self.environment),
            ],
        );

        progress.send(format!("running external command: {}", argv.join(" ")));
        run_streamed(&argv, &progress).await
    }
}

pub struct CommandTester {
    toolchain: Toolchain,
    environment: String,
}

impl CommandTester {
    pub fn new(toolchain: Toolchain, environment: impl Into<String>) -> Self {
        Self {
            toolchain,
            environment: environment.into(),
        }
    }
}

#[async_trait]
impl Tester for CommandTester {
    async fn execute(
        &self,
        spec: &TestSpec,
        dry_run: bool,
        node_fqdn: &str,
        progress: ProgressSink,
    ) -> Result<Option<bool>> {
        let Some(test_template) = &self.toolchain.test else {
            return Ok(None);
        };

        let args = serde_json::to_string(&spec.args)
            .map_err(|e| CollaboratorError::failed("encoding test arguments", e.to_string()))?;
        let argv = fill(
            test_template,
            &[
                ("tester", &spec.tester),
                ("args", &args),
                ("fqdn", node_fqdn),
                ("dry_run", if dry_run { "--dry-run" } else { "" }),
                ("environment", &self.environment),
            ],
        );

        progress.send(format!("running acceptance test {}", spec.tester));
        Ok(Some(run_streamed(&argv, &progress).await? == 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_engine::MessageLog;

    fn strings(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn fill_substitutes_and_drops_empty_arguments() {
        let template = strings(&["bootstrap", "{target}", "{sudo}", "--key", "{ssh_key}"]);
        let argv = fill(
            &template,
            &[("target", "web1.example.org"), ("sudo", ""), ("ssh_key", "id_rsa")],
        );
        assert_eq!(
            argv,
            strings(&["bootstrap", "web1.example.org", "--key", "id_rsa"])
        );
    }

    #[tokio::test]
    async fn run_captured_reports_exit_status_and_stdout() {
        let (ok, stdout) = run_captured(&strings(&["echo", "hello"])).await.unwrap();
        assert!(ok);
        assert_eq!(stdout.trim(), "hello");

        let (ok, _) = run_captured(&strings(&["false"])).await.unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn run_streamed_feeds_the_log_line_by_line() {
        let log = MessageLog::new();
        let sink = ProgressSink::new(&log);

        let code = run_streamed(&strings(&["sh", "-c", "echo one; echo two"]), &sink)
            .await
            .unwrap();

        assert_eq!(code, 0);
        let texts: Vec<_> = log.drain().into_iter().map(|e| e.text).collect();
        assert!(texts.contains(&"one".to_string()));
        assert!(texts.contains(&"two".to_string()));
    }

    #[tokio::test]
    async fn missing_test_command_means_no_test_configured() {
        let toolchain = Toolchain {
            query_vm: strings(&["true"]),
            network_exists: strings(&["true"]),
            template_exists: strings(&["true"]),
            clone: strings(&["true"]),
            node_exists: strings(&["true"]),
            client_exists: strings(&["true"]),
            delete_client: strings(&["true"]),
            set_run_list: strings(&["true"]),
            bootstrap: strings(&["true"]),
            test: None,
        };
        let tester = CommandTester::new(toolchain, "production");
        let log = MessageLog::new();

        let result = tester
            .execute(
                &TestSpec::new("http_ok", serde_json::Value::Null),
                false,
                "web1.example.org",
                ProgressSink::new(&log),
            )
            .await
            .unwrap();
        assert_eq!(result, None);
    }
}
