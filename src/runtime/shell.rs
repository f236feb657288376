//! Template-driven runtime adapter
//!
//! For products without a console grammar we understand: every capability is
//! an operator-supplied shell command template with placeholder substitution.
//! A capability with no template configured is reported as not configured
//! and logged by the caller — it never aborts the supervisor.

use async_trait::async_trait;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use super::{run_shell, RuntimeAdapter, RuntimeError};
use crate::config::ShellRuntimeConfig;

/// Adapter whose behavior is entirely defined by configured command templates.
pub struct ShellRuntime {
    cfg: ShellRuntimeConfig,
    label: String,
}

impl ShellRuntime {
    pub fn new(cfg: ShellRuntimeConfig) -> Self {
        let label = cfg
            .label
            .clone()
            .unwrap_or_else(|| format!("shell:{}", cfg.instance));
        Self { cfg, label }
    }

    /// Substitute the standard placeholders in a command template.
    fn expand(&self, template: &str) -> String {
        template
            .replace("<install_path>", &self.cfg.install_path)
            .replace("<instance>", &self.cfg.instance)
    }

    /// Run the template for one capability, or report it unconfigured.
    async fn run_capability(
        &self,
        capability: &'static str,
        template: Option<&str>,
    ) -> Result<(), RuntimeError> {
        let template = template.ok_or(RuntimeError::NotConfigured(capability))?;
        run_shell(&self.expand(template)).await
    }
}

#[async_trait]
impl RuntimeAdapter for ShellRuntime {
    fn label(&self) -> &str {
        &self.label
    }

    async fn start_app(&self) -> Result<(), RuntimeError> {
        self.run_capability("start_app", self.cfg.commands.start_app.as_deref())
            .await
    }

    async fn kill_app(&self) -> Result<(), RuntimeError> {
        self.run_capability("kill_app", self.cfg.commands.kill_app.as_deref())
            .await
    }

    async fn start_environment(&self) -> Result<(), RuntimeError> {
        self.run_capability(
            "start_environment",
            self.cfg.commands.start_environment.as_deref(),
        )
        .await?;

        // Give the environment time to boot, then bring up services.
        sleep(Duration::from_secs(self.cfg.boot_wait_secs)).await;

        match self.run_setup().await {
            Ok(()) | Err(RuntimeError::NotConfigured(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn kill_environment(&self) -> Result<(), RuntimeError> {
        self.run_capability(
            "kill_environment",
            self.cfg.commands.kill_environment.as_deref(),
        )
        .await
    }

    async fn minimize(&self) -> Result<(), RuntimeError> {
        self.run_capability("minimize", self.cfg.commands.minimize.as_deref())
            .await
    }

    async fn restore(&self) -> Result<(), RuntimeError> {
        self.run_capability("restore", self.cfg.commands.restore.as_deref())
            .await
    }

    async fn run_setup(&self) -> Result<(), RuntimeError> {
        if self.cfg.commands.setup.is_empty() {
            return Err(RuntimeError::NotConfigured("setup"));
        }

        for template in &self.cfg.commands.setup {
            let command = self.expand(template);
            info!(runtime = %self.label, %command, "running setup command");
            if let Err(e) = run_shell(&command).await {
                warn!(runtime = %self.label, error = %e, "setup command failed");
            }
        }

        Ok(())
    }

    async fn run_post_start(&self) -> Result<(), RuntimeError> {
        let template = self
            .cfg
            .commands
            .post_start
            .as_deref()
            .ok_or(RuntimeError::NotConfigured("post-start"))?;

        let command = self.expand(template);
        info!(runtime = %self.label, %command, "running post-start command");
        run_shell(&command).await
    }

    async fn set_parameter(&self, name: &str, value: &str) -> Result<(), RuntimeError> {
        let template = self
            .cfg
            .commands
            .set_parameter
            .as_deref()
            .ok_or(RuntimeError::NotConfigured("set_parameter"))?;

        let command = self
            .expand(template)
            .replace("<name>", name)
            .replace("<value>", value);
        run_shell(&command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShellCommandSet;

    fn config() -> ShellRuntimeConfig {
        ShellRuntimeConfig {
            label: Some("vm-7".to_string()),
            install_path: "/opt/vm".to_string(),
            instance: "7".to_string(),
            boot_wait_secs: 20,
            commands: ShellCommandSet {
                start_app: Some("true".to_string()),
                ..ShellCommandSet::default()
            },
        }
    }

    #[test]
    fn explicit_label_wins_over_instance() {
        let runtime = ShellRuntime::new(config());
        assert_eq!(runtime.label(), "vm-7");
    }

    #[tokio::test]
    async fn unconfigured_capability_is_rejected() {
        let runtime = ShellRuntime::new(config());
        let err = runtime.kill_app().await.unwrap_err();
        assert!(matches!(err, RuntimeError::NotConfigured("kill_app")));
    }

    #[tokio::test]
    async fn configured_capability_runs() {
        let runtime = ShellRuntime::new(config());
        assert!(runtime.start_app().await.is_ok());
    }
}
