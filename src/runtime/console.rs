//! Console-driven runtime adapter
//!
//! Drives emulator products that ship a console binary with a
//! `subcommand --name <instance>` grammar, plus adb for in-guest service
//! setup. Instance addressing is by name; the app is addressed by package.

use async_trait::async_trait;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use super::{run_shell, RuntimeAdapter, RuntimeError};
use crate::config::ConsoleRuntimeConfig;

/// Adapter for name-addressed console-tool emulators.
pub struct ConsoleRuntime {
    cfg: ConsoleRuntimeConfig,
    label: String,
}

impl ConsoleRuntime {
    pub fn new(cfg: ConsoleRuntimeConfig) -> Self {
        let label = cfg
            .label
            .clone()
            .unwrap_or_else(|| format!("console:{}", cfg.instance_name));
        Self { cfg, label }
    }

    fn console(&self) -> &str {
        &self.cfg.console_path
    }

    /// Substitute placeholders in a configured command template.
    fn expand(&self, template: &str) -> String {
        template
            .replace("<console_path>", &self.cfg.console_path)
            .replace("<adb_path>", &self.cfg.adb_path)
            .replace("<instance>", &self.cfg.instance_name)
            .replace("<package>", &self.cfg.app_package)
    }
}

#[async_trait]
impl RuntimeAdapter for ConsoleRuntime {
    fn label(&self) -> &str {
        &self.label
    }

    async fn start_app(&self) -> Result<(), RuntimeError> {
        // Return to the home screen first so the launch lands on a known UI.
        sleep(Duration::from_secs(1)).await;
        run_shell(&format!(
            "{} action --name {} --key call.keyboard --value home",
            self.console(),
            self.cfg.instance_name
        ))
        .await?;

        sleep(Duration::from_secs(1)).await;
        run_shell(&format!(
            "{} runapp --name {} --packagename {}",
            self.console(),
            self.cfg.instance_name,
            self.cfg.app_package
        ))
        .await
    }

    async fn kill_app(&self) -> Result<(), RuntimeError> {
        run_shell(&format!(
            "{} killapp --name {} --packagename {}",
            self.console(),
            self.cfg.instance_name,
            self.cfg.app_package
        ))
        .await
    }

    async fn start_environment(&self) -> Result<(), RuntimeError> {
        run_shell(&format!(
            "{} launch --name {}",
            self.console(),
            self.cfg.instance_name
        ))
        .await?;

        // The guest OS needs time to boot before adb can reach it.
        sleep(Duration::from_secs(self.cfg.boot_wait_secs)).await;

        match self.run_setup().await {
            Ok(()) | Err(RuntimeError::NotConfigured(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn kill_environment(&self) -> Result<(), RuntimeError> {
        run_shell(&format!(
            "{} quit --name {}",
            self.console(),
            self.cfg.instance_name
        ))
        .await
    }

    async fn minimize(&self) -> Result<(), RuntimeError> {
        run_shell(&format!(
            "{} window --name {} --action minimize",
            self.console(),
            self.cfg.instance_name
        ))
        .await
    }

    async fn restore(&self) -> Result<(), RuntimeError> {
        run_shell(&format!(
            "{} window --name {} --action restore",
            self.console(),
            self.cfg.instance_name
        ))
        .await
    }

    async fn run_setup(&self) -> Result<(), RuntimeError> {
        let template = self
            .cfg
            .setup_command
            .as_deref()
            .ok_or(RuntimeError::NotConfigured("setup"))?;

        for device in &self.cfg.device_names {
            info!(runtime = %self.label, %device, "starting service");
            let command = format!(
                "{} -s {} shell {}",
                self.cfg.adb_path,
                device,
                self.expand(template)
            );
            // One bad device must not stop setup of the rest.
            if let Err(e) = run_shell(&command).await {
                warn!(runtime = %self.label, %device, error = %e, "service setup failed");
            }
        }

        Ok(())
    }

    async fn run_post_start(&self) -> Result<(), RuntimeError> {
        let template = self
            .cfg
            .post_start_command
            .as_deref()
            .ok_or(RuntimeError::NotConfigured("post-start"))?;

        let command = self.expand(template);
        info!(runtime = %self.label, %command, "running post-start command");
        run_shell(&command).await
    }

    async fn set_parameter(&self, name: &str, value: &str) -> Result<(), RuntimeError> {
        run_shell(&format!(
            "{} setting --name {} --key {} --value {}",
            self.console(),
            self.cfg.instance_name,
            name,
            value
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ConsoleRuntimeConfig {
        ConsoleRuntimeConfig {
            label: None,
            console_path: "/opt/emu/console".to_string(),
            adb_path: "/opt/emu/adb".to_string(),
            instance_name: "emu-1".to_string(),
            app_package: "com.example.app".to_string(),
            device_names: vec!["emulator-5554".to_string()],
            boot_wait_secs: 20,
            setup_command: Some("svc start --package <package>".to_string()),
            post_start_command: None,
        }
    }

    #[test]
    fn default_label_includes_instance_name() {
        let runtime = ConsoleRuntime::new(config());
        assert_eq!(runtime.label(), "console:emu-1");
    }

    #[test]
    fn expand_substitutes_all_placeholders() {
        let runtime = ConsoleRuntime::new(config());
        let expanded = runtime.expand("<console_path> <adb_path> <instance> <package>");
        assert_eq!(expanded, "/opt/emu/console /opt/emu/adb emu-1 com.example.app");
    }

    #[tokio::test]
    async fn post_start_without_template_is_not_configured() {
        let runtime = ConsoleRuntime::new(config());
        let err = runtime.run_post_start().await.unwrap_err();
        assert!(matches!(err, RuntimeError::NotConfigured("post-start")));
    }
}
