//! External command execution shared by the queue driver and the process probe.

use async_trait::async_trait;
use tracing::debug;

/// Exit state plus stdout and stderr merged, as the print cmdlets report errors on either.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub combined: String,
}

impl CommandOutput {
    pub fn trimmed(&self) -> &str {
        self.combined.trim()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;
}

/// Runs commands as real child processes, without a console window on Windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args).kill_on_drop(true);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let output = cmd.output().await?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        debug!(
            "{} exited with {:?} ({} bytes of output)",
            program,
            output.status.code(),
            combined.len()
        );

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            combined,
        })
    }
}

/// Arguments for a non-interactive PowerShell invocation of `script`.
pub fn powershell_args(script: &str) -> Vec<String> {
    vec![
        "-NoProfile".to_string(),
        "-NonInteractive".to_string(),
        "-Command".to_string(),
        script.to_string(),
    ]
}

/// Single-quoted PowerShell literal; embedded quotes are doubled.
pub fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ps_quote_escapes_single_quotes() {
        assert_eq!(ps_quote("A5"), "'A5'");
        assert_eq!(ps_quote("Dr's Office"), "'Dr''s Office'");
    }

    #[test]
    fn test_powershell_args_keep_script_as_one_argument() {
        let args = powershell_args("Get-Printer -Name 'A5'");
        assert_eq!(args.len(), 4);
        assert_eq!(args[2], "-Command");
        assert_eq!(args[3], "Get-Printer -Name 'A5'");
    }

    #[test]
    fn test_trimmed_output() {
        let out = CommandOutput {
            success: true,
            code: Some(0),
            combined: "\r\n[]\r\n".to_string(),
        };
        assert_eq!(out.trimmed(), "[]");
    }
}
