use fp_core::error::Result;
use fp_core::{Directive, Executor, FirewallError};
use std::process::Command;

/// Runs each directive as one `iptables` invocation.
pub struct IptablesExecutor {
    program: String,
    dry_run: bool,
}

impl IptablesExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self {
            program: "iptables".to_string(),
            dry_run,
        }
    }

    /// Use another binary, e.g. `ip6tables` or `iptables-legacy`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the binary. `-w` waits for the xtables lock
    /// instead of failing when another process holds it.
    pub fn command_args(&self, directive: &Directive) -> Vec<String> {
        let mut args = vec!["-w".to_string()];
        args.extend(directive.args());
        args
    }

    fn run(&self, args: &[String]) -> Result<std::process::Output> {
        Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| FirewallError::Spawn {
                program: self.program.clone(),
                source,
            })
    }
}

impl Executor for IptablesExecutor {
    fn init(&self) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }

        let output = self.run(&["--version".to_string()])?;
        if !output.status.success() {
            return Err(FirewallError::Exec {
                directive: format!("{} --version", self.program),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tracing::debug!(
            version = %String::from_utf8_lossy(&output.stdout).trim(),
            "iptables available"
        );
        Ok(())
    }

    fn apply(&self, directive: &Directive) -> Result<()> {
        let args = self.command_args(directive);

        if self.dry_run {
            tracing::info!("[DRY RUN] {} {}", self.program, args.join(" "));
            return Ok(());
        }

        tracing::debug!("{} {}", self.program, args.join(" "));
        let output = self.run(&args)?;
        if !output.status.success() {
            return Err(FirewallError::Exec {
                directive: directive.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}
