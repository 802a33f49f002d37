use anyhow::{Context, Result};
use fp_core::{ENTRY_PREFIX, Table};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// One application-owned chain as currently listed by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStatus {
    pub table: Table,
    pub name: String,
    pub rules: usize,
}

pub struct ChainStatusCollector {
    program: String,
}

impl ChainStatusCollector {
    pub fn new() -> Self {
        Self {
            program: "iptables".to_string(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub async fn collect(&self) -> Result<Vec<ChainStatus>> {
        let mut chains = vec![];
        for table in Table::ALL {
            chains.extend(self.collect_table(table).await?);
        }
        Ok(chains)
    }

    pub async fn collect_table(&self, table: Table) -> Result<Vec<ChainStatus>> {
        let output = Command::new(&self.program)
            .arg("-w")
            .arg("-t")
            .arg(table.as_str())
            .arg("-S")
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.program))?;

        if !output.status.success() {
            return Ok(vec![]);
        }

        parse_listing(table, &String::from_utf8_lossy(&output.stdout))
    }
}

impl Default for ChainStatusCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses `iptables -S` output into the chains carrying the entry prefix,
/// counting the rules appended to each.
pub fn parse_listing(table: Table, listing: &str) -> Result<Vec<ChainStatus>> {
    let chain_re = Regex::new(&format!(r"^-N ({}\S*)$", regex::escape(ENTRY_PREFIX)))?;
    let rule_re = Regex::new(r"^-A (\S+)")?;

    let mut chains: Vec<ChainStatus> = vec![];
    for line in listing.lines().map(str::trim) {
        if let Some(caps) = chain_re.captures(line) {
            chains.push(ChainStatus {
                table,
                name: caps[1].to_string(),
                rules: 0,
            });
        } else if let Some(caps) = rule_re.captures(line) {
            if let Some(chain) = chains.iter_mut().find(|c| c.name == caps[1]) {
                chain.rules += 1;
            }
        }
    }

    Ok(chains)
}
