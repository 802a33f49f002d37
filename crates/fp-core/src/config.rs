use crate::rule::RuleSpec;
use crate::table::{Hook, Table};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirewallConfig {
    /// Custom rules staged into the global controller, in order.
    #[serde(default)]
    pub flows: Vec<FlowRule>,
    #[serde(default)]
    pub consumers: Vec<ConsumerConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowRule {
    pub table: Table,
    #[serde(default)]
    pub chain: String,
    pub source: Option<String>,
    pub dest: Option<String>,
    pub jump: Option<String>,
    pub to_source: Option<String>,
    pub to_dest: Option<String>,
    pub comment: Option<String>,
    pub proto: Option<String>,
    #[serde(rename = "match")]
    pub match_module: Option<String>,
    pub dst_port: Option<String>,
    pub src_port: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
}

/// Rules for one consumer's private sub-chains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<HookRule>,
}

/// A consumer rule. Its `chain` is ignored: the sub-chain for `hook` decides
/// where it lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookRule {
    pub hook: Hook,
    #[serde(flatten)]
    pub rule: FlowRule,
}

impl From<&FlowRule> for RuleSpec {
    fn from(flow: &FlowRule) -> Self {
        RuleSpec {
            order: None,
            table: flow.table,
            chain: flow.chain.clone(),
            source: flow.source.clone(),
            dest: flow.dest.clone(),
            jump: flow.jump.clone(),
            to_source: flow.to_source.clone(),
            to_dest: flow.to_dest.clone(),
            comment: flow.comment.clone(),
            proto: flow.proto.clone(),
            match_module: flow.match_module.clone(),
            dst_port: flow.dst_port.clone(),
            src_port: flow.src_port.clone(),
            input: flow.input.clone(),
            output: flow.output.clone(),
        }
    }
}

impl FirewallConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FirewallConfig =
            serde_yaml::from_str(yaml).context("Failed to parse firewall config YAML")?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read firewall config from {:?}", path))?;
        Self::from_yaml(&content)
    }

    /// Custom rules as rule descriptors, in file order.
    pub fn rule_specs(&self) -> Vec<RuleSpec> {
        self.flows.iter().map(RuleSpec::from).collect()
    }
}
