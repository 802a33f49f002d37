use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Operation applied to a single rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleOp {
    Append,
    Insert,
    Delete,
}

impl RuleOp {
    pub fn flag(&self) -> &'static str {
        match self {
            RuleOp::Append => "-A",
            RuleOp::Insert => "-I",
            RuleOp::Delete => "-D",
        }
    }
}

/// A chain descriptor. Identity is `(table, name)`; `parent` records which
/// chain jumps into it, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSpec {
    pub table: Table,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl ChainSpec {
    pub fn new(table: Table, name: impl Into<String>) -> Self {
        Self {
            table,
            name: name.into(),
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn same_identity(a: &ChainSpec, b: &ChainSpec) -> bool {
        a.table == b.table && a.name == b.name
    }
}

impl PartialEq for ChainSpec {
    fn eq(&self, other: &Self) -> bool {
        Self::same_identity(self, other)
    }
}

impl Eq for ChainSpec {}

impl Hash for ChainSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.hash(state);
        self.name.hash(state);
    }
}

/// A rule descriptor. Equality is structural over every field, `order`
/// included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<RuleOp>,
    pub table: Table,
    pub chain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jump: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_dest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl RuleSpec {
    pub fn new(table: Table, chain: impl Into<String>) -> Self {
        Self {
            table,
            chain: chain.into(),
            ..Default::default()
        }
    }

    pub fn with_order(mut self, order: RuleOp) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_jump(mut self, jump: impl Into<String>) -> Self {
        self.jump = Some(jump.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_dest(mut self, dest: impl Into<String>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Directive used when installing this rule.
    pub fn install_op(&self) -> RuleOp {
        self.order.unwrap_or(RuleOp::Append)
    }

    /// Looser identity that ignores the directive order.
    pub fn same_ignoring_order(a: &RuleSpec, b: &RuleSpec) -> bool {
        a.table == b.table
            && a.chain == b.chain
            && a.source == b.source
            && a.dest == b.dest
            && a.jump == b.jump
            && a.to_source == b.to_source
            && a.to_dest == b.to_dest
            && a.comment == b.comment
            && a.proto == b.proto
            && a.match_module == b.match_module
            && a.dst_port == b.dst_port
            && a.src_port == b.src_port
            && a.input == b.input
            && a.output == b.output
    }

    /// Match and target arguments in iptables syntax, without table, op or chain.
    pub fn spec_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        push_opt(&mut args, "-s", &self.source);
        push_opt(&mut args, "-d", &self.dest);
        push_opt(&mut args, "-p", &self.proto);
        push_opt(&mut args, "-m", &self.match_module);
        push_opt(&mut args, "--dport", &self.dst_port);
        push_opt(&mut args, "--sport", &self.src_port);
        push_opt(&mut args, "-i", &self.input);
        push_opt(&mut args, "-o", &self.output);
        if let Some(comment) = &self.comment {
            args.extend(["-m", "comment", "--comment"].map(String::from));
            args.push(comment.clone());
        }
        push_opt(&mut args, "-j", &self.jump);
        push_opt(&mut args, "--to-source", &self.to_source);
        push_opt(&mut args, "--to-destination", &self.to_dest);

        args
    }
}

fn push_opt(args: &mut Vec<String>, flag: &str, value: &Option<String>) {
    if let Some(value) = value {
        args.push(flag.to_string());
        args.push(value.clone());
    }
}

/// One unit of work for an executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    CreateChain(ChainSpec),
    DestroyChain(ChainSpec),
    Rule(RuleOp, RuleSpec),
}

impl Directive {
    pub fn table(&self) -> Table {
        match self {
            Directive::CreateChain(c) | Directive::DestroyChain(c) => c.table,
            Directive::Rule(_, r) => r.table,
        }
    }

    /// Full iptables argument vector, e.g. `-t nat -N FENCE_pre`.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["-t".to_string(), self.table().as_str().to_string()];
        match self {
            Directive::CreateChain(chain) => {
                args.push("-N".into());
                args.push(chain.name.clone());
            }
            Directive::DestroyChain(chain) => {
                args.push("-X".into());
                args.push(chain.name.clone());
            }
            Directive::Rule(op, rule) => {
                args.push(op.flag().into());
                args.push(rule.chain.clone());
                args.extend(rule.spec_args());
            }
        }
        args
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args().join(" "))
    }
}
