use thiserror::Error;

/// Errors from the LB framework and config parser (§4.8, §6, §10.3).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LbError {
    /// A config line named a strategy outside
    /// `{NoLB, RotateLB, GreedyLB, HierarchicalLB, TemperedLB, OfflineLB}`.
    #[error("LB config names unknown strategy `{name}`")]
    UnknownStrategy { name: String },

    /// A `k=v` pair in the config file named a key the selected strategy
    /// doesn't accept (§7 kind 3, §10.3: reported, not panicked).
    #[error("strategy `{strategy}` does not accept config key `{key}`")]
    UnknownConfigKey { strategy: &'static str, key: String },

    /// A recognized key's value couldn't be parsed as its expected type.
    #[error("invalid value `{value}` for key `{key}` in strategy `{strategy}`")]
    InvalidConfigValue {
        strategy: &'static str,
        key: String,
        value: String,
    },

    /// A line in the LB config file didn't match `[%] <PHASE_OR_MOD> <LB_NAME> [k=v]*`.
    #[error("malformed LB config line: `{line}`")]
    MalformedLine { line: String },
}
