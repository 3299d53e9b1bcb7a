//! LB-config text file parser (§6, §10.3): `[%] <PHASE_OR_MOD> <LB_NAME> [k=v]*`.

use std::collections::BTreeMap;

use super::{LbError, STRATEGY_NAMES};
use crate::types::Phase;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Match {
    Exact(Phase),
    /// Modular match: run on every phase where `phase % modulus == 0`.
    Modular(Phase),
}

/// One parsed line of the LB config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    matcher: Match,
    pub strategy: String,
    pub params: BTreeMap<String, String>,
}

/// Environment/flag knobs (§6 "Environment / flags").
#[derive(Debug, Clone)]
pub struct EnvKnobs {
    pub lb_file_name: Option<String>,
    pub lb_interval: Option<u64>,
    pub lb_quiet: bool,
    pub lb_self_migration: bool,
}

impl Default for EnvKnobs {
    fn default() -> Self {
        Self {
            lb_file_name: None,
            lb_interval: None,
            lb_quiet: false,
            lb_self_migration: false,
        }
    }
}

/// Parsed LB configuration: a list of directives plus the fallback
/// interval used when no file is given.
#[derive(Debug, Clone, Default)]
pub struct Config {
    directives: Vec<Directive>,
    pub knobs: EnvKnobs,
}

fn parse_directive_line(line: &str) -> Result<Directive, LbError> {
    let trimmed = line.trim();
    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.is_empty() {
        return Err(LbError::MalformedLine { line: line.to_string() });
    }

    let (matcher_tok, name_idx) = if parts[0] == "%" {
        (parts.get(1).copied(), 2)
    } else if let Some(rest) = parts[0].strip_prefix('%') {
        (Some(rest), 1)
    } else {
        (Some(parts[0]), 1)
    };

    let is_modular = parts[0] == "%" || parts[0].starts_with('%');
    let phase_str = matcher_tok.ok_or_else(|| LbError::MalformedLine { line: line.to_string() })?;
    let phase: Phase = phase_str
        .parse()
        .map_err(|_| LbError::MalformedLine { line: line.to_string() })?;
    let matcher = if is_modular { Match::Modular(phase) } else { Match::Exact(phase) };

    let strategy = parts
        .get(name_idx)
        .ok_or_else(|| LbError::MalformedLine { line: line.to_string() })?
        .to_string();
    if !STRATEGY_NAMES.contains(&strategy.as_str()) {
        return Err(LbError::UnknownStrategy { name: strategy });
    }

    let mut params = BTreeMap::new();
    for kv in &parts[name_idx + 1..] {
        let (k, v) = kv.split_once('=').ok_or_else(|| LbError::MalformedLine { line: line.to_string() })?;
        params.insert(k.to_string(), v.to_string());
    }

    Ok(Directive { matcher, strategy, params })
}

impl Config {
    pub fn parse(text: &str) -> Result<Self, LbError> {
        let mut directives = Vec::new();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            directives.push(parse_directive_line(trimmed)?);
        }
        Ok(Self {
            directives,
            knobs: EnvKnobs::default(),
        })
    }

    pub fn with_knobs(mut self, knobs: EnvKnobs) -> Self {
        self.knobs = knobs;
        self
    }

    /// Resolve which directive governs `phase` (§6 precedence rule, §9 open
    /// question decided): an exact match always wins; among modular
    /// matches, the *largest* modulus wins — the more restrictive, rarer-
    /// firing match is treated as the more specific one (the scenario in
    /// §8 S6 is the ground truth here: phase 10 matching both `%2` and
    /// `%10` resolves to the `%10` directive).
    pub fn resolve(&self, phase: Phase) -> Option<&Directive> {
        if let Some(exact) = self
            .directives
            .iter()
            .find(|d| matches!(d.matcher, Match::Exact(p) if p == phase))
        {
            return Some(exact);
        }
        self.directives
            .iter()
            .filter_map(|d| match d.matcher {
                Match::Modular(modulus) if modulus > 0 && phase % modulus == 0 => Some((modulus, d)),
                _ => None,
            })
            .max_by_key(|&(modulus, _)| modulus)
            .map(|(_, d)| d)
    }

    /// Fallback selection when no directive matches `phase`: the
    /// `lb_interval` env knob acts as an implicit `% lb_interval RotateLB`-
    /// style modulus, per §6.
    pub fn fallback_applies(&self, phase: Phase) -> bool {
        self.knobs
            .lb_interval
            .map(|interval| interval > 0 && phase % interval == 0)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S6: &str = "% 10 GreedyLB\n5 RotateLB\n% 2 TemperedLB\n";

    #[test]
    fn exact_match_wins_over_modular() {
        let cfg = Config::parse(S6).unwrap();
        assert_eq!(cfg.resolve(5).unwrap().strategy, "RotateLB");
    }

    #[test]
    fn largest_modulus_wins_among_modular_matches() {
        let cfg = Config::parse(S6).unwrap();
        assert_eq!(cfg.resolve(2).unwrap().strategy, "TemperedLB");
        assert_eq!(cfg.resolve(4).unwrap().strategy, "TemperedLB");
        assert_eq!(cfg.resolve(10).unwrap().strategy, "GreedyLB");
        assert_eq!(cfg.resolve(6).unwrap().strategy, "TemperedLB");
    }

    #[test]
    fn unknown_strategy_name_is_rejected() {
        let err = Config::parse("1 NotAStrategy").unwrap_err();
        assert!(matches!(err, LbError::UnknownStrategy { .. }));
    }

    #[test]
    fn keyword_args_are_parsed() {
        let cfg = Config::parse("1 GreedyLB tolerance=0.1").unwrap();
        let d = cfg.resolve(1).unwrap();
        assert_eq!(d.params.get("tolerance"), Some(&"0.1".to_string()));
    }
}
