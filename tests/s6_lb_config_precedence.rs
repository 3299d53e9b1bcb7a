//! LB config precedence (§8 scenario S6): an exact-phase directive always
//! wins; among modular directives that both match, the larger modulus wins.

use vt_rt::lb::config::Config;

const CONFIG_TEXT: &str = "% 10 GreedyLB\n5 RotateLB\n% 2 TemperedLB\n";

#[test]
fn exact_phase_beats_every_modular_match() {
    let config = Config::parse(CONFIG_TEXT).unwrap();
    assert_eq!(config.resolve(5).unwrap().strategy, "RotateLB");
}

#[test]
fn among_modular_matches_the_larger_modulus_wins() {
    let config = Config::parse(CONFIG_TEXT).unwrap();
    assert_eq!(config.resolve(2).unwrap().strategy, "TemperedLB");
    assert_eq!(config.resolve(4).unwrap().strategy, "TemperedLB");
    assert_eq!(config.resolve(6).unwrap().strategy, "TemperedLB");
    assert_eq!(config.resolve(10).unwrap().strategy, "GreedyLB");
}

#[test]
fn phase_matching_nothing_resolves_to_none() {
    let config = Config::parse(CONFIG_TEXT).unwrap();
    assert!(config.resolve(3).is_none());
}
