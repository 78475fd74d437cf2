//! Three-tier whitelisting-rule resolution.
//!
//! Given the rules of a verified container and a target
//! `(blockchain, network)`, the resolver picks the single applicable rule:
//!
//! 1. exact currency and network match (case-sensitive),
//! 2. currency match with a wildcard network,
//! 3. a global default whose currency is wildcard.
//!
//! First hit wins across tiers; within a tier the first rule in wire order
//! wins. Wildcards were canonicalized to `None` at decode time
//! ([`crate::rules`]), so matching here is plain `Option` comparison.

use crate::rules::{AddressRule, ContractRule};

/// Pick the applicable address whitelisting rule for `(blockchain, network)`.
pub fn resolve_address_rule<'a>(
    rules: &'a [AddressRule],
    blockchain: &str,
    network: &str,
) -> Option<&'a AddressRule> {
    resolve(rules, blockchain, network, |rule| {
        (rule.currency.as_deref(), rule.network.as_deref())
    })
}

/// Pick the applicable contract-address whitelisting rule for
/// `(blockchain, network)`. Identical tiers; the first field is named
/// `blockchain` on this rule family.
pub fn resolve_contract_rule<'a>(
    rules: &'a [ContractRule],
    blockchain: &str,
    network: &str,
) -> Option<&'a ContractRule> {
    resolve(rules, blockchain, network, |rule| {
        (rule.blockchain.as_deref(), rule.network.as_deref())
    })
}

fn resolve<'a, R>(
    rules: &'a [R],
    blockchain: &str,
    network: &str,
    target: impl Fn(&R) -> (Option<&str>, Option<&str>),
) -> Option<&'a R> {
    let exact = rules
        .iter()
        .find(|rule| target(rule) == (Some(blockchain), Some(network)));
    if exact.is_some() {
        return exact;
    }
    let chain_wide = rules
        .iter()
        .find(|rule| target(rule) == (Some(blockchain), None));
    if chain_wide.is_some() {
        return chain_wide;
    }
    rules.iter().find(|rule| target(rule).0.is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{GroupThreshold, SequentialThresholds};

    fn address_rule(currency: Option<&str>, network: Option<&str>, marker: u32) -> AddressRule {
        AddressRule {
            currency: currency.map(str::to_owned),
            network: network.map(str::to_owned),
            parallel_thresholds: vec![SequentialThresholds {
                steps: vec![GroupThreshold {
                    group_id: format!("g{marker}"),
                    minimum_signatures: marker,
                }],
            }],
            lines: vec![],
            include_network_in_payload: false,
        }
    }

    fn marker(rule: &AddressRule) -> u32 {
        rule.parallel_thresholds[0].steps[0].minimum_signatures
    }

    #[test]
    fn three_tier_priority() {
        let rules = vec![
            address_rule(Some("ETH"), Some("mainnet"), 1),
            address_rule(Some("ETH"), None, 2),
            address_rule(None, None, 3),
        ];
        let hit = resolve_address_rule(&rules, "ETH", "mainnet").unwrap();
        assert_eq!(marker(hit), 1);
        let hit = resolve_address_rule(&rules, "ETH", "testnet").unwrap();
        assert_eq!(marker(hit), 2);
        let hit = resolve_address_rule(&rules, "BTC", "mainnet").unwrap();
        assert_eq!(marker(hit), 3);
    }

    #[test]
    fn no_rule_when_nothing_matches() {
        let rules = vec![address_rule(Some("ETH"), Some("mainnet"), 1)];
        assert!(resolve_address_rule(&rules, "BTC", "mainnet").is_none());
        assert!(resolve_address_rule(&rules, "ETH", "testnet").is_none());
    }

    #[test]
    fn exact_match_beats_earlier_wildcards() {
        // A global default listed first must still lose to an exact match.
        let rules = vec![
            address_rule(None, None, 3),
            address_rule(Some("ETH"), None, 2),
            address_rule(Some("ETH"), Some("mainnet"), 1),
        ];
        let hit = resolve_address_rule(&rules, "ETH", "mainnet").unwrap();
        assert_eq!(marker(hit), 1);
    }

    #[test]
    fn first_in_list_wins_within_a_tier() {
        let rules = vec![
            address_rule(Some("ETH"), Some("mainnet"), 1),
            address_rule(Some("ETH"), Some("mainnet"), 2),
        ];
        let hit = resolve_address_rule(&rules, "ETH", "mainnet").unwrap();
        assert_eq!(marker(hit), 1);
    }

    #[test]
    fn network_is_case_sensitive_in_exact_tier() {
        let rules = vec![
            address_rule(Some("ETH"), Some("Mainnet"), 1),
            address_rule(Some("ETH"), None, 2),
        ];
        // "mainnet" != "Mainnet", so the chain-wide tier applies.
        let hit = resolve_address_rule(&rules, "ETH", "mainnet").unwrap();
        assert_eq!(marker(hit), 2);
    }

    #[test]
    fn contract_rules_resolve_identically() {
        let rules = vec![
            ContractRule {
                blockchain: Some("ETH".into()),
                network: Some("mainnet".into()),
                parallel_thresholds: vec![],
            },
            ContractRule {
                blockchain: Some("ETH".into()),
                network: None,
                parallel_thresholds: vec![],
            },
            ContractRule {
                blockchain: None,
                network: None,
                parallel_thresholds: vec![],
            },
        ];
        let hit = resolve_contract_rule(&rules, "ETH", "goerli").unwrap();
        assert_eq!(hit.network, None);
        assert_eq!(hit.blockchain.as_deref(), Some("ETH"));
        let hit = resolve_contract_rule(&rules, "XTZ", "mainnet").unwrap();
        assert_eq!(hit.blockchain, None);
    }
}
