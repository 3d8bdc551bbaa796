//! API-key constraint evaluator
//!
//! Decides allow/deny for a `(key constraints, request envelope)` pair.
//! Predicates are evaluated in a fixed order and the first failure names
//! the denial; an absent predicate passes vacuously. Entries are parsed
//! and compiled once per key resolution, so request-path evaluation is
//! pure matching.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use regex::Regex;
use tracing::warn;

use crate::domain::ApiKeyConstraints;

pub const CONSTRAINT_EXPIRATION: &str = "expirationDate";
pub const CONSTRAINT_ENVIRONMENTS: &str = "allowedEnvironments";
pub const CONSTRAINT_IP: &str = "ipRestrictions";
pub const CONSTRAINT_REFERER: &str = "refererRestrictions";
pub const CONSTRAINT_ORIGIN: &str = "originRestrictions";
pub const CONSTRAINT_USER_AGENT: &str = "userAgentRestrictions";

/// The slice of a request the evaluator sees
#[derive(Debug, Clone, Default)]
pub struct RequestEnvelope<'a> {
    pub client_ip: Option<IpAddr>,
    pub referer: Option<&'a str>,
    pub origin: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub environment: &'a str,
}

/// A parsed IP allowlist entry: literal address or CIDR block
#[derive(Debug, Clone)]
enum IpRule {
    Literal(IpAddr),
    Block(IpNetwork),
}

impl IpRule {
    fn matches(&self, ip: IpAddr) -> bool {
        match self {
            IpRule::Literal(addr) => *addr == ip,
            IpRule::Block(net) => net.contains(ip),
        }
    }
}

/// Constraints with all entries parsed into matchable form.
///
/// Compiled once when a key is resolved and cached with it; malformed
/// entries are dropped at compile time (they can never match, so a list
/// of only malformed entries denies everything).
#[derive(Debug, Default)]
pub struct CompiledConstraints {
    expiration_date: Option<DateTime<Utc>>,
    allowed_environments: Option<Vec<String>>,
    ip_rules: Option<Vec<IpRule>>,
    referer_globs: Option<Vec<Regex>>,
    origin_globs: Option<Vec<Regex>>,
    user_agent_patterns: Option<Vec<Regex>>,
}

impl CompiledConstraints {
    pub fn compile(constraints: &ApiKeyConstraints) -> Self {
        CompiledConstraints {
            expiration_date: constraints.expiration_date,
            allowed_environments: constraints.allowed_environments.clone(),
            ip_rules: constraints
                .ip_restrictions
                .as_ref()
                .map(|r| parse_ip_rules(&r.allowed_ips)),
            referer_globs: constraints
                .referer_restrictions
                .as_ref()
                .map(|r| compile_globs(&r.allowed_referers)),
            origin_globs: constraints
                .origin_restrictions
                .as_ref()
                .map(|r| compile_globs(&r.allowed_origins)),
            user_agent_patterns: constraints
                .user_agent_restrictions
                .as_ref()
                .map(|r| compile_patterns(&r.allowed_patterns)),
        }
    }

    /// Evaluate the envelope; `Err` carries the first failing predicate's
    /// name.
    pub fn evaluate(
        &self,
        envelope: &RequestEnvelope<'_>,
        now: DateTime<Utc>,
    ) -> Result<(), &'static str> {
        if let Some(expires) = self.expiration_date {
            if now > expires {
                return Err(CONSTRAINT_EXPIRATION);
            }
        }

        if let Some(environments) = &self.allowed_environments {
            if !environments.iter().any(|e| e == envelope.environment) {
                return Err(CONSTRAINT_ENVIRONMENTS);
            }
        }

        if let Some(rules) = &self.ip_rules {
            let allowed = match envelope.client_ip {
                Some(ip) => rules.iter().any(|r| r.matches(ip)),
                None => false,
            };
            if !allowed {
                return Err(CONSTRAINT_IP);
            }
        }

        if let Some(globs) = &self.referer_globs {
            if !header_matches(envelope.referer, globs) {
                return Err(CONSTRAINT_REFERER);
            }
        }

        if let Some(globs) = &self.origin_globs {
            if !header_matches(envelope.origin, globs) {
                return Err(CONSTRAINT_ORIGIN);
            }
        }

        if let Some(patterns) = &self.user_agent_patterns {
            if !header_matches(envelope.user_agent, patterns) {
                return Err(CONSTRAINT_USER_AGENT);
            }
        }

        Ok(())
    }
}

fn header_matches(value: Option<&str>, patterns: &[Regex]) -> bool {
    match value {
        Some(v) => patterns.iter().any(|p| p.is_match(v)),
        None => false,
    }
}

fn parse_ip_rules(entries: &[String]) -> Vec<IpRule> {
    entries
        .iter()
        .filter_map(|entry| {
            let entry = entry.trim();
            if let Ok(net) = entry.parse::<IpNetwork>() {
                // IpNetwork also parses bare addresses; keep literals exact.
                if entry.contains('/') {
                    return Some(IpRule::Block(net));
                }
            }
            match entry.parse::<IpAddr>() {
                Ok(addr) => Some(IpRule::Literal(addr)),
                Err(_) => {
                    warn!(entry = %entry, "dropping malformed IP allowlist entry");
                    None
                }
            }
        })
        .collect()
}

/// Compile a `*` glob into an anchored, case-insensitive regex.
fn glob_to_regex(glob: &str) -> Option<Regex> {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push_str("(?i)^");
    for (i, segment) in glob.split('*').enumerate() {
        if i > 0 {
            pattern.push_str(".*");
        }
        pattern.push_str(&regex::escape(segment));
    }
    pattern.push('$');
    Regex::new(&pattern).ok()
}

fn compile_globs(globs: &[String]) -> Vec<Regex> {
    globs
        .iter()
        .filter_map(|g| {
            let compiled = glob_to_regex(g);
            if compiled.is_none() {
                warn!(glob = %g, "dropping uncompilable allowlist glob");
            }
            compiled
        })
        .collect()
}

fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(pattern = %p, error = %e, "dropping invalid user-agent pattern");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::project::{
        IpRestrictions, OriginRestrictions, RefererRestrictions, UserAgentRestrictions,
    };
    use chrono::Duration;

    fn envelope<'a>() -> RequestEnvelope<'a> {
        RequestEnvelope {
            client_ip: Some("192.168.1.150".parse().unwrap()),
            referer: Some("https://app.example.com/dashboard"),
            origin: Some("https://app.example.com"),
            user_agent: Some("acme-logger/2.1"),
            environment: "production",
        }
    }

    fn with_ips(ips: &[&str]) -> CompiledConstraints {
        CompiledConstraints::compile(&ApiKeyConstraints {
            ip_restrictions: Some(IpRestrictions {
                allowed_ips: ips.iter().map(|s| s.to_string()).collect(),
            }),
            ..Default::default()
        })
    }

    #[test]
    fn empty_constraints_accept_every_envelope() {
        let compiled = CompiledConstraints::compile(&ApiKeyConstraints::default());
        assert_eq!(compiled.evaluate(&envelope(), Utc::now()), Ok(()));
        assert_eq!(
            compiled.evaluate(&RequestEnvelope::default(), Utc::now()),
            Ok(())
        );
    }

    #[test]
    fn cidr_block_accepts_member_addresses() {
        let compiled = with_ips(&["192.168.1.0/24"]);
        assert_eq!(compiled.evaluate(&envelope(), Utc::now()), Ok(()));
    }

    #[test]
    fn cidr_block_rejects_outside_addresses() {
        let compiled = with_ips(&["192.168.1.0/24"]);
        let mut env = envelope();
        env.client_ip = Some("192.168.2.1".parse().unwrap());
        assert_eq!(compiled.evaluate(&env, Utc::now()), Err(CONSTRAINT_IP));
    }

    #[test]
    fn literal_addresses_match_exactly() {
        let compiled = with_ips(&["10.0.0.7"]);
        let mut env = envelope();
        env.client_ip = Some("10.0.0.7".parse().unwrap());
        assert_eq!(compiled.evaluate(&env, Utc::now()), Ok(()));
        env.client_ip = Some("10.0.0.8".parse().unwrap());
        assert_eq!(compiled.evaluate(&env, Utc::now()), Err(CONSTRAINT_IP));
    }

    #[test]
    fn ipv6_literals_and_blocks_are_supported() {
        let compiled = with_ips(&["2001:db8::/32", "::1"]);
        let mut env = envelope();
        env.client_ip = Some("2001:db8::beef".parse().unwrap());
        assert_eq!(compiled.evaluate(&env, Utc::now()), Ok(()));
        env.client_ip = Some("::1".parse().unwrap());
        assert_eq!(compiled.evaluate(&env, Utc::now()), Ok(()));
        env.client_ip = Some("2002::1".parse().unwrap());
        assert_eq!(compiled.evaluate(&env, Utc::now()), Err(CONSTRAINT_IP));
    }

    #[test]
    fn malformed_entries_fail_closed() {
        let compiled = with_ips(&["not-an-ip", "999.0.0.0/8"]);
        assert_eq!(compiled.evaluate(&envelope(), Utc::now()), Err(CONSTRAINT_IP));
    }

    #[test]
    fn missing_client_ip_fails_the_ip_predicate() {
        let compiled = with_ips(&["192.168.1.0/24"]);
        let mut env = envelope();
        env.client_ip = None;
        assert_eq!(compiled.evaluate(&env, Utc::now()), Err(CONSTRAINT_IP));
    }

    #[test]
    fn expired_key_is_denied_first() {
        let compiled = CompiledConstraints::compile(&ApiKeyConstraints {
            expiration_date: Some(Utc::now() - Duration::days(1)),
            ip_restrictions: Some(IpRestrictions {
                allowed_ips: vec!["192.168.1.0/24".into()],
            }),
            ..Default::default()
        });
        assert_eq!(
            compiled.evaluate(&envelope(), Utc::now()),
            Err(CONSTRAINT_EXPIRATION)
        );
    }

    #[test]
    fn environment_failure_precedes_ip_failure() {
        // Both predicates present, IP passes, environment does not: the
        // reported constraint is the environment one.
        let compiled = CompiledConstraints::compile(&ApiKeyConstraints {
            allowed_environments: Some(vec!["production".into()]),
            ip_restrictions: Some(IpRestrictions {
                allowed_ips: vec!["192.168.1.0/24".into()],
            }),
            ..Default::default()
        });
        let mut env = envelope();
        env.environment = "development";
        assert_eq!(
            compiled.evaluate(&env, Utc::now()),
            Err(CONSTRAINT_ENVIRONMENTS)
        );
    }

    #[test]
    fn referer_glob_matches_and_requires_header() {
        let compiled = CompiledConstraints::compile(&ApiKeyConstraints {
            referer_restrictions: Some(RefererRestrictions {
                allowed_referers: vec!["https://*.example.com/*".into()],
            }),
            ..Default::default()
        });
        assert_eq!(compiled.evaluate(&envelope(), Utc::now()), Ok(()));

        let mut env = envelope();
        env.referer = Some("https://evil.test/phish");
        assert_eq!(compiled.evaluate(&env, Utc::now()), Err(CONSTRAINT_REFERER));

        env.referer = None;
        assert_eq!(compiled.evaluate(&env, Utc::now()), Err(CONSTRAINT_REFERER));
    }

    #[test]
    fn glob_is_case_insensitive_and_anchored() {
        let compiled = CompiledConstraints::compile(&ApiKeyConstraints {
            origin_restrictions: Some(OriginRestrictions {
                allowed_origins: vec!["https://app.example.com".into()],
            }),
            ..Default::default()
        });
        let mut env = envelope();
        env.origin = Some("HTTPS://APP.EXAMPLE.COM");
        assert_eq!(compiled.evaluate(&env, Utc::now()), Ok(()));

        // A prefix match is not enough; the glob is anchored.
        env.origin = Some("https://app.example.com.evil.test");
        assert_eq!(compiled.evaluate(&env, Utc::now()), Err(CONSTRAINT_ORIGIN));
    }

    #[test]
    fn user_agent_patterns_are_regular_expressions() {
        let compiled = CompiledConstraints::compile(&ApiKeyConstraints {
            user_agent_restrictions: Some(UserAgentRestrictions {
                allowed_patterns: vec![r"^acme-logger/\d+\.\d+$".into()],
            }),
            ..Default::default()
        });
        assert_eq!(compiled.evaluate(&envelope(), Utc::now()), Ok(()));

        let mut env = envelope();
        env.user_agent = Some("curl/8.0");
        assert_eq!(
            compiled.evaluate(&env, Utc::now()),
            Err(CONSTRAINT_USER_AGENT)
        );
    }
}
