use super::{Analyzer, AnalyzerError, AnalyzerOutput, FileFacts};
use crate::config::NetworkConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

static ACCESS_LOG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?P<ip>\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}) \S+ \S+ \[(?P<timestamp>[^\]]+)\] "(?P<method>[A-Z]+) (?P<url>\S+)[^"]*" (?P<status>\d{3}) (?P<size>\d+|-)"#,
    )
    .expect("access log pattern")
});

static FIREWALL_LOG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"kernel: (?P<rule>[A-Za-z0-9 _-]+): IN=(?P<in_if>\S*) OUT=(?P<out_if>\S*) .*SRC=(?P<src>\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}) DST=(?P<dst>\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})",
    )
    .expect("firewall log pattern")
});

static SSH_LOG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"sshd\[\d+\]: (?P<event>Failed|Accepted) password for (?:invalid user )?(?P<user>\S+) from (?P<ip>\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})",
    )
    .expect("ssh log pattern")
});

static IP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").expect("ip pattern"));

const SQLI_MARKERS: &[&str] = &["union", "select", "drop table", "' or", "%27", "--"];
const XSS_MARKERS: &[&str] = &["<script", "javascript:", "onerror=", "alert("];
const SCANNER_AGENTS: &[&str] = &["sqlmap", "nikto", "nmap", "masscan", "dirbuster"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Access,
    Firewall,
    SshAuth,
    Generic,
}

impl LogFormat {
    fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Access => "web_access",
            LogFormat::Firewall => "firewall",
            LogFormat::SshAuth => "ssh_auth",
            LogFormat::Generic => "generic",
        }
    }
}

/// Network log analyzer. Formats are detected from the first lines, then
/// every line is parsed independently: a malformed line is a parse-skip,
/// never a failure of the whole file. Attack-shaped entries (injection
/// strings in URLs, scanner user agents, repeated auth failures from one
/// source) accumulate into the suspicious-activity list.
pub struct NetworkAnalyzer {
    config: NetworkConfig,
}

impl NetworkAnalyzer {
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }
}

impl Analyzer for NetworkAnalyzer {
    fn name(&self) -> &'static str {
        "network"
    }

    fn analyze(&self, path: &Path, _facts: &FileFacts) -> Result<AnalyzerOutput, AnalyzerError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        // Lossy decoding so a stray non-UTF-8 line becomes a parse-skip
        // instead of aborting the file.
        let mut lines = Vec::new();
        let mut raw = Vec::new();
        while lines.len() < self.config.max_lines {
            raw.clear();
            let read = reader.read_until(b'\n', &mut raw)?;
            if read == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&raw);
            lines.push(line.trim_end_matches(&['\n', '\r'][..]).to_string());
        }

        let format = detect_format(&lines);
        let output = match format {
            LogFormat::Access => self.analyze_access(&lines),
            LogFormat::Firewall => self.analyze_firewall(&lines),
            LogFormat::SshAuth => self.analyze_ssh(&lines),
            LogFormat::Generic => self.analyze_generic(&lines),
        };
        Ok(output)
    }
}

fn detect_format(lines: &[String]) -> LogFormat {
    for line in lines.iter().filter(|l| !l.trim().is_empty()).take(10) {
        if SSH_LOG.is_match(line) {
            return LogFormat::SshAuth;
        }
        if FIREWALL_LOG.is_match(line) {
            return LogFormat::Firewall;
        }
        if ACCESS_LOG.is_match(line) {
            return LogFormat::Access;
        }
    }
    LogFormat::Generic
}

impl NetworkAnalyzer {
    fn analyze_access(&self, lines: &[String]) -> AnalyzerOutput {
        let mut parse_skips = 0u64;
        let mut total_requests = 0u64;
        let mut unique_ips: HashSet<String> = HashSet::new();
        let mut status_codes: BTreeMap<String, u64> = BTreeMap::new();
        let mut methods: BTreeMap<String, u64> = BTreeMap::new();
        let mut suspicious = Vec::new();

        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let Some(caps) = ACCESS_LOG.captures(line) else {
                parse_skips += 1;
                continue;
            };
            total_requests += 1;
            let ip = caps["ip"].to_string();
            let url = caps["url"].to_string();
            unique_ips.insert(ip.clone());
            *status_codes.entry(caps["status"].to_string()).or_default() += 1;
            *methods.entry(caps["method"].to_string()).or_default() += 1;

            let url_lower = url.to_ascii_lowercase();
            if SQLI_MARKERS.iter().any(|m| url_lower.contains(m)) {
                suspicious.push(json!({
                    "kind": "sql_injection_attempt",
                    "ip": ip,
                    "url": url,
                }));
            } else if XSS_MARKERS.iter().any(|m| url_lower.contains(m)) {
                suspicious.push(json!({
                    "kind": "xss_attempt",
                    "ip": ip,
                    "url": url,
                }));
            }

            let line_lower = line.to_ascii_lowercase();
            if let Some(agent) = SCANNER_AGENTS.iter().find(|a| line_lower.contains(*a)) {
                suspicious.push(json!({
                    "kind": "scanner_user_agent",
                    "ip": ip,
                    "agent": agent,
                }));
            }
        }

        AnalyzerOutput {
            metadata: json!({
                "analyzer": "network",
                "log_format": LogFormat::Access.as_str(),
                "total_requests": total_requests,
                "unique_ips": unique_ips.len(),
                "status_codes": status_codes,
                "methods": methods,
                "suspicious_activity": suspicious,
            }),
            parse_skips,
        }
    }

    fn analyze_firewall(&self, lines: &[String]) -> AnalyzerOutput {
        let mut parse_skips = 0u64;
        let mut total_events = 0u64;
        let mut blocked_sources: BTreeMap<String, u64> = BTreeMap::new();
        let mut target_ips: BTreeMap<String, u64> = BTreeMap::new();
        let mut rules: BTreeMap<String, u64> = BTreeMap::new();

        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let Some(caps) = FIREWALL_LOG.captures(line) else {
                parse_skips += 1;
                continue;
            };
            total_events += 1;
            *blocked_sources.entry(caps["src"].to_string()).or_default() += 1;
            *target_ips.entry(caps["dst"].to_string()).or_default() += 1;
            *rules.entry(caps["rule"].trim().to_string()).or_default() += 1;
        }

        // Sources hammering the firewall above the auth threshold are worth
        // surfacing even without payload context.
        let suspicious: Vec<_> = blocked_sources
            .iter()
            .filter(|(_, &count)| count as usize >= self.config.brute_force_threshold)
            .map(|(ip, count)| {
                json!({
                    "kind": "repeated_blocked_source",
                    "ip": ip,
                    "events": count,
                })
            })
            .collect();

        AnalyzerOutput {
            metadata: json!({
                "analyzer": "network",
                "log_format": LogFormat::Firewall.as_str(),
                "total_events": total_events,
                "blocked_sources": blocked_sources,
                "target_ips": target_ips,
                "rules_triggered": rules,
                "suspicious_activity": suspicious,
            }),
            parse_skips,
        }
    }

    fn analyze_ssh(&self, lines: &[String]) -> AnalyzerOutput {
        let mut parse_skips = 0u64;
        let mut failed = 0u64;
        let mut accepted = 0u64;
        let mut failures_by_ip: BTreeMap<String, u64> = BTreeMap::new();
        let mut targeted_users: BTreeMap<String, u64> = BTreeMap::new();

        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let Some(caps) = SSH_LOG.captures(line) else {
                parse_skips += 1;
                continue;
            };
            let ip = caps["ip"].to_string();
            let user = caps["user"].to_string();
            *targeted_users.entry(user).or_default() += 1;
            match &caps["event"] {
                "Failed" => {
                    failed += 1;
                    *failures_by_ip.entry(ip).or_default() += 1;
                }
                _ => accepted += 1,
            }
        }

        let suspicious: Vec<_> = failures_by_ip
            .iter()
            .filter(|(_, &count)| count as usize >= self.config.brute_force_threshold)
            .map(|(ip, count)| {
                json!({
                    "kind": "brute_force_source",
                    "ip": ip,
                    "failed_attempts": count,
                })
            })
            .collect();

        AnalyzerOutput {
            metadata: json!({
                "analyzer": "network",
                "log_format": LogFormat::SshAuth.as_str(),
                "failed_logins": failed,
                "accepted_logins": accepted,
                "failures_by_ip": failures_by_ip,
                "targeted_users": targeted_users,
                "suspicious_activity": suspicious,
            }),
            parse_skips,
        }
    }

    /// Generic line-oriented fallback: IP inventory and alert keyword counts.
    /// Nothing here can "fail to parse"; every non-empty line contributes.
    fn analyze_generic(&self, lines: &[String]) -> AnalyzerOutput {
        const ALERT_KEYWORDS: &[&str] =
            &["error", "warning", "failed", "denied", "blocked", "attack"];

        let mut total_lines = 0u64;
        let mut ips: HashSet<String> = HashSet::new();
        let mut keywords: BTreeMap<String, u64> = BTreeMap::new();

        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            total_lines += 1;
            for m in IP_PATTERN.find_iter(line) {
                if is_valid_ipv4(m.as_str()) {
                    ips.insert(m.as_str().to_string());
                }
            }
            let lower = line.to_ascii_lowercase();
            for keyword in ALERT_KEYWORDS {
                if lower.contains(keyword) {
                    *keywords.entry(keyword.to_string()).or_default() += 1;
                }
            }
        }

        let mut sample_ips: Vec<_> = ips.iter().cloned().collect();
        sample_ips.sort();
        sample_ips.truncate(20);

        AnalyzerOutput {
            metadata: json!({
                "analyzer": "network",
                "log_format": LogFormat::Generic.as_str(),
                "total_lines": total_lines,
                "unique_ips": ips.len(),
                "sample_ips": sample_ips,
                "alert_keywords": keywords,
            }),
            parse_skips: 0,
        }
    }
}

fn is_valid_ipv4(candidate: &str) -> bool {
    candidate
        .split('.')
        .filter_map(|part| part.parse::<u32>().ok())
        .filter(|&octet| octet <= 255)
        .count()
        == 4
}
