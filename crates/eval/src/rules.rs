//! The hard-coded rule families.
//!
//! Three check families are authoritative: protected governance paths
//! (constitution section I.2), forbidden shell commands (section II), and
//! unproxied network access (section II). The constitution document itself
//! is operator context; these tables are what the evaluator enforces.

use std::sync::LazyLock;

use regex::Regex;

/// Action types that execute through a shell.
pub(crate) const SHELL_ACTION_TYPES: [&str; 5] = ["bash", "shell", "command", "exec", "terminal"];

/// Action types that mutate files.
pub(crate) const FILE_ACTION_TYPES: [&str; 7] = [
    "file_write",
    "file_edit",
    "file_delete",
    "file_move",
    "write",
    "edit",
    "delete",
];

/// Paths agents may never modify. `[/\\]` keeps Unix and Windows
/// separators equivalent; matching is case-insensitive.
pub(crate) static PROTECTED_PATHS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(^|[/\\])governance[/\\]",
        r"(?i)(^|[/\\])policy[/\\]",
        r"(?i)(^|[/\\])CONSTITUTION\.md$",
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("protected path pattern"))
    .collect()
});

/// Shell patterns that are denied outright, each with its violation text.
pub(crate) static FORBIDDEN_COMMANDS: LazyLock<Vec<(Regex, &'static str)>> =
    LazyLock::new(|| {
        [
            (r"\bsudo\b", "Use of 'sudo' is prohibited (§II)"),
            (r"\bchmod\s+777\b", "chmod 777 is prohibited (§II)"),
            (
                r"\brm\s+-rf\s+/",
                "Destructive 'rm -rf /' is prohibited (§II)",
            ),
            (
                r"\brm\s+-rf\s+\*",
                "Destructive 'rm -rf *' is prohibited (§II)",
            ),
            (r"\bmkfs\b", "Filesystem format command is prohibited (§II)"),
            (
                r"\bdd\s+.+of=/dev/",
                "Raw disk write via dd is prohibited (§II)",
            ),
        ]
        .into_iter()
        .map(|(p, text)| (Regex::new(p).expect("forbidden command pattern"), text))
        .collect()
    });

/// Direct network clients that bypass the gateway.
pub(crate) static UNPROXIED_NETWORK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:curl|wget)\b").expect("unproxied network pattern"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_paths_match_segments_case_insensitively() {
        let hits = [
            "governance/identities.json",
            "repo/Governance/file.txt",
            "nested\\policy\\rules.yaml",
            "CONSTITUTION.md",
            "docs/constitution.MD",
        ];
        for path in hits {
            assert!(
                PROTECTED_PATHS.iter().any(|p| p.is_match(path)),
                "expected protected: {}",
                path
            );
        }
        let misses = ["src/governance_notes.txt", "policyholder.txt", "CONSTITUTION.md.bak"];
        for path in misses {
            assert!(
                !PROTECTED_PATHS.iter().any(|p| p.is_match(path)),
                "expected unprotected: {}",
                path
            );
        }
    }

    #[test]
    fn forbidden_commands_match_expected_shapes() {
        let hits = [
            "sudo apt install thing",
            "chmod 777 /tmp/file",
            "rm -rf /",
            "rm -rf *",
            "mkfs.ext4 /dev/sda1",
            "dd if=/dev/zero of=/dev/sda",
        ];
        for command in hits {
            assert!(
                FORBIDDEN_COMMANDS.iter().any(|(p, _)| p.is_match(command)),
                "expected forbidden: {}",
                command
            );
        }
        assert!(!FORBIDDEN_COMMANDS
            .iter()
            .any(|(p, _)| p.is_match("echo hello world")));
        assert!(!FORBIDDEN_COMMANDS
            .iter()
            .any(|(p, _)| p.is_match("rm -r build/")));
    }

    #[test]
    fn unproxied_network_matches_whole_words() {
        assert!(UNPROXIED_NETWORK.is_match("curl https://api.example.com/x"));
        assert!(UNPROXIED_NETWORK.is_match("wget http://host/file"));
        assert!(!UNPROXIED_NETWORK.is_match("echo curling is a sport"));
    }
}
