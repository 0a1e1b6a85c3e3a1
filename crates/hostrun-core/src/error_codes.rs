//! Maps freeform script output to a categorized explanation of its exit code.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Categorized explanation attached to failed checks and task errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub category: String,
    pub error: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub code: i64,
    pub category: &'static str,
    pub error: &'static str,
    pub description: &'static str,
}

impl CatalogEntry {
    pub fn to_info(&self) -> ErrorInfo {
        ErrorInfo {
            category: self.category.to_string(),
            error: self.error.to_string(),
            description: self.description.to_string(),
        }
    }
}

pub const CATEGORY_SCRIPT: &str = "script";
pub const CATEGORY_ENVIRONMENT: &str = "environment";
pub const CATEGORY_PERMISSION: &str = "permission";
pub const CATEGORY_NETWORK: &str = "network";
pub const CATEGORY_TIMEOUT: &str = "timeout";
pub const CATEGORY_SIGNAL: &str = "signal";
pub const CATEGORY_CONNECTION: &str = "connection";
pub const CATEGORY_VERIFICATION: &str = "verification";

pub static ERROR_CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        code: 1,
        category: CATEGORY_SCRIPT,
        error: "General error",
        description: "The script reported a generic failure.",
    },
    CatalogEntry {
        code: 2,
        category: CATEGORY_SCRIPT,
        error: "Misuse of shell builtin",
        description: "Invalid arguments or syntax error in the script.",
    },
    CatalogEntry {
        code: 10,
        category: CATEGORY_NETWORK,
        error: "Service unreachable",
        description: "A service the script depends on did not answer.",
    },
    CatalogEntry {
        code: 11,
        category: CATEGORY_ENVIRONMENT,
        error: "Package missing",
        description: "A required package or binary is not installed on the host.",
    },
    CatalogEntry {
        code: 12,
        category: CATEGORY_ENVIRONMENT,
        error: "Invalid configuration",
        description: "A configuration file on the host is missing or malformed.",
    },
    CatalogEntry {
        code: 13,
        category: CATEGORY_PERMISSION,
        error: "Access denied",
        description: "The account lacks rights to read or change the checked resource.",
    },
    CatalogEntry {
        code: 14,
        category: CATEGORY_VERIFICATION,
        error: "Reference mismatch",
        description: "The observed value differs from the reference data.",
    },
    CatalogEntry {
        code: 15,
        category: CATEGORY_TIMEOUT,
        error: "Check timed out",
        description: "The script gave up waiting for the checked resource.",
    },
    CatalogEntry {
        code: 124,
        category: CATEGORY_TIMEOUT,
        error: "Command timed out",
        description: "The command exceeded its time limit and was stopped.",
    },
    CatalogEntry {
        code: 125,
        category: CATEGORY_ENVIRONMENT,
        error: "Wrapper failed",
        description: "The command wrapper itself failed before running the script.",
    },
    CatalogEntry {
        code: 126,
        category: CATEGORY_PERMISSION,
        error: "Command not executable",
        description: "The command was found but could not be executed.",
    },
    CatalogEntry {
        code: 127,
        category: CATEGORY_ENVIRONMENT,
        error: "Command not found",
        description: "The command is not installed or not on PATH.",
    },
    CatalogEntry {
        code: 128,
        category: CATEGORY_SCRIPT,
        error: "Invalid exit argument",
        description: "The script exited with an out-of-range status.",
    },
    CatalogEntry {
        code: 130,
        category: CATEGORY_SIGNAL,
        error: "Interrupted",
        description: "The command was interrupted (SIGINT).",
    },
    CatalogEntry {
        code: 137,
        category: CATEGORY_SIGNAL,
        error: "Killed",
        description: "The command was killed (SIGKILL), often by the OOM killer.",
    },
    CatalogEntry {
        code: 139,
        category: CATEGORY_SIGNAL,
        error: "Segmentation fault",
        description: "The command crashed with an invalid memory access (SIGSEGV).",
    },
    CatalogEntry {
        code: 143,
        category: CATEGORY_SIGNAL,
        error: "Terminated",
        description: "The command was terminated (SIGTERM).",
    },
    CatalogEntry {
        code: 255,
        category: CATEGORY_CONNECTION,
        error: "Remote connection failed",
        description: "The remote shell could not connect or authenticate.",
    },
];

static EXIT_CODE_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)exit code[:\s]*([0-9]+)").ok());

pub fn lookup(code: i64) -> Option<&'static CatalogEntry> {
    ERROR_CATALOG.iter().find(|entry| entry.code == code)
}

/// Extracts the candidate exit code: an explicit `exit code N` anywhere in the
/// text wins, otherwise a last non-empty line made only of digits.
pub fn extract_exit_code(text: &str) -> Option<i64> {
    if let Some(pattern) = EXIT_CODE_PATTERN.as_ref() {
        if let Some(captures) = pattern.captures(text) {
            return captures.get(1)?.as_str().parse().ok();
        }
    }

    let last = text.lines().map(str::trim).rfind(|line| !line.is_empty())?;
    if last.bytes().all(|byte| byte.is_ascii_digit()) {
        return last.parse().ok();
    }
    None
}

pub fn resolve(text: &str) -> Option<ErrorInfo> {
    extract_exit_code(text)
        .and_then(lookup)
        .map(CatalogEntry::to_info)
}

/// Text shown to users: the explanation when the code is known, the original
/// text unmodified otherwise.
pub fn render(text: &str) -> String {
    match resolve(text) {
        Some(info) => format!("{}: {} ({})", info.error, info.description, info.category),
        None => text.to_string(),
    }
}
