//! Azure Resource Graph inventory through the `az` CLI.
//!
//! Runs `az graph query -q <query> --subscriptions <id> --first <n> -o json`
//! and follows `skip_token` pages until the result set is exhausted.
//! Credentials are whatever `az login` established.

use super::InventoryService;
use crate::core::error::{QueryError, QueryErrorKind};
use crate::core::types::ResourceRecord;
use crate::transport::{local, ExecError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Records requested per page (the service maximum).
pub const PAGE_SIZE: &str = "1000";

/// Upper bound on followed pages for one query.
const MAX_PAGES: usize = 100;

const MAX_REASON_LEN: usize = 500;

/// Time allowed for one `az` invocation unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Inventory client backed by `az graph query`.
#[derive(Debug, Clone)]
pub struct AzureGraphClient {
    program: String,
    subscription_id: String,
    timeout: Duration,
}

impl AzureGraphClient {
    pub fn new(subscription_id: &str) -> Self {
        Self::with_program("az", subscription_id)
    }

    /// Use a specific `az` executable.
    pub fn with_program(program: &str, subscription_id: &str) -> Self {
        Self {
            program: program.to_string(),
            subscription_id: subscription_id.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Limit each `az` invocation (one page) to `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn args<'a>(&'a self, query: &'a str, skip_token: Option<&'a str>) -> Vec<&'a str> {
        let mut args = vec![
            "graph",
            "query",
            "-q",
            query,
            "--subscriptions",
            self.subscription_id.as_str(),
            "--first",
            PAGE_SIZE,
            "-o",
            "json",
        ];
        if let Some(token) = skip_token {
            args.push("--skip-token");
            args.push(token);
        }
        args
    }
}

#[async_trait]
impl InventoryService for AzureGraphClient {
    async fn execute(&self, query: &str) -> Result<Vec<ResourceRecord>, QueryError> {
        let program = local::find_program(&self.program).ok_or_else(|| {
            QueryError::new(
                QueryErrorKind::Unavailable,
                format!("'{}' not found; install the Azure CLI and run 'az login'", self.program),
            )
        })?;

        let mut records = Vec::new();
        let mut skip_token: Option<String> = None;
        for page_no in 1..=MAX_PAGES {
            let args = self.args(query, skip_token.as_deref());
            let out = local::exec_program(&program, &args, None, self.timeout)
                .await
                .map_err(exec_failure)?;
            if !out.success() {
                return Err(classify_failure(&out.stderr));
            }

            let page = parse_page(&out.stdout)?;
            tracing::debug!(page = page_no, records = page.records.len(), "resource graph page");
            records.extend(page.records);

            match page.skip_token {
                Some(token) if !token.is_empty() => skip_token = Some(token),
                _ => return Ok(records),
            }
        }
        tracing::warn!(pages = MAX_PAGES, "resource graph page limit reached; results truncated");
        Ok(records)
    }
}

/// One decoded page of query output.
#[derive(Debug, Default)]
pub struct GraphPage {
    pub records: Vec<ResourceRecord>,
    pub skip_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GraphOutput {
    Paged {
        data: Vec<ResourceRecord>,
        #[serde(default, alias = "skipToken", alias = "$skipToken")]
        skip_token: Option<String>,
    },
    Rows(Vec<ResourceRecord>),
}

/// Decode `az graph query -o json` output. Both the paged object and a bare
/// array of rows are accepted.
pub fn parse_page(stdout: &[u8]) -> Result<GraphPage, QueryError> {
    let output: GraphOutput = serde_json::from_slice(stdout).map_err(|e| {
        QueryError::new(
            QueryErrorKind::InvalidResponse,
            format!("cannot decode resource graph output: {e}"),
        )
    })?;
    Ok(match output {
        GraphOutput::Paged { data, skip_token } => GraphPage {
            records: data,
            skip_token,
        },
        GraphOutput::Rows(records) => GraphPage {
            records,
            skip_token: None,
        },
    })
}

fn exec_failure(e: ExecError) -> QueryError {
    let kind = match e {
        ExecError::TimedOut { .. } => QueryErrorKind::Transient,
        ExecError::Spawn { .. } | ExecError::Io(_) => QueryErrorKind::Unavailable,
    };
    QueryError::new(kind, e.to_string())
}

/// Classify a failed `az` invocation from its stderr.
pub fn classify_failure(stderr: &str) -> QueryError {
    let lower = stderr.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    let kind = if has(&[
        "az login",
        "authenticationfailed",
        "authorizationfailed",
        "aadsts",
        "token has expired",
        "no subscription found",
    ]) {
        QueryErrorKind::Auth
    } else if has(&["badrequest", "invalidquery", "parsererror", "query is invalid", "syntax"]) {
        QueryErrorKind::MalformedQuery
    } else if has(&[
        "throttl",
        "too many requests",
        "ratelimit",
        "timed out",
        "timeout",
        "temporarily unavailable",
        "serviceunavailable",
        "connection",
    ]) {
        QueryErrorKind::Transient
    } else {
        QueryErrorKind::Unavailable
    };
    QueryError::new(kind, summarize_stderr(stderr))
}

fn summarize_stderr(stderr: &str) -> String {
    let text = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        return "az exited without an error message".to_string();
    }
    match text.char_indices().nth(MAX_REASON_LEN) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text,
    }
}
