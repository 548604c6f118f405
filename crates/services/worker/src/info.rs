//! Identity of the running worker process
//!
//! Recorded on the worker row at registration so that operators can tell which machine
//! and process held a genome when a run was abandoned.

/// Host name used when the operating system does not report one
pub const UNKNOWN_HOST: &str = "unknown";

/// Process identity registered in the metadata DB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    /// Host name of the machine
    pub host: String,
    /// OS process ID
    pub pid: u32,
    /// Public network address, if configured
    pub address: Option<String>,
}

impl WorkerInfo {
    /// Identity of the current process
    pub fn current(address: Option<String>) -> Self {
        Self {
            host: hostname(),
            pid: std::process::id(),
            address,
        }
    }
}

/// The machine's host name: `HOSTNAME` if exported, then the name the OS reports
fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .and_then(|host| non_empty(&host))
        .or_else(|| sysinfo::System::host_name().and_then(|host| non_empty(&host)))
        .unwrap_or_else(|| {
            tracing::debug!("host name not available");
            UNKNOWN_HOST.to_string()
        })
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
