pub mod audit;
pub mod core;
pub mod jobs;
pub mod main_module;
pub mod security;
pub mod sharepoint;
pub mod usage;

/// Which parts of the service a process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// HTTP API only.
    Serve,
    /// Queue worker and scheduler only.
    Worker,
    /// Everything in one process.
    All,
}

impl RunMode {
    pub fn serves_http(&self) -> bool {
        matches!(self, Self::Serve | Self::All)
    }

    pub fn runs_jobs(&self) -> bool {
        matches!(self, Self::Worker | Self::All)
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serve" => Ok(Self::Serve),
            "worker" => Ok(Self::Worker),
            "all" => Ok(Self::All),
            other => Err(format!("Unknown command: {other} (expected serve, worker or all)")),
        }
    }
}
