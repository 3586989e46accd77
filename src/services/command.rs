use std::fmt;

/// Lifecycle command delivered to a service unit's inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Build the service and start it. Always the first command a unit receives.
    CreateService,
    /// Stop a running service.
    StopService,
    /// Drop a stopped or faulted service and complete the unit.
    UnloadService,
    /// Stop (when running) and re-create the service.
    RestartService,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::CreateService => "create_service",
            Command::StopService => "stop_service",
            Command::UnloadService => "unload_service",
            Command::RestartService => "restart_service",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
