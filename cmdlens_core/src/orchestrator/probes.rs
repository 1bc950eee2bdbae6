use serde::{Deserialize, Serialize};

/// A fixed diagnostic command run by the health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    pub name: String,
    pub command: String,
    pub description: String,
}

impl Probe {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            description: description.into(),
        }
    }
}

/// The built-in probe set, in report order.
pub fn default_probes() -> Vec<Probe> {
    [
        ("uptime", "System load & uptime"),
        ("df -h", "Disk usage"),
        ("free -h", "Memory usage"),
        ("whoami", "Current user"),
    ]
    .into_iter()
    .map(|(command, description)| Probe::new(command, command, description))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowlist::Allowlist;

    #[test]
    fn test_default_probes_are_allowlisted() {
        let allowlist = Allowlist::default();
        let probes = default_probes();
        assert_eq!(probes.len(), 4);
        for probe in &probes {
            assert!(allowlist.contains(&probe.command), "{}", probe.command);
        }
    }
}
