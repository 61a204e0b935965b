//! Scrape module selection.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use tracing::debug;

/// A named group of metrics a scrape can opt into.
///
/// Variant order is the processing order within one scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Module {
    ProcessStats,
    NetworkStats,
    DirectoryInfo,
    JobQueue,
    History,
    SystemInfo,
    Temperature,
    PrinterObjects,
    Spoolman,
}

impl Module {
    /// All modules, in processing order.
    pub const ALL: [Module; 9] = [
        Module::ProcessStats,
        Module::NetworkStats,
        Module::DirectoryInfo,
        Module::JobQueue,
        Module::History,
        Module::SystemInfo,
        Module::Temperature,
        Module::PrinterObjects,
        Module::Spoolman,
    ];

    /// The tag used in the `modules` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::ProcessStats => "process_stats",
            Module::NetworkStats => "network_stats",
            Module::DirectoryInfo => "directory_info",
            Module::JobQueue => "job_queue",
            Module::History => "history",
            Module::SystemInfo => "system_info",
            Module::Temperature => "temperature",
            Module::PrinterObjects => "printer_objects",
            Module::Spoolman => "spoolman",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unrecognized module tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown module '{0}'")]
pub struct UnknownModule(pub String);

impl FromStr for Module {
    type Err = UnknownModule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Module::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownModule(s.to_string()))
    }
}

/// The set of modules requested for one scrape.
///
/// Duplicates collapse and iteration follows [`Module`] order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSet(BTreeSet<Module>);

impl ModuleSet {
    /// Build a set from raw tags; unknown tags are ignored.
    pub fn from_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for tag in tags {
            match tag.as_ref().parse::<Module>() {
                Ok(module) => {
                    set.insert(module);
                }
                Err(e) => debug!(error = %e, "Ignoring module"),
            }
        }
        Self(set)
    }

    pub fn contains(&self, module: Module) -> bool {
        self.0.contains(&module)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Module> + '_ {
        self.0.iter().copied()
    }

    /// Whether the `/machine/proc_stats` fetch is needed.
    pub fn needs_proc_stats(&self) -> bool {
        self.contains(Module::ProcessStats) || self.contains(Module::NetworkStats)
    }
}

impl FromIterator<Module> for ModuleSet {
    fn from_iter<T: IntoIterator<Item = Module>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ModuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<&str> = self.0.iter().map(Module::as_str).collect();
        write!(f, "[{}]", tags.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_module() {
        assert_eq!("history".parse::<Module>(), Ok(Module::History));
        assert_eq!(
            "printer_objects".parse::<Module>(),
            Ok(Module::PrinterObjects)
        );
        assert!("gcode".parse::<Module>().is_err());
    }

    #[test]
    fn test_round_trip_tags() {
        for module in Module::ALL {
            assert_eq!(module.as_str().parse::<Module>(), Ok(module));
        }
    }

    #[test]
    fn test_module_set_ignores_unknown_and_duplicates() {
        let set = ModuleSet::from_tags(["job_queue", "bogus", "job_queue", "spoolman"]);

        assert_eq!(set.len(), 2);
        assert!(set.contains(Module::JobQueue));
        assert!(set.contains(Module::Spoolman));
        assert!(!set.contains(Module::History));
    }

    #[test]
    fn test_module_set_order_is_stable() {
        let set = ModuleSet::from_tags(["spoolman", "process_stats", "history"]);
        let order: Vec<Module> = set.iter().collect();

        assert_eq!(
            order,
            vec![Module::ProcessStats, Module::History, Module::Spoolman]
        );
        assert_eq!(set.to_string(), "[process_stats,history,spoolman]");
    }

    #[test]
    fn test_shared_proc_stats_fetch() {
        assert!(ModuleSet::from_tags(["network_stats"]).needs_proc_stats());
        assert!(ModuleSet::from_tags(["process_stats"]).needs_proc_stats());
        assert!(!ModuleSet::from_tags(["system_info"]).needs_proc_stats());
    }
}
