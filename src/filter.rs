//! Host selection.

use regex::{Regex, RegexBuilder};

use crate::error::Result;
use crate::host::{HostRecord, Inventory};

/// Criteria for picking target hosts out of the inventory.
///
/// Every predicate that is present must hold. Absent predicates pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionCriteria {
    /// Exact group name.
    pub group: Option<String>,
    /// Case-insensitive pattern matched against the host model.
    pub ostype: Option<String>,
    /// Pattern matched against the host name.
    pub name: Option<String>,
}

impl SelectionCriteria {
    /// True when no predicate is given, i.e. the invocation targets a single named host.
    pub fn is_empty(&self) -> bool {
        self.group.is_none() && self.ostype.is_none() && self.name.is_none()
    }
}

/// Compiled form of `SelectionCriteria`.
#[derive(Debug)]
pub struct HostFilter {
    group: Option<String>,
    ostype: Option<Regex>,
    name: Option<Regex>,
}

impl HostFilter {
    pub fn new(criteria: &SelectionCriteria) -> Result<Self> {
        let ostype = criteria
            .ostype
            .as_deref()
            .map(|pattern| RegexBuilder::new(pattern).case_insensitive(true).build())
            .transpose()?;
        let name = criteria.name.as_deref().map(Regex::new).transpose()?;
        Ok(Self {
            group: criteria.group.clone(),
            ostype,
            name,
        })
    }

    pub fn matches(&self, host: &HostRecord) -> bool {
        if let Some(group) = &self.group {
            tracing::trace!(
                host = %host.name,
                node_group = ?host.group,
                "checking group {}", group
            );
            if host.group.as_deref() != Some(group.as_str()) {
                return false;
            }
        }
        if let Some(ostype) = &self.ostype {
            tracing::trace!(host = %host.name, model = %host.model, "checking ostype {}", ostype);
            if !ostype.is_match(&host.model) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            tracing::trace!(host = %host.name, "checking name pattern {}", name);
            if !name.is_match(&host.name) {
                return false;
            }
        }
        true
    }
}

/// Returns the names of all hosts satisfying `criteria`, in inventory order.
///
/// An empty result is not an error here; callers decide whether it is fatal.
pub fn select_hosts(
    inventory: &dyn Inventory,
    criteria: &SelectionCriteria,
) -> Result<Vec<String>> {
    Ok(select_records(inventory, criteria)?
        .into_iter()
        .map(|host| host.name.clone())
        .collect())
}

/// Like `select_hosts`, but returns the records themselves.
pub fn select_records<'a>(
    inventory: &'a dyn Inventory,
    criteria: &SelectionCriteria,
) -> Result<Vec<&'a HostRecord>> {
    tracing::info!("running list for hosts");
    if let Some(group) = &criteria.group {
        tracing::info!(" - in group: {}", group);
    }
    if let Some(ostype) = &criteria.ostype {
        tracing::info!(" - (and) matching ostype: {}", ostype);
    }
    if let Some(name) = &criteria.name {
        tracing::info!(" - (and) matching: {}", name);
    }

    let filter = HostFilter::new(criteria)?;
    Ok(inventory
        .all_hosts()
        .iter()
        .filter(|host| filter.matches(host))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory() -> Vec<HostRecord> {
        vec![
            HostRecord::new("core-sw1").with_group("core").with_model("IOS"),
            HostRecord::new("core-rtr1").with_group("core").with_model("junos"),
            HostRecord::new("edge-sw1").with_group("edge").with_model("ios"),
            HostRecord::new("lab-fw1").with_model("fortios"),
        ]
    }

    fn select(criteria: SelectionCriteria) -> Vec<String> {
        select_hosts(&inventory(), &criteria).unwrap()
    }

    #[test]
    fn test_empty_criteria_selects_everything_in_order() {
        assert_eq!(
            select(SelectionCriteria::default()),
            vec!["core-sw1", "core-rtr1", "edge-sw1", "lab-fw1"]
        );
    }

    #[test]
    fn test_group_is_exact() {
        let criteria = SelectionCriteria {
            group: Some("core".into()),
            ..Default::default()
        };
        assert_eq!(select(criteria), vec!["core-sw1", "core-rtr1"]);

        let criteria = SelectionCriteria {
            group: Some("cor".into()),
            ..Default::default()
        };
        assert!(select(criteria).is_empty());
    }

    #[test]
    fn test_ostype_is_case_insensitive_pattern() {
        let criteria = SelectionCriteria {
            ostype: Some("^ios$".into()),
            ..Default::default()
        };
        assert_eq!(select(criteria), vec!["core-sw1", "edge-sw1"]);

        // Unanchored pattern also hits "fortios".
        let criteria = SelectionCriteria {
            ostype: Some("IOS".into()),
            ..Default::default()
        };
        assert_eq!(select(criteria), vec!["core-sw1", "edge-sw1", "lab-fw1"]);
    }

    #[test]
    fn test_name_pattern_is_case_sensitive() {
        let criteria = SelectionCriteria {
            name: Some("-sw".into()),
            ..Default::default()
        };
        assert_eq!(select(criteria), vec!["core-sw1", "edge-sw1"]);

        let criteria = SelectionCriteria {
            name: Some("CORE".into()),
            ..Default::default()
        };
        assert!(select(criteria).is_empty());
    }

    #[test]
    fn test_predicates_combine_with_and() {
        let criteria = SelectionCriteria {
            group: Some("core".into()),
            ostype: Some("ios".into()),
            name: Some("sw".into()),
        };
        assert_eq!(select(criteria), vec!["core-sw1"]);

        let criteria = SelectionCriteria {
            group: Some("edge".into()),
            ostype: Some("junos".into()),
            name: None,
        };
        assert!(select(criteria).is_empty());
    }

    #[test]
    fn test_hosts_without_group_never_match_a_group() {
        let criteria = SelectionCriteria {
            group: Some("".into()),
            ..Default::default()
        };
        assert!(select(criteria).is_empty());
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let criteria = SelectionCriteria {
            name: Some("(".into()),
            ..Default::default()
        };
        assert!(select_hosts(&inventory(), &criteria).is_err());
    }

    #[test]
    fn test_is_empty() {
        assert!(SelectionCriteria::default().is_empty());
        assert!(!SelectionCriteria {
            ostype: Some("ios".into()),
            ..Default::default()
        }
        .is_empty());
    }
}
