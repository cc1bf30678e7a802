//! Storage key scheme
//!
//! Every key is `<namespace>:<kind>:<user>[:<year>]`, except the category
//! dictionary which is shared by all users of a namespace.

/// Default namespace when none is configured
pub const DEFAULT_NAMESPACE: &str = "forumstat";

/// Builds the storage keys of one namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    namespace: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl StorageKeys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The category dictionary
    pub fn balance_types(&self) -> String {
        format!("{}:balanceTypes", self.namespace)
    }

    /// Years for which `user` has balance records
    pub fn balance_years(&self, user: &str) -> String {
        format!("{}:balanceYears:{user}", self.namespace)
    }

    /// Compact balance records of `user` in `year`
    pub fn balance_records(&self, user: &str, year: i32) -> String {
        format!("{}:balance:{user}:{year}", self.namespace)
    }

    /// Hourly activity of the current month
    pub fn used_time_month(&self, user: &str) -> String {
        format!("{}:usedTime:{user}", self.namespace)
    }

    /// Start of the month the hourly store belongs to
    pub fn used_time_month_start(&self, user: &str) -> String {
        format!("{}:usedTimeMonthStart:{user}", self.namespace)
    }

    /// Timestamp of the last accepted activity update
    pub fn used_time_last_update(&self, user: &str) -> String {
        format!("{}:usedTimeLastUpdate:{user}", self.namespace)
    }

    /// Compressed months of `year`
    pub fn used_time_year(&self, user: &str, year: i32) -> String {
        format!("{}:usedTimeYear:{user}:{year}", self.namespace)
    }
}
