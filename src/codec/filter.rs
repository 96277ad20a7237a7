//! Policy object controlling which sensitive fields codecs emit.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensitiveField {
    Username,
    Password,
    Domain,
}

/// Three independent toggles consulted by every codec's write path. A field
/// excluded here leaves no trace in the output - not even an empty
/// placeholder. Reads are unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveFilter {
    pub save_username: bool,
    pub save_password: bool,
    pub save_domain: bool,
}

impl Default for SaveFilter {
    fn default() -> Self {
        Self {
            save_username: true,
            save_password: true,
            save_domain: true,
        }
    }
}

impl SaveFilter {
    pub fn new(save_username: bool, save_password: bool, save_domain: bool) -> Self {
        Self {
            save_username,
            save_password,
            save_domain,
        }
    }

    /// Emit nothing sensitive.
    pub fn exclude_all() -> Self {
        Self::new(false, false, false)
    }

    pub fn should_include(&self, field: SensitiveField) -> bool {
        match field {
            SensitiveField::Username => self.save_username,
            SensitiveField::Password => self.save_password,
            SensitiveField::Domain => self.save_domain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_includes_everything() {
        let filter = SaveFilter::default();
        assert!(filter.should_include(SensitiveField::Username));
        assert!(filter.should_include(SensitiveField::Password));
        assert!(filter.should_include(SensitiveField::Domain));
    }

    #[test]
    fn test_toggles_are_independent() {
        let filter = SaveFilter::new(true, false, true);
        assert!(filter.should_include(SensitiveField::Username));
        assert!(!filter.should_include(SensitiveField::Password));
        assert!(filter.should_include(SensitiveField::Domain));
    }
}
