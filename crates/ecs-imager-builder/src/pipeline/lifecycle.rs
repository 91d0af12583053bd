//! Per-step resource ownership
//!
//! A step moves NotStarted -> Completed -> CleanedUp. Only a resource the step
//! created itself is handed back for deletion, and only once.

/// Ownership state of the resource a step manages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Lifecycle<T> {
    #[default]
    NotStarted,
    Completed { resource: T, owned: bool },
    CleanedUp,
}

impl<T> Lifecycle<T> {
    /// The step created the resource and must delete it
    pub fn owned(resource: T) -> Self {
        Lifecycle::Completed {
            resource,
            owned: true,
        }
    }

    /// The resource was supplied by the user and must be left alone
    pub fn reused(resource: T) -> Self {
        Lifecycle::Completed {
            resource,
            owned: false,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Lifecycle::Completed { .. })
    }

    pub fn owns(&self) -> bool {
        matches!(self, Lifecycle::Completed { owned: true, .. })
    }

    /// Hand the resource over to the caller without deleting it
    pub fn release(&mut self) -> Option<T> {
        match std::mem::replace(self, Lifecycle::CleanedUp) {
            Lifecycle::Completed { resource, .. } => Some(resource),
            other => {
                *self = other;
                None
            }
        }
    }

    /// Move to CleanedUp and return the resource if it is owned
    ///
    /// Reused resources yield `None`; calling again yields `None`. A step that
    /// never completed stays NotStarted.
    pub fn take_owned(&mut self) -> Option<T> {
        if !self.is_completed() {
            return None;
        }
        match std::mem::replace(self, Lifecycle::CleanedUp) {
            Lifecycle::Completed {
                resource,
                owned: true,
            } => Some(resource),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owned_resource_taken_once() {
        let mut lc = Lifecycle::owned("vsw-1");
        assert!(lc.owns());
        assert_eq!(lc.take_owned(), Some("vsw-1"));
        assert_eq!(lc, Lifecycle::CleanedUp);
        assert_eq!(lc.take_owned(), None);
    }

    #[test]
    fn test_reused_resource_never_taken() {
        let mut lc = Lifecycle::reused("vsw-123");
        assert!(lc.is_completed());
        assert!(!lc.owns());
        assert_eq!(lc.take_owned(), None);
        assert_eq!(lc, Lifecycle::CleanedUp);
    }

    #[test]
    fn test_release_publishes_without_ownership() {
        let mut lc = Lifecycle::owned("m-1");
        assert_eq!(lc.release(), Some("m-1"));
        assert_eq!(lc.take_owned(), None);

        let mut never: Lifecycle<&str> = Lifecycle::NotStarted;
        assert_eq!(never.release(), None);
        assert_eq!(never, Lifecycle::NotStarted);
    }

    #[test]
    fn test_not_started_is_noop() {
        let mut lc: Lifecycle<&str> = Lifecycle::default();
        assert_eq!(lc.take_owned(), None);
        assert_eq!(lc, Lifecycle::NotStarted);
    }
}
