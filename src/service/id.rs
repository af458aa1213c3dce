use std::fmt::{Error, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a service: the name it was created with plus an
/// instance number, so two services sharing a name never collide.
#[derive(Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct ServiceId {
    name: Arc<str>,
    instance: u64,
}

impl ServiceId {
    pub fn new(name: &str) -> Self {
        ServiceId {
            name: Arc::from(name),
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }
}

impl From<&str> for ServiceId {
    fn from(name: &str) -> Self {
        ServiceId::new(name)
    }
}

impl From<String> for ServiceId {
    fn from(name: String) -> Self {
        ServiceId::new(name.as_str())
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}#{}", self.name, self.instance)
    }
}

impl std::fmt::Debug for ServiceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        std::fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn same_name_different_identity() {
        let first = ServiceId::from("camera");
        let second = ServiceId::from("camera");
        assert_eq!(first.name(), second.name());
        assert_ne!(first, second);
        assert!(first < second);
    }

    #[test]
    fn clones_are_equal() {
        let id = ServiceId::from("lidar".to_string());
        assert_eq!(id.clone(), id);
    }

    #[test]
    fn display_includes_instance() {
        let id = ServiceId::new("pose");
        let printed = id.to_string();
        assert_eq!(printed, format!("pose#{}", id.instance()));
        assert_eq!(format!("{:?}", id), printed);
    }
}
